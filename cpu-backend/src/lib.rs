// Copyright (C) 2019-2020  Pierre Krieger
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Portable seam between the segment loader / runtime and the two concrete
//! interpreters (`mac7-m68k-interp`, `mac7-ppc-interp`): the [`CpuBackend`]
//! and [`AddressSpace`] traits, the shared [`OSErr`] currency, the trap
//! table, and a process-wide backend registry.

mod address_space;
mod backend;
mod error;
mod jt_slot;
mod reloc;
mod registers;
mod registry;
mod traps;

pub use address_space::{AddressSpace, EnterFlags, MapFlags};
pub use backend::{CpuBackend, CpuBackendFactory};
pub use error::OSErr;
pub use jt_slot::JtSlotState;
pub use reloc::{RelocEntry, RelocKind, RelocTable};
pub use registers::Registers;
pub use registry::{cpu_backend_get, cpu_backend_get_default, cpu_backend_register};
pub use traps::{TrapContext, TrapHandler, TrapTable, TRAP_TABLE_SIZE};

pub type GuestAddr = u32;
