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

//! A5-world construction, jump-table stub materialization, on-demand
//! (lazy) segment loading, and relocation orchestration — the glue
//! between `mac7-code-parser`'s byte-level CODE resource parsing and a
//! live [`mac7_cpu_backend::CpuBackend`] + guest address space.

mod a5_world;
mod bump_alloc;
mod error;
mod jump_table;
mod loader;
mod memory;
mod resource;
mod segment_table;

pub use a5_world::{install_a5_world, A5World};
pub use bump_alloc::BumpAllocator;
pub use error::SegLoaderError;
pub use jump_table::build_jump_table;
pub use loader::{SegmentLoaderContext, LOAD_SEG_TRAP_INDEX};
pub use memory::GuestAddressSpace;
pub use resource::{ResourceSource, ResType, CODE};
pub use segment_table::{SegmentDescriptor, SegmentState, SegmentTable, MAX_SEGMENTS};

#[cfg(any(test, feature = "test-boot"))]
pub use resource::TestResourceFile;
