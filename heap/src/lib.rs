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

//! Zone-based pointer/handle allocator: the host side of the classic
//! Memory Manager, and the allocator the rest of the runtime uses for its
//! own bookkeeping.

mod error;
mod memory_manager;
mod zone;

pub use error::HeapError;
pub use memory_manager::{MemoryManager, Ptr, ZoneHandle, ZoneId, APPLICATION_ZONE_SIZE, SYSTEM_ZONE_SIZE};
pub use zone::{Handle, Zone};
