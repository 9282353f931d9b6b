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

//! Named low-memory global addresses, the host tick source that drives
//! `Ticks`, and the PackBits codec used by `ppat` pattern resources.

mod globals;
pub mod packbits;
mod tick;

pub use globals::{
    lm_get_u16, lm_get_u32, lm_get_u8, lm_set_u16, lm_set_u32, lm_set_u8, Global, LOW_MEMORY_SIZE,
};
pub use tick::{os_utils_increment_ticks, ManualTickSource, SystemTickSource, TickSource, TICK_HZ};
