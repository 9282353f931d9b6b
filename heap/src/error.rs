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

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap exhausted after compaction while trying to allocate {0} bytes")]
    OutOfMemory(u32),
    #[error("invalid or stale block at offset {0:#x}")]
    ParamErr(u32),
    #[error("invalid or stale handle")]
    BadHandle,
    #[error("freelist corruption detected in size class {0}; class was reset")]
    FreelistCorruption(usize),
    #[error("block magic number corrupted at offset {0:#x}")]
    BlockMagicCorruption(u32),
}
