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

use mac7_cpu_backend::OSErr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeParseError {
    #[error("resource too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("above/below-A5 or JT size exceeds the 1 MiB sanity guard: {0}")]
    SizeGuard(u32),
    #[error("jt_size {jt_size} exceeds above_a5_size {above_a5_size}")]
    JtExceedsAboveA5 { jt_size: u32, above_a5_size: u32 },
    #[error("16 + jt_size ({total}) exceeds resource size ({resource_size})")]
    JtExceedsResource { total: u32, resource_size: u32 },
}

impl From<CodeParseError> for OSErr {
    fn from(_: CodeParseError) -> Self {
        OSErr::BadFormat
    }
}
