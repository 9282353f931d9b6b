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

//! BE-safe parser for `CODE 0` (A5-world metadata) and `CODE N` (entry +
//! body) resources, plus the heuristic relocation scan that stands in for
//! a real linker's relocation metadata.

mod code0;
mod coden;
mod error;
mod reloc_scan;

pub use code0::{parse_code0, Code0Info, JtEntry};
pub use coden::{parse_coden, CodeNInfo};
pub use error::CodeParseError;
pub use reloc_scan::scan_relocations;
