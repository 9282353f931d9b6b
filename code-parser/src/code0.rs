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

use crate::error::CodeParseError;
use mac7_endian_codec::{read_u16_be, read_u32_be};

const HEADER_SIZE: usize = 16;
const JT_ENTRY_SIZE: usize = 8;
const SIZE_GUARD: u32 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JtEntry {
    pub offset: u16,
    pub instruction: u16,
    pub target: u32,
}

#[derive(Debug, Clone)]
pub struct Code0Info {
    pub above_a5_size: u32,
    pub below_a5_size: u32,
    pub jt_size: u32,
    pub jt_offset_from_a5: u32,
    pub entries: Vec<JtEntry>,
}

impl Code0Info {
    pub fn jt_count(&self) -> usize {
        self.entries.len()
    }
}

/// Parses a `CODE 0` resource: the 16-byte A5-world header plus its jump
/// table entries.
pub fn parse_code0(data: &[u8]) -> Result<Code0Info, CodeParseError> {
    if data.len() < HEADER_SIZE {
        return Err(CodeParseError::TooShort { need: HEADER_SIZE, got: data.len() });
    }
    let above_a5_size = read_u32_be(data, 0);
    let below_a5_size = read_u32_be(data, 4);
    let jt_size = read_u32_be(data, 8);
    let jt_offset_from_a5 = read_u32_be(data, 12);

    if above_a5_size > SIZE_GUARD {
        return Err(CodeParseError::SizeGuard(above_a5_size));
    }
    if below_a5_size > SIZE_GUARD {
        return Err(CodeParseError::SizeGuard(below_a5_size));
    }
    if jt_size > SIZE_GUARD {
        return Err(CodeParseError::SizeGuard(jt_size));
    }
    if jt_size > above_a5_size {
        return Err(CodeParseError::JtExceedsAboveA5 { jt_size, above_a5_size });
    }
    let total = HEADER_SIZE as u32 + jt_size;
    if total > data.len() as u32 {
        return Err(CodeParseError::JtExceedsResource { total, resource_size: data.len() as u32 });
    }

    let jt_count = (jt_size as usize) / JT_ENTRY_SIZE;
    let mut entries = Vec::with_capacity(jt_count);
    for i in 0..jt_count {
        let base = HEADER_SIZE + i * JT_ENTRY_SIZE;
        entries.push(JtEntry {
            offset: read_u16_be(data, base),
            instruction: read_u16_be(data, base + 2),
            target: read_u32_be(data, base + 4),
        });
    }

    Ok(Code0Info { above_a5_size, below_a5_size, jt_size, jt_offset_from_a5, entries })
}
