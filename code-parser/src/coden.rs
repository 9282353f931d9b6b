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
use mac7_endian_codec::read_u16_be;

const HEADER_SIZE: usize = 4;
const PROLOGUE_SIZE: usize = 6;
const PROLOGUE_FIRST_WORD: u16 = 0x3F3C;
const PROLOGUE_LAST_WORD: u16 = 0xA9F0;

#[derive(Debug, Clone)]
pub struct CodeNInfo {
    pub entry_offset: u16,
    pub flags: u16,
    /// Offset of the first executable byte within the resource, past the
    /// header and, if present, the linker prologue.
    pub body_offset: usize,
}

impl CodeNInfo {
    pub fn entry_addr(&self, base: u32) -> u32 {
        base + self.body_offset as u32 + self.entry_offset as u32
    }
}

/// Parses a `CODE N` (N >= 1) resource header, detecting and skipping the
/// optional 6-byte linker prologue (`0x3F3C ???? 0xA9F0`).
pub fn parse_coden(data: &[u8]) -> Result<CodeNInfo, CodeParseError> {
    if data.len() < HEADER_SIZE {
        return Err(CodeParseError::TooShort { need: HEADER_SIZE, got: data.len() });
    }
    let entry_offset = read_u16_be(data, 0);
    let flags = read_u16_be(data, 2);

    let mut body_offset = HEADER_SIZE;
    if data.len() >= HEADER_SIZE + PROLOGUE_SIZE {
        let first = read_u16_be(data, HEADER_SIZE);
        let last = read_u16_be(data, HEADER_SIZE + 4);
        if first == PROLOGUE_FIRST_WORD && last == PROLOGUE_LAST_WORD {
            body_offset += PROLOGUE_SIZE;
        }
    }

    Ok(CodeNInfo { entry_offset, flags, body_offset })
}
