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

use mac7_cpu_backend::{RelocEntry, RelocKind, RelocTable};
use mac7_endian_codec::{read_u16_be, read_u32_be};

const JMP_ABS_L: u16 = 0x4EF9;
const JSR_ABS_L: u16 = 0x4EB9;
const JT_ENTRY_SIZE_68K: u32 = 8;

/// A documented simplification (spec §9): real linkers emit explicit
/// relocation metadata; absent that here, this scans executable bytes word
/// by word looking for `JMP`/`JSR` with an absolute-long operand and infers
/// the relocation kind from the operand's magnitude.
pub fn scan_relocations(body: &[u8]) -> RelocTable {
    let mut table = RelocTable::new();
    let mut i = 0;
    while i + 6 <= body.len() {
        let word = read_u16_be(body, i);
        if word == JMP_ABS_L || word == JSR_ABS_L {
            let operand = read_u32_be(body, i + 2);
            let entry = if operand < 64 * 1024 {
                RelocEntry {
                    kind: RelocKind::JTImport,
                    at_offset: (i + 2) as u32,
                    addend: 0,
                    target_segment: None,
                    jt_index: Some((operand / JT_ENTRY_SIZE) as u16),
                }
            } else {
                RelocEntry {
                    kind: RelocKind::AbsSegBase,
                    at_offset: (i + 2) as u32,
                    addend: operand as i32,
                    target_segment: None,
                    jt_index: None,
                }
            };
            table.push(entry);
            i += 6;
        } else {
            i += 2;
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jmp_with_small_operand_is_jt_import() {
        let mut body = vec![0u8; 6];
        body[0..2].copy_from_slice(&JMP_ABS_L.to_be_bytes());
        body[2..6].copy_from_slice(&16u32.to_be_bytes());
        let table = scan_relocations(&body);
        assert_eq!(table.len(), 1);
        let entry = table.iter().next().unwrap();
        assert_eq!(entry.kind, RelocKind::JTImport);
        assert_eq!(entry.jt_index, Some(2));
    }

    #[test]
    fn jsr_with_large_operand_is_abs_seg_base() {
        let mut body = vec![0u8; 6];
        body[0..2].copy_from_slice(&JSR_ABS_L.to_be_bytes());
        body[2..6].copy_from_slice(&0x0020_0000u32.to_be_bytes());
        let table = scan_relocations(&body);
        assert_eq!(table.len(), 1);
        let entry = table.iter().next().unwrap();
        assert_eq!(entry.kind, RelocKind::AbsSegBase);
        assert_eq!(entry.addend, 0x0020_0000);
    }

    #[test]
    fn no_matching_opcodes_yields_empty_table() {
        let body = [0x4E, 0x75, 0x4E, 0x71]; // RTS, NOP
        assert!(scan_relocations(&body).is_empty());
    }
}
