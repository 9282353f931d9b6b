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

//! A minimal on-disk stand-in for a real resource-fork reader, which this
//! workspace doesn't otherwise implement. Records are `CODE` resources only
//! (the only kind the segment loader consumes), laid out as a flat
//! sequence of `(id: i16 BE, len: u32 BE, bytes)` — not the classic
//! resource fork format, just enough structure for `mac7-runtime` to boot
//! something from a file on disk.

use mac7_endian_codec::{read_u16_be, read_u32_be};
use mac7_segment_loader::{ResourceSource, SegLoaderError, CODE};
use std::collections::HashMap;
use std::io;
use std::path::Path;

pub struct FlatResourceFile {
    entries: HashMap<i16, Vec<u8>>,
}

impl FlatResourceFile {
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        let mut entries = HashMap::new();
        let mut offset = 0usize;
        while offset + 6 <= data.len() {
            let id = read_u16_be(&data, offset) as i16;
            let len = read_u32_be(&data, offset + 2) as usize;
            offset += 6;
            if offset + len > data.len() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated CODE record",
                ));
            }
            entries.insert(id, data[offset..offset + len].to_vec());
            offset += len;
        }
        Ok(FlatResourceFile { entries })
    }
}

impl ResourceSource for FlatResourceFile {
    fn get_resource(&self, kind: mac7_segment_loader::ResType, id: i16) -> Result<Vec<u8>, SegLoaderError> {
        if kind != CODE {
            return Err(SegLoaderError::ResourceNotFound("only CODE is supported", id));
        }
        self.entries
            .get(&id)
            .cloned()
            .ok_or(SegLoaderError::ResourceNotFound("CODE", id))
    }
}
