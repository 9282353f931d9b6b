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

use crate::error::SegLoaderError;
use std::collections::BTreeMap;

pub const MAX_SEGMENTS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Unloaded,
    Loading,
    Loaded,
    Purgeable,
}

/// `handle` doubles as the guest base address: `unmap_executable` has
/// nothing separate to free (see `mac7-cpu-backend`'s docs), so there is
/// no opaque handle representation beyond the address itself.
#[derive(Debug, Clone, Copy)]
pub struct SegmentDescriptor {
    pub handle: u32,
    pub base_addr: u32,
    pub entry_addr: u32,
    pub size: u32,
    pub state: SegmentState,
    pub purgeable: bool,
    pub seg_id: i16,
    pub ref_count: u32,
}

#[derive(Default)]
pub struct SegmentTable {
    entries: BTreeMap<i16, SegmentDescriptor>,
}

impl SegmentTable {
    pub fn new() -> Self {
        SegmentTable { entries: BTreeMap::new() }
    }

    pub fn get(&self, id: i16) -> Option<&SegmentDescriptor> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: i16) -> Option<&mut SegmentDescriptor> {
        self.entries.get_mut(&id)
    }

    pub fn insert(&mut self, desc: SegmentDescriptor) -> Result<(), SegLoaderError> {
        if !self.entries.contains_key(&desc.seg_id) && self.entries.len() >= MAX_SEGMENTS {
            return Err(SegLoaderError::TableFull);
        }
        self.entries.insert(desc.seg_id, desc);
        Ok(())
    }

    pub fn remove(&mut self, id: i16) -> Option<SegmentDescriptor> {
        self.entries.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = i16> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: i16) -> SegmentDescriptor {
        SegmentDescriptor {
            handle: 0x1000,
            base_addr: 0x1000,
            entry_addr: 0x1004,
            size: 64,
            state: SegmentState::Loaded,
            purgeable: false,
            seg_id: id,
            ref_count: 1,
        }
    }

    #[test]
    fn inserts_and_looks_up_by_seg_id() {
        let mut table = SegmentTable::new();
        table.insert(desc(1)).unwrap();
        assert_eq!(table.get(1).unwrap().base_addr, 0x1000);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn rejects_insert_past_capacity() {
        let mut table = SegmentTable::new();
        for i in 0..MAX_SEGMENTS {
            table.insert(desc(i as i16)).unwrap();
        }
        assert!(table.insert(desc(MAX_SEGMENTS as i16)).is_err());
        // Updating an existing entry is still fine at capacity.
        assert!(table.insert(desc(0)).is_ok());
    }
}
