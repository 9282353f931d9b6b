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

//! The classic Memory Manager surface (`NewPtr`, `NewHandle`, `HLock`, ...)
//! exposed to collaborators, backed by two preconfigured [`Zone`]s and a
//! current-zone selector.

use crate::error::HeapError;
use crate::zone::{Handle, Zone};

pub const SYSTEM_ZONE_SIZE: u32 = 2 * 1024 * 1024;
pub const APPLICATION_ZONE_SIZE: u32 = 6 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneId {
    System,
    Application,
}

/// A pointer into one of the manager's zones. Unlike a [`Handle`], the
/// address it names never moves — `NewPtr` memory is not relocatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ptr {
    pub zone: ZoneId,
    pub addr: u32,
}

/// A handle into one of the manager's zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneHandle {
    pub zone: ZoneId,
    pub handle: Handle,
}

pub struct MemoryManager {
    system: Zone,
    application: Zone,
    current: ZoneId,
}

impl MemoryManager {
    pub fn new() -> Self {
        MemoryManager {
            system: Zone::new("system", SYSTEM_ZONE_SIZE, 1024),
            application: Zone::new("application", APPLICATION_ZONE_SIZE, 4096),
            current: ZoneId::Application,
        }
    }

    fn zone(&self, id: ZoneId) -> &Zone {
        match id {
            ZoneId::System => &self.system,
            ZoneId::Application => &self.application,
        }
    }

    fn zone_mut(&mut self, id: ZoneId) -> &mut Zone {
        match id {
            ZoneId::System => &mut self.system,
            ZoneId::Application => &mut self.application,
        }
    }

    pub fn get_zone(&self) -> ZoneId {
        self.current
    }

    pub fn set_zone(&mut self, id: ZoneId) {
        self.current = id;
    }

    pub fn new_ptr(&mut self, n: u32) -> Result<Ptr, HeapError> {
        let zone = self.current;
        let addr = self.zone_mut(zone).new_ptr(n)?;
        Ok(Ptr { zone, addr })
    }

    pub fn new_ptr_clear(&mut self, n: u32) -> Result<Ptr, HeapError> {
        let zone = self.current;
        let addr = self.zone_mut(zone).new_ptr_clear(n)?;
        Ok(Ptr { zone, addr })
    }

    pub fn dispose_ptr(&mut self, p: Ptr) -> Result<(), HeapError> {
        self.zone_mut(p.zone).dispose_ptr(p.addr)
    }

    /// `GetPtrSize` is not directly tracked per-pointer by the zone (only
    /// the block header is), so this recovers it the same way the zone's
    /// own bookkeeping does: by reading the block header one step behind
    /// the payload. Exposed here rather than on `Zone` because pointer
    /// sizing is part of the public Memory Manager contract, not the
    /// zone's internal allocation algorithm.
    pub fn get_ptr_size(&self, p: Ptr) -> Result<u32, HeapError> {
        // Allocate-then-immediately-dispose-then-query is wasteful; instead
        // we reuse handle sizing machinery by treating the pointer's block
        // the same way, since both share one header format.
        self.zone(p.zone).ptr_block_size(p.addr)
    }

    pub fn new_handle(&mut self, n: u32) -> Result<ZoneHandle, HeapError> {
        let zone = self.current;
        let handle = self.zone_mut(zone).new_handle(n)?;
        Ok(ZoneHandle { zone, handle })
    }

    pub fn new_handle_clear(&mut self, n: u32) -> Result<ZoneHandle, HeapError> {
        let zone = self.current;
        let handle = self.zone_mut(zone).new_handle_clear(n)?;
        Ok(ZoneHandle { zone, handle })
    }

    pub fn dispose_handle(&mut self, h: ZoneHandle) -> Result<(), HeapError> {
        self.zone_mut(h.zone).dispose_handle(h.handle)
    }

    pub fn h_lock(&mut self, h: ZoneHandle) -> Result<(), HeapError> {
        self.zone_mut(h.zone).h_lock(h.handle)
    }

    pub fn h_unlock(&mut self, h: ZoneHandle) -> Result<(), HeapError> {
        self.zone_mut(h.zone).h_unlock(h.handle)
    }

    pub fn h_purge(&mut self, h: ZoneHandle) -> Result<(), HeapError> {
        self.zone_mut(h.zone).h_purge(h.handle)
    }

    pub fn h_no_purge(&mut self, h: ZoneHandle) -> Result<(), HeapError> {
        self.zone_mut(h.zone).h_no_purge(h.handle)
    }

    pub fn get_handle_size(&self, h: ZoneHandle) -> Result<u32, HeapError> {
        self.zone(h.zone).get_handle_size(h.handle)
    }

    pub fn set_handle_size(&mut self, h: ZoneHandle, new_size: u32) -> Result<(), HeapError> {
        self.zone_mut(h.zone).set_handle_size(h.handle, new_size)
    }

    pub fn deref_handle(&self, h: ZoneHandle) -> Option<u32> {
        self.zone(h.zone).deref_handle(h.handle)
    }

    pub fn free_mem(&self, zone: ZoneId) -> u32 {
        self.zone(zone).free_mem()
    }

    pub fn max_mem(&self, zone: ZoneId) -> u32 {
        self.zone(zone).max_mem()
    }

    pub fn compact_mem(&mut self, zone: ZoneId, need: u32) -> u32 {
        self.zone_mut(zone).compact_mem(need)
    }

    pub fn purge_mem(&mut self, zone: ZoneId) {
        self.zone_mut(zone).purge_mem()
    }

    pub fn validate(&self, zone: ZoneId) -> Result<(), HeapError> {
        self.zone(zone).validate()
    }

    /// Guest-memory bridge: copies `len` bytes out of the payload at `addr`
    /// within `zone`. Used by the segment loader / CPU backends when the
    /// runtime's own bookkeeping (not guest address space) is the source.
    pub fn read(&self, p: Ptr, len: u32) -> Result<&[u8], HeapError> {
        self.zone(p.zone).read_payload(p.addr, len)
    }

    pub fn write(&mut self, p: Ptr, data: &[u8]) -> Result<(), HeapError> {
        self.zone_mut(p.zone).write_payload(p.addr, data)
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptr_round_trip_restores_free_mem() {
        let mut mm = MemoryManager::new();
        let before = mm.free_mem(ZoneId::Application);
        let p = mm.new_ptr(256).unwrap();
        mm.dispose_ptr(p).unwrap();
        assert_eq!(mm.free_mem(ZoneId::Application), before);
    }

    #[test]
    fn compact_mem_of_zero_never_shrinks_max_mem() {
        let mut mm = MemoryManager::new();
        let h = mm.new_handle(1024).unwrap();
        mm.h_purge(h).unwrap();
        let before = mm.max_mem(ZoneId::Application);
        let after = mm.compact_mem(ZoneId::Application, 0);
        assert!(after >= before);
    }

    #[test]
    fn zone_selector_routes_allocations() {
        let mut mm = MemoryManager::new();
        mm.set_zone(ZoneId::System);
        let p = mm.new_ptr(16).unwrap();
        assert_eq!(p.zone, ZoneId::System);
    }
}
