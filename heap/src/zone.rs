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

//! A single heap zone: a contiguous byte arena with segregated freelists,
//! a master-pointer table, and a compactor.
//!
//! Block headers and freelist nodes are embedded directly in the arena,
//! the way the original Memory Manager lays them out, rather than kept in
//! a side table — this is what lets [`Zone::compact_mem`] slide payloads
//! around with nothing but arena byte copies.

use crate::error::HeapError;

const ALIGN: u32 = 8;
/// size:u32, flags:u32, prev_size:u32, master_slot:i32, plus a debug-only
/// magic word (see [`BLOCK_MAGIC_ALLOCATED`]/[`BLOCK_MAGIC_FREE`]) that
/// isn't part of the portable data model.
#[cfg(debug_assertions)]
const HEADER_SIZE: u32 = 20;
#[cfg(not(debug_assertions))]
const HEADER_SIZE: u32 = 16;
const FREENODE_SIZE: u32 = 8; // next:u32, prev:u32 (both are arena offsets of the header start)
const MIN_BLOCK: u32 = align_up(HEADER_SIZE + FREENODE_SIZE);
const NIL: u32 = u32::MAX;
const NUM_CLASSES: usize = 8;

/// Recovered from `original_source/src/MemoryMgr/MemoryManager.c`'s heap
/// validation magic numbers. Written/checked only under `cfg(debug_assertions)`,
/// the way the original guards this behind a debug build — a diagnostic
/// aid for catching corruption early, not part of the portable block layout.
#[cfg(debug_assertions)]
const BLOCK_MAGIC_ALLOCATED: u32 = 0xA110_C8ED;
#[cfg(debug_assertions)]
const BLOCK_MAGIC_FREE: u32 = 0xFEEE_FEEE;

bitflags::bitflags! {
    struct Flags: u32 {
        const FREE      = 0x1;
        const PTR       = 0x2;
        const HANDLE    = 0x4;
        const LOCKED    = 0x8;
        const PURGEABLE = 0x10;
    }
}

const fn align_up(n: u32) -> u32 {
    (n + (ALIGN - 1)) & !(ALIGN - 1)
}

fn size_class(size: u32) -> usize {
    match size {
        0..=64 => 0,
        65..=128 => 1,
        129..=256 => 2,
        257..=512 => 3,
        513..=1024 => 4,
        1025..=2048 => 5,
        2049..=4096 => 6,
        _ => 7,
    }
}

/// An opaque handle: stable for its lifetime even though the payload it
/// refers to may move under compaction. Internally an index into the
/// zone's master-pointer table — the table slot's own address would be
/// the C-style "handle value"; here the index plays that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

struct BlockView<'a> {
    arena: &'a [u8],
    at: u32,
}

impl<'a> BlockView<'a> {
    fn size(&self) -> u32 {
        u32::from_ne_bytes(self.arena[self.at as usize..][..4].try_into().unwrap())
    }
    fn flags(&self) -> Flags {
        let bits = u32::from_ne_bytes(self.arena[self.at as usize + 4..][..4].try_into().unwrap());
        Flags::from_bits_truncate(bits)
    }
    fn prev_size(&self) -> u32 {
        u32::from_ne_bytes(self.arena[self.at as usize + 8..][..4].try_into().unwrap())
    }
    fn master_slot(&self) -> i32 {
        i32::from_ne_bytes(self.arena[self.at as usize + 12..][..4].try_into().unwrap())
    }
    #[cfg(debug_assertions)]
    fn magic(&self) -> u32 {
        u32::from_ne_bytes(self.arena[self.at as usize + 16..][..4].try_into().unwrap())
    }
    fn payload(&self) -> u32 {
        self.at + HEADER_SIZE
    }
}

/// A contiguous heap region: base and limit are the arena's bounds.
pub struct Zone {
    name: &'static str,
    arena: Vec<u8>,
    freelists: [u32; NUM_CLASSES],
    master_ptrs: Vec<i64>, // -1 = unused slot, -2 = allocated but purged, >=0 = payload offset
    free_total: u32,
}

impl Zone {
    pub fn new(name: &'static str, size: u32, master_capacity: usize) -> Self {
        assert!(size >= MIN_BLOCK);
        let mut arena = vec![0u8; size as usize];
        write_header(&mut arena, 0, size, Flags::FREE, 0, -1);
        write_freenode(&mut arena, 0, 0, 0);
        Zone {
            name,
            arena,
            freelists: [NIL; NUM_CLASSES],
            master_ptrs: vec![-1; master_capacity],
            free_total: size,
        }
        .with_initial_free_block(size)
    }

    fn with_initial_free_block(mut self, size: u32) -> Self {
        self.freelists[size_class(size) as usize] = 0;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base(&self) -> u32 {
        0
    }

    pub fn limit(&self) -> u32 {
        self.arena.len() as u32
    }

    /// `FreeMem`: total bytes across every free block.
    pub fn free_mem(&self) -> u32 {
        self.free_total
    }

    /// `MaxMem`: size of the single largest free block, without compacting.
    pub fn max_mem(&self) -> u32 {
        let mut best = 0;
        self.walk_blocks(|b| {
            if b.flags().contains(Flags::FREE) {
                best = best.max(b.size());
            }
        });
        best
    }

    fn walk_blocks(&self, mut f: impl FnMut(BlockView)) {
        let mut at = 0u32;
        while at < self.limit() {
            let b = BlockView { arena: &self.arena, at };
            let size = b.size();
            f(b);
            if size == 0 {
                break;
            }
            at += size;
        }
    }

    // ---- allocation ----------------------------------------------------

    /// `NewPtr`: allocate a raw payload of `n` bytes. Returns the payload
    /// offset within this zone's arena.
    pub fn new_ptr(&mut self, n: u32) -> Result<u32, HeapError> {
        let need = align_up(n + HEADER_SIZE).max(MIN_BLOCK);
        let at = self.find_or_compact(need)?;
        self.commit_block(at, need, Flags::PTR, -1);
        Ok(at + HEADER_SIZE)
    }

    pub fn new_ptr_clear(&mut self, n: u32) -> Result<u32, HeapError> {
        let addr = self.new_ptr(n)?;
        self.arena[addr as usize..(addr + n) as usize].fill(0);
        Ok(addr)
    }

    /// `NewHandle`: allocate a relocatable block behind a fresh master
    /// pointer. Returns the [`Handle`].
    pub fn new_handle(&mut self, n: u32) -> Result<Handle, HeapError> {
        let slot = self.alloc_master_slot()?;
        let need = align_up(n + HEADER_SIZE).max(MIN_BLOCK);
        let at = match self.find_or_compact(need) {
            Ok(at) => at,
            Err(e) => {
                self.master_ptrs[slot] = -1;
                return Err(e);
            }
        };
        self.commit_block(at, need, Flags::HANDLE, slot as i32);
        self.master_ptrs[slot] = (at + HEADER_SIZE) as i64;
        Ok(Handle(slot as u32))
    }

    pub fn new_handle_clear(&mut self, n: u32) -> Result<Handle, HeapError> {
        let h = self.new_handle(n)?;
        let addr = self.deref_handle(h).unwrap();
        self.arena[addr as usize..(addr + n) as usize].fill(0);
        Ok(h)
    }

    fn alloc_master_slot(&mut self) -> Result<usize, HeapError> {
        if let Some(i) = self.master_ptrs.iter().position(|&p| p == -1) {
            return Ok(i);
        }
        self.master_ptrs.push(-1);
        Ok(self.master_ptrs.len() - 1)
    }

    fn find_or_compact(&mut self, need: u32) -> Result<u32, HeapError> {
        if let Some(at) = self.find_free_block(need) {
            return Ok(at);
        }
        self.compact_mem(need);
        self.find_free_block(need).ok_or(HeapError::OutOfMemory(need))
    }

    /// First-fit search starting at `size_class(need)` and widening —
    /// within a size class this behaves like best-fit in practice because
    /// every block in a class is already roughly the same size.
    fn find_free_block(&self, need: u32) -> Option<u32> {
        for class in size_class(need)..NUM_CLASSES {
            let mut at = self.freelists[class];
            if at == NIL {
                continue;
            }
            let start = at;
            loop {
                let b = BlockView { arena: &self.arena, at };
                if b.size() >= need {
                    return Some(at);
                }
                let next = read_freenode(&self.arena, at).0;
                if next == start {
                    break;
                }
                at = next;
            }
        }
        None
    }

    fn commit_block(&mut self, at: u32, need: u32, kind: Flags, master_slot: i32) {
        let b = BlockView { arena: &self.arena, at };
        let total = b.size();
        let prev_size = b.prev_size();
        self.unlink_free(at);
        self.free_total -= total;

        let remainder = total - need;
        if remainder >= MIN_BLOCK {
            write_header(&mut self.arena, at, need, kind, prev_size, master_slot);
            let tail = at + need;
            write_header(&mut self.arena, tail, remainder, Flags::FREE, need, -1);
            self.link_free(tail);
            self.free_total += remainder;
            self.fixup_next_prev_size(tail + remainder, remainder);
        } else {
            write_header(&mut self.arena, at, total, kind, prev_size, master_slot);
        }
    }

    fn fixup_next_prev_size(&mut self, next_at: u32, prev_size: u32) {
        if next_at < self.limit() {
            set_prev_size(&mut self.arena, next_at, prev_size);
        }
    }

    // ---- disposal --------------------------------------------------------

    pub fn dispose_ptr(&mut self, addr: u32) -> Result<(), HeapError> {
        let at = addr.checked_sub(HEADER_SIZE).ok_or(HeapError::ParamErr(addr))?;
        self.validate_block_at(at)?;
        self.free_block(at);
        Ok(())
    }

    pub fn dispose_handle(&mut self, h: Handle) -> Result<(), HeapError> {
        let addr = self.deref_handle(h).ok_or(HeapError::BadHandle)?;
        let at = addr - HEADER_SIZE;
        self.validate_block_at(at)?;
        self.free_block(at);
        self.master_ptrs[h.0 as usize] = -1;
        Ok(())
    }

    fn validate_block_at(&self, at: u32) -> Result<(), HeapError> {
        if at >= self.limit() {
            return Err(HeapError::ParamErr(at));
        }
        let b = BlockView { arena: &self.arena, at };
        let size = b.size();
        if size == 0 || size != align_up(size) || at + size > self.limit() {
            return Err(HeapError::ParamErr(at));
        }
        if b.prev_size() > at {
            return Err(HeapError::ParamErr(at));
        }
        #[cfg(debug_assertions)]
        {
            let expected = if b.flags().contains(Flags::FREE) { BLOCK_MAGIC_FREE } else { BLOCK_MAGIC_ALLOCATED };
            if b.magic() != expected {
                return Err(HeapError::BlockMagicCorruption(at));
            }
        }
        Ok(())
    }

    fn free_block(&mut self, at: u32) {
        let b = BlockView { arena: &self.arena, at };
        let mut size = b.size();
        let mut start = at;
        let prev_size = b.prev_size();
        write_header(&mut self.arena, at, size, Flags::FREE, prev_size, -1);
        self.free_total += size;

        // Coalesce forward.
        let next_at = start + size;
        if next_at < self.limit() {
            let next = BlockView { arena: &self.arena, at: next_at };
            if next.flags().contains(Flags::FREE) {
                let next_size = next.size();
                self.unlink_free(next_at);
                size += next_size;
                write_header(&mut self.arena, start, size, Flags::FREE, prev_size, -1);
            }
        }

        // Coalesce backward.
        if prev_size > 0 && prev_size <= start {
            let prev_at = start - prev_size;
            let prev = BlockView { arena: &self.arena, at: prev_at };
            if prev.flags().contains(Flags::FREE) {
                self.unlink_free(prev_at);
                size += prev_size;
                start = prev_at;
                let earlier_prev = prev.prev_size();
                write_header(&mut self.arena, start, size, Flags::FREE, earlier_prev, -1);
            }
        }

        self.link_free(start);
        let after = start + size;
        self.fixup_next_prev_size(after, size);

        if let Err(HeapError::FreelistCorruption(class)) = self.validate_freelists() {
            log::warn!(
                "heap[{}]: freelist corruption detected in class {class} after free at {at:#x}; class reset",
                self.name
            );
            self.freelists[class] = NIL;
        }
    }

    // ---- freelist plumbing ----------------------------------------------

    /// LIFO insertion at the head of the size class's ring.
    fn link_free(&mut self, at: u32) {
        let size = BlockView { arena: &self.arena, at }.size();
        let class = size_class(size);
        let head = self.freelists[class];
        if head == NIL {
            write_freenode(&mut self.arena, at, at, at);
        } else {
            let (_, tail) = read_freenode(&self.arena, head); // head.prev is the ring's tail
            write_freenode(&mut self.arena, at, head, tail);
            set_node_next(&mut self.arena, tail, at);
            set_node_prev(&mut self.arena, head, at);
        }
        self.freelists[class] = at;
    }

    fn unlink_free(&mut self, at: u32) {
        let size = BlockView { arena: &self.arena, at }.size();
        let class = size_class(size);
        let (next, prev) = read_freenode(&self.arena, at);
        if next == at {
            self.freelists[class] = NIL;
            return;
        }
        set_node_next(&mut self.arena, prev, next);
        set_node_prev(&mut self.arena, next, prev);
        if self.freelists[class] == at {
            self.freelists[class] = next;
        }
    }

    fn validate_freelists(&self) -> Result<(), HeapError> {
        for class in 0..NUM_CLASSES {
            let head = self.freelists[class];
            if head == NIL {
                continue;
            }
            let mut at = head;
            let mut steps = 0u32;
            loop {
                if at >= self.limit() {
                    return Err(HeapError::FreelistCorruption(class));
                }
                let b = BlockView { arena: &self.arena, at };
                if !b.flags().contains(Flags::FREE) || size_class(b.size()) != class {
                    return Err(HeapError::FreelistCorruption(class));
                }
                #[cfg(debug_assertions)]
                if b.magic() != BLOCK_MAGIC_FREE {
                    return Err(HeapError::FreelistCorruption(class));
                }
                let (next, prev) = read_freenode(&self.arena, at);
                let (_, prev_of_next) = read_freenode(&self.arena, next);
                if prev_of_next != at {
                    return Err(HeapError::FreelistCorruption(class));
                }
                let _ = prev;
                at = next;
                steps += 1;
                if at == head || steps > (self.limit() / MIN_BLOCK + 1) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Exposed so tests can assert the invariants of spec §8 directly.
    pub fn validate(&self) -> Result<(), HeapError> {
        let mut total = 0u32;
        self.walk_blocks(|b| total += b.size());
        if total != self.limit() {
            return Err(HeapError::ParamErr(total));
        }
        self.validate_freelists()
    }

    // ---- handles ----------------------------------------------------------

    pub fn deref_handle(&self, h: Handle) -> Option<u32> {
        match self.master_ptrs.get(h.0 as usize) {
            Some(&p) if p >= 0 => Some(p as u32),
            _ => None,
        }
    }

    pub fn get_handle_size(&self, h: Handle) -> Result<u32, HeapError> {
        let addr = self.deref_handle(h).ok_or(HeapError::BadHandle)?;
        let b = BlockView { arena: &self.arena, at: addr - HEADER_SIZE };
        Ok(b.size() - HEADER_SIZE)
    }

    pub fn set_handle_size(&mut self, h: Handle, new_size: u32) -> Result<(), HeapError> {
        let old_size = self.get_handle_size(h)?;
        if new_size == old_size {
            return Ok(());
        }
        let old_addr = self.deref_handle(h).unwrap();
        let new_handle = self.new_handle(new_size)?;
        let new_addr = self.deref_handle(new_handle).unwrap();
        let copy_len = old_size.min(new_size) as usize;
        let (src, dst) = (old_addr as usize, new_addr as usize);
        let mut tmp = vec![0u8; copy_len];
        tmp.copy_from_slice(&self.arena[src..src + copy_len]);
        self.arena[dst..dst + copy_len].copy_from_slice(&tmp);

        let at = old_addr - HEADER_SIZE;
        self.validate_block_at(at)?;
        self.free_block(at);
        self.master_ptrs[h.0 as usize] = self.master_ptrs[new_handle.0 as usize];
        self.master_ptrs[new_handle.0 as usize] = -1;
        set_master_slot(&mut self.arena, new_addr - HEADER_SIZE, h.0 as i32);
        Ok(())
    }

    pub fn h_lock(&mut self, h: Handle) -> Result<(), HeapError> {
        self.set_flag(h, Flags::LOCKED, true)
    }

    pub fn h_unlock(&mut self, h: Handle) -> Result<(), HeapError> {
        self.set_flag(h, Flags::LOCKED, false)
    }

    pub fn h_purge(&mut self, h: Handle) -> Result<(), HeapError> {
        self.set_flag(h, Flags::PURGEABLE, true)
    }

    pub fn h_no_purge(&mut self, h: Handle) -> Result<(), HeapError> {
        self.set_flag(h, Flags::PURGEABLE, false)
    }

    fn set_flag(&mut self, h: Handle, flag: Flags, on: bool) -> Result<(), HeapError> {
        let addr = self.deref_handle(h).ok_or(HeapError::BadHandle)?;
        let at = addr - HEADER_SIZE;
        let mut flags = BlockView { arena: &self.arena, at }.flags();
        flags.set(flag, on);
        set_flags(&mut self.arena, at, flags);
        Ok(())
    }

    /// Marks every unlocked `HANDLE | PURGEABLE` block free. Single pass,
    /// no compaction.
    pub fn purge_mem(&mut self) {
        let mut victims = Vec::new();
        self.walk_blocks(|b| {
            let flags = b.flags();
            if flags.contains(Flags::HANDLE)
                && flags.contains(Flags::PURGEABLE)
                && !flags.contains(Flags::LOCKED)
            {
                victims.push((b.at, b.master_slot()));
            }
        });
        for (at, slot) in victims {
            if slot >= 0 {
                self.master_ptrs[slot as usize] = -2;
            }
            self.free_block(at);
        }
    }

    /// Purges, then slides relocatable unlocked handle blocks down to
    /// close gaps left by free blocks. Updates master pointers as blocks
    /// move. Returns the new maximum free block size.
    pub fn compact_mem(&mut self, _need: u32) -> u32 {
        self.purge_mem();

        struct Live {
            at: u32,
            size: u32,
            flags: Flags,
            master_slot: i32,
        }

        let limit = self.limit();
        let mut live = Vec::new();
        self.walk_blocks(|b| {
            if !b.flags().contains(Flags::FREE) {
                live.push(Live {
                    at: b.at,
                    size: b.size(),
                    flags: b.flags(),
                    master_slot: b.master_slot(),
                });
            }
        });

        let mut write_at = 0u32;
        let mut moves = Vec::new();
        let mut free_spans = Vec::new();

        for blk in &live {
            let movable = blk.flags.contains(Flags::HANDLE) && !blk.flags.contains(Flags::LOCKED);
            if movable {
                if write_at != blk.at {
                    self.arena
                        .copy_within(blk.at as usize..(blk.at + blk.size) as usize, write_at as usize);
                    if blk.master_slot >= 0 {
                        moves.push((blk.master_slot as usize, write_at + HEADER_SIZE));
                    }
                }
                write_at += blk.size;
            } else {
                // Locked or non-handle blocks stay at their own address;
                // whatever gap now precedes them becomes one free span.
                if write_at < blk.at {
                    free_spans.push((write_at, blk.at - write_at));
                }
                write_at = blk.at + blk.size;
            }
        }
        if write_at < limit {
            free_spans.push((write_at, limit - write_at));
        }

        for (slot, new_addr) in moves {
            self.master_ptrs[slot] = new_addr as i64;
        }
        for (at, size) in free_spans {
            write_header(&mut self.arena, at, size, Flags::FREE, 0, -1);
        }

        // Rebuild prev_size links and every freelist from the (now
        // internally consistent) block headers in one linear pass.
        self.relink_all_blocks();
        self.max_mem()
    }

    /// Walks the arena once, rebuilding `prev_size` links and every
    /// freelist from the block headers already present (sizes/flags are
    /// authoritative after a compaction pass).
    fn relink_all_blocks(&mut self) {
        self.freelists = [NIL; NUM_CLASSES];
        self.free_total = 0;
        let mut at = 0u32;
        let mut prev_size = 0u32;
        let limit = self.limit();
        while at < limit {
            let size = BlockView { arena: &self.arena, at }.size();
            set_prev_size(&mut self.arena, at, prev_size);
            let flags = BlockView { arena: &self.arena, at }.flags();
            if flags.contains(Flags::FREE) {
                self.free_total += size;
                self.link_free(at);
            }
            prev_size = size;
            at += size;
        }
    }

    pub fn master_ptr_count(&self) -> usize {
        self.master_ptrs.len()
    }

    /// Size requested for the raw pointer payload at `addr` (i.e.
    /// `GetPtrSize`): the block's total size minus its header.
    pub fn ptr_block_size(&self, addr: u32) -> Result<u32, HeapError> {
        let at = addr.checked_sub(HEADER_SIZE).ok_or(HeapError::ParamErr(addr))?;
        self.validate_block_at(at)?;
        Ok(BlockView { arena: &self.arena, at }.size() - HEADER_SIZE)
    }

    pub fn read_payload(&self, addr: u32, len: u32) -> Result<&[u8], HeapError> {
        self.arena
            .get(addr as usize..(addr + len) as usize)
            .ok_or(HeapError::ParamErr(addr))
    }

    pub fn write_payload(&mut self, addr: u32, data: &[u8]) -> Result<(), HeapError> {
        let len = data.len() as u32;
        if addr as usize + data.len() > self.arena.len() {
            return Err(HeapError::ParamErr(addr));
        }
        self.arena[addr as usize..(addr + len) as usize].copy_from_slice(data);
        Ok(())
    }
}

// ---- raw header / freenode access --------------------------------------

fn write_header(arena: &mut [u8], at: u32, size: u32, flags: Flags, prev_size: u32, master_slot: i32) {
    let at = at as usize;
    arena[at..at + 4].copy_from_slice(&size.to_ne_bytes());
    arena[at + 4..at + 8].copy_from_slice(&flags.bits().to_ne_bytes());
    arena[at + 8..at + 12].copy_from_slice(&prev_size.to_ne_bytes());
    arena[at + 12..at + 16].copy_from_slice(&master_slot.to_ne_bytes());
    #[cfg(debug_assertions)]
    {
        let magic = if flags.contains(Flags::FREE) { BLOCK_MAGIC_FREE } else { BLOCK_MAGIC_ALLOCATED };
        arena[at + 16..at + 20].copy_from_slice(&magic.to_ne_bytes());
    }
}

fn set_prev_size(arena: &mut [u8], at: u32, prev_size: u32) {
    let at = at as usize;
    arena[at + 8..at + 12].copy_from_slice(&prev_size.to_ne_bytes());
}

fn set_flags(arena: &mut [u8], at: u32, flags: Flags) {
    let at = at as usize;
    arena[at + 4..at + 8].copy_from_slice(&flags.bits().to_ne_bytes());
}

fn set_master_slot(arena: &mut [u8], at: u32, slot: i32) {
    let at = at as usize;
    arena[at + 12..at + 16].copy_from_slice(&slot.to_ne_bytes());
}

fn write_freenode(arena: &mut [u8], at: u32, next: u32, prev: u32) {
    let p = (at + HEADER_SIZE) as usize;
    arena[p..p + 4].copy_from_slice(&next.to_ne_bytes());
    arena[p + 4..p + 8].copy_from_slice(&prev.to_ne_bytes());
}

fn set_node_next(arena: &mut [u8], at: u32, next: u32) {
    let p = (at + HEADER_SIZE) as usize;
    arena[p..p + 4].copy_from_slice(&next.to_ne_bytes());
}

fn set_node_prev(arena: &mut [u8], at: u32, prev: u32) {
    let p = (at + HEADER_SIZE) as usize + 4;
    arena[p..p + 4].copy_from_slice(&prev.to_ne_bytes());
}

fn read_freenode(arena: &[u8], at: u32) -> (u32, u32) {
    let p = (at + HEADER_SIZE) as usize;
    let next = u32::from_ne_bytes(arena[p..p + 4].try_into().unwrap());
    let prev = u32::from_ne_bytes(arena[p + 4..p + 8].try_into().unwrap());
    (next, prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_zone_alloc_then_oom() {
        let mut z = Zone::new("test", 4096, 16);
        let p = z.new_ptr(4096 - HEADER_SIZE).unwrap();
        assert_eq!(p, HEADER_SIZE);
        assert!(matches!(z.new_ptr(1), Err(HeapError::OutOfMemory(_))));
        z.validate().unwrap();
    }

    #[test]
    fn ptr_round_trip_restores_free_mem() {
        let mut z = Zone::new("test", 1 << 16, 16);
        let before = z.free_mem();
        let p = z.new_ptr(100).unwrap();
        z.dispose_ptr(p).unwrap();
        assert_eq!(z.free_mem(), before);
        z.validate().unwrap();
    }

    #[test]
    fn handle_has_requested_size_and_nonnull() {
        let mut z = Zone::new("test", 1 << 16, 16);
        let h = z.new_handle(37).unwrap();
        assert_eq!(z.get_handle_size(h).unwrap(), 37);
        assert!(z.deref_handle(h).is_some());
    }

    #[test]
    fn purge_nulls_unlocked_purgeable_handle() {
        let mut z = Zone::new("test", 1 << 16, 16);
        let h = z.new_handle(64).unwrap();
        z.h_purge(h).unwrap();
        z.purge_mem();
        assert_eq!(z.deref_handle(h), None);
    }

    #[test]
    fn locked_handle_survives_purge() {
        let mut z = Zone::new("test", 1 << 16, 16);
        let h = z.new_handle(64).unwrap();
        z.h_purge(h).unwrap();
        z.h_lock(h).unwrap();
        z.purge_mem();
        assert!(z.deref_handle(h).is_some());
    }

    #[test]
    fn compact_mem_never_decreases_max_mem() {
        let mut z = Zone::new("test", 1 << 16, 64);
        let mut handles = Vec::new();
        for _ in 0..20 {
            handles.push(z.new_handle(200).unwrap());
        }
        for h in handles.iter().step_by(2) {
            z.dispose_handle(*h).unwrap();
        }
        let before = z.max_mem();
        let after = z.compact_mem(0);
        assert!(after >= before);
        z.validate().unwrap();
    }

    #[test]
    fn compaction_updates_master_pointer_in_place() {
        let mut z = Zone::new("test", 1 << 14, 16);
        let h1 = z.new_handle(64).unwrap();
        let h2 = z.new_handle(64).unwrap();
        z.dispose_handle(h1).unwrap();
        let addr_before = z.deref_handle(h2).unwrap();
        z.compact_mem(0);
        let addr_after = z.deref_handle(h2).unwrap();
        assert!(addr_after <= addr_before);
        assert_eq!(z.get_handle_size(h2).unwrap(), 64);
    }

    #[test]
    fn roundtrip_alloc_free_stress() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(42);
        let mut z = Zone::new("test", 1 << 20, 256);
        let mut ptrs = Vec::new();
        for _ in 0..100 {
            let size = rng.gen_range(1..4096);
            ptrs.push(z.new_ptr(size).unwrap());
        }
        for (i, p) in ptrs.iter().enumerate() {
            if i % 2 == 0 {
                z.dispose_ptr(*p).unwrap();
            }
        }
        for _ in 0..20 {
            let size = rng.gen_range(1..4096);
            let _ = z.new_ptr(size);
        }
        z.validate().unwrap();
    }

    #[test]
    #[cfg(debug_assertions)]
    fn corrupted_block_magic_is_detected_on_dispose() {
        let mut z = Zone::new("test", 1 << 16, 16);
        let p = z.new_ptr(64).unwrap();
        let at = (p - HEADER_SIZE) as usize;
        z.arena[at + 16..at + 20].copy_from_slice(&0xDEAD_BEEFu32.to_ne_bytes());
        assert!(matches!(z.dispose_ptr(p), Err(HeapError::BlockMagicCorruption(_))));
    }

    #[test]
    fn set_handle_size_grows_and_preserves_content() {
        let mut z = Zone::new("test", 1 << 16, 16);
        let h = z.new_handle(8).unwrap();
        let addr = z.deref_handle(h).unwrap();
        z.arena[addr as usize..addr as usize + 8].copy_from_slice(b"deadbeef");
        z.set_handle_size(h, 64).unwrap();
        let new_addr = z.deref_handle(h).unwrap();
        assert_eq!(&z.arena[new_addr as usize..new_addr as usize + 8], b"deadbeef");
        assert_eq!(z.get_handle_size(h).unwrap(), 64);
    }
}
