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

//! Per-process orchestration: the launch sequence, on-demand segment
//! loading, the `_LoadSeg` trap, and cleanup. This is the one module that
//! pulls together `mac7-cpu-backend`, `mac7-code-parser`, and the
//! sibling modules in this crate.

use crate::a5_world::{install_a5_world, A5World};
use crate::bump_alloc::BumpAllocator;
use crate::error::SegLoaderError;
use crate::jump_table::build_jump_table;
use crate::memory::GuestAddressSpace;
use crate::resource::{ResourceSource, CODE};
use crate::segment_table::{SegmentDescriptor, SegmentState, SegmentTable, MAX_SEGMENTS};
use mac7_code_parser::{parse_code0, parse_coden, scan_relocations, Code0Info};
use mac7_cpu_backend::{
    cpu_backend_get, AddressSpace, JtSlotState, MapFlags, OSErr, Registers, TrapContext,
    TrapHandler, TrapTable,
};
use std::cell::RefCell;
use std::rc::Rc;

/// `_LoadSeg`'s A-line trap index on 68K (`TRAP #$A9F0`). PPC has no
/// equivalent fixed index — its `sc` selector *is* the requested segment
/// ID, so `install_load_seg_trap` registers one handler per segment ID
/// there instead of using this constant.
pub const LOAD_SEG_TRAP_INDEX: u16 = 0xF0;

const MAX_GUEST: u32 = 16 * 1024 * 1024;
const ENTRY_SEGMENT: i16 = 1;

pub struct SegmentLoaderContext {
    cpu: Box<dyn mac7_cpu_backend::CpuBackend>,
    mem: GuestAddressSpace,
    traps: TrapTable,
    resources: Box<dyn ResourceSource>,
    bump: BumpAllocator,
    a5_world: Option<A5World>,
    code0: Option<Code0Info>,
    segments: SegmentTable,
    launch_time: std::time::Instant,
    /// Segment IDs a `_LoadSeg` trap has asked for, drained by [`Self::run`]
    /// after each step. The trap handler itself only has a `TrapContext`
    /// (pc/regs/mem) to work with, not a path back to the rest of this
    /// struct, so it records the request here instead — the classic
    /// `void *ctx` problem solved with a shared queue instead of an opaque
    /// pointer.
    pending_loads: Rc<RefCell<Vec<i16>>>,
}

impl SegmentLoaderContext {
    pub fn initialize(
        backend_name: &str,
        resources: Box<dyn ResourceSource>,
    ) -> Result<Self, SegLoaderError> {
        let cpu = cpu_backend_get(backend_name).map_err(SegLoaderError::Backend)?;
        Ok(SegmentLoaderContext {
            cpu,
            mem: GuestAddressSpace::new(MAX_GUEST),
            traps: TrapTable::new(),
            resources,
            bump: BumpAllocator::new(0x1000),
            a5_world: None,
            code0: None,
            segments: SegmentTable::new(),
            launch_time: std::time::Instant::now(),
            pending_loads: Rc::new(RefCell::new(Vec::new())),
        })
    }

    pub fn cpu(&self) -> &dyn mac7_cpu_backend::CpuBackend {
        self.cpu.as_ref()
    }

    pub fn cpu_mut(&mut self) -> &mut dyn mac7_cpu_backend::CpuBackend {
        self.cpu.as_mut()
    }

    pub fn traps_mut(&mut self) -> &mut TrapTable {
        &mut self.traps
    }

    pub fn mem(&self) -> &GuestAddressSpace {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut GuestAddressSpace {
        &mut self.mem
    }

    pub fn a5_world(&self) -> Option<&A5World> {
        self.a5_world.as_ref()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.launch_time.elapsed()
    }

    /// Steps the interpreter until `max_instructions` is exhausted (if
    /// given) or `step` errors — an illegal/unimplemented opcode, a fault,
    /// or a trap handler failure all surface here rather than being
    /// swallowed, since a 68K/PPC program has no portable "clean exit"
    /// signal this core recognizes. Returns the instruction count executed.
    pub fn run(&mut self, max_instructions: Option<u64>) -> Result<u64, SegLoaderError> {
        let mut count = 0u64;
        loop {
            if let Some(budget) = max_instructions {
                if count >= budget {
                    break;
                }
            }
            self.cpu
                .step(&mut self.mem, &mut self.traps)
                .map_err(SegLoaderError::Backend)?;
            count += 1;
            self.cpu.advance_time_base(1);
            self.drain_pending_loads()?;
        }
        Ok(count)
    }

    /// Installs the `_LoadSeg` trap handler(s). Must be called before
    /// [`Self::ensure_entry_segments_loaded`], since the entry segment's
    /// own lazy stubs may fire it immediately.
    ///
    /// Each handler only recovers the segment ID being requested and
    /// queues it — the actual load, relocation, and PC redirect happen in
    /// [`Self::run`] right after the step that triggered the trap, where
    /// the full segment-loader state is available again.
    ///
    /// 68K and PPC need genuinely different wiring here. 68K's lazy stub
    /// passes the segment ID on the stack and always traps through the
    /// same fixed `_LoadSeg` selector (`LOAD_SEG_TRAP_INDEX`), so one
    /// handler registered at that one index suffices. PPC's stub (`li
    /// r3,seg_id; sc; blr`) has no such fixed selector — `sc` dispatches
    /// through the trap table keyed on `R3` itself (`ppc-interp`'s `exec`
    /// computes `selector = gpr[3] & 0xFF`), and `R3` *is* the segment ID
    /// being requested. There is no separate register carrying it, so the
    /// only way to recover which segment a given `sc` is asking for is to
    /// register one handler per possible segment ID and let the trap
    /// table's own index tell each one which ID it is.
    pub fn install_load_seg_trap(&mut self) -> Result<(), SegLoaderError> {
        if self.cpu.name() == "ppc_interp" {
            for seg_id in 1..MAX_SEGMENTS as i16 {
                let pending = self.pending_loads.clone();
                let handler: TrapHandler = Box::new(move |_ctx: TrapContext| {
                    pending.borrow_mut().push(seg_id);
                    Ok(())
                });
                self.traps
                    .register(seg_id as u16 & 0xFF, handler)
                    .map_err(SegLoaderError::Backend)?;
            }
            Ok(())
        } else {
            let pending = self.pending_loads.clone();
            let handler: TrapHandler = Box::new(move |ctx: TrapContext| {
                pending.borrow_mut().push(read_trap_seg_id(&ctx)?);
                Ok(())
            });
            self.traps
                .register(LOAD_SEG_TRAP_INDEX, handler)
                .map_err(SegLoaderError::Backend)
        }
    }

    /// Services every `_LoadSeg` request queued by the trap handler since
    /// the last call: loads the segment if needed and redirects PC straight
    /// to its entry point, mirroring real `_LoadSeg`'s "never returns to the
    /// lazy stub, jumps into the routine instead" behavior.
    fn drain_pending_loads(&mut self) -> Result<(), SegLoaderError> {
        let ids: Vec<i16> = self.pending_loads.borrow_mut().drain(..).collect();
        for id in ids {
            self.load_segment(id)?;
            let entry = self.get_segment_entry_point(id)?;
            self.cpu.set_pc(entry);
        }
        Ok(())
    }

    /// `CODE 0` parse, A5-world install, jump-table build, then a
    /// non-lazy load of segment 1 (the entry segment).
    pub fn ensure_entry_segments_loaded(&mut self) -> Result<(), SegLoaderError> {
        let code0_bytes = self.resources.get_resource(CODE, 0)?;
        let code0 = parse_code0(&code0_bytes)?;

        let world = install_a5_world(self.cpu.as_mut(), &mut self.mem, &mut self.bump, &code0)?;
        build_jump_table(self.cpu.as_ref(), &mut self.mem, world.jt_base, world.jt_count)?;

        self.a5_world = Some(world);
        self.code0 = Some(code0);

        self.load_segment(ENTRY_SEGMENT)
    }

    /// Loads `id` if not already resident: fetches its `CODE` resource,
    /// maps it into guest memory, applies relocations, and records the
    /// descriptor. No-op if already `Loaded`.
    pub fn load_segment(&mut self, id: i16) -> Result<(), SegLoaderError> {
        if let Some(desc) = self.segments.get(id) {
            if desc.state == SegmentState::Loaded {
                return Ok(());
            }
        }
        let world = self.a5_world.ok_or(SegLoaderError::A5WorldInvariant("load_segment before ensure_entry_segments_loaded"))?;

        let raw = self.resources.get_resource(CODE, id)?;
        let info = parse_coden(&raw)?;
        let body = &raw[info.body_offset..];

        let base = self
            .bump
            .alloc(&mut self.mem, body.len() as u32, MapFlags::READ | MapFlags::WRITE | MapFlags::EXECUTE)
            .map_err(SegLoaderError::Backend)?;
        self.mem.write_bytes(base, body).map_err(SegLoaderError::Backend)?;

        let table = scan_relocations(body);
        self.cpu
            .relocate(&mut self.mem, &table, base, world.jt_base, world.base)
            .map_err(SegLoaderError::Backend)?;

        let entry_addr = info.entry_addr(base);
        self.segments.insert(SegmentDescriptor {
            handle: base,
            base_addr: base,
            entry_addr,
            size: body.len() as u32,
            state: SegmentState::Loaded,
            purgeable: false,
            seg_id: id,
            ref_count: 1,
        })?;
        Ok(())
    }

    /// Drops the segment's ref count; unmaps it once it reaches zero.
    /// The underlying guest memory is never reclaimed (no
    /// defragmentation, per §4.7) — only the descriptor transitions to
    /// `Unloaded`. A no-op if `id` was never loaded.
    pub fn unload_segment(&mut self, id: i16) -> Result<(), SegLoaderError> {
        let desc = match self.segments.get_mut(id) {
            Some(d) => d,
            None => return Ok(()),
        };
        if desc.ref_count > 0 {
            desc.ref_count -= 1;
        }
        if desc.ref_count == 0 && desc.state == SegmentState::Loaded {
            desc.state = SegmentState::Unloaded;
        }
        Ok(())
    }

    pub fn get_segment_entry_point(&self, id: i16) -> Result<u32, SegLoaderError> {
        self.segments
            .get(id)
            .filter(|d| d.state == SegmentState::Loaded)
            .map(|d| d.entry_addr)
            .ok_or(SegLoaderError::UnknownSegment(id))
    }

    /// Reads a jump-table slot, loading the segment it lazily refers to
    /// if needed, and returns the address control should land on.
    pub fn resolve_jump_index(&mut self, jt_index: u16) -> Result<u32, SegLoaderError> {
        let world = self.a5_world.ok_or(SegLoaderError::A5WorldInvariant("resolve_jump_index before a5 world exists"))?;
        if jt_index as usize >= world.jt_count {
            return Err(SegLoaderError::JtIndexOutOfRange(jt_index));
        }
        let slot_addr = world.jt_base + jt_index as u32 * self.cpu.jt_entry_size();
        match self.cpu.classify_jt_slot(&self.mem, slot_addr).map_err(SegLoaderError::Backend)? {
            JtSlotState::Resolved { target } => Ok(target),
            JtSlotState::Lazy { seg_id } => {
                self.load_segment(seg_id)?;
                let entry = self.get_segment_entry_point(seg_id)?;
                self.cpu.write_jt_slot(&mut self.mem, slot_addr, entry).map_err(SegLoaderError::Backend)?;
                Ok(entry)
            }
            JtSlotState::Unknown => Err(SegLoaderError::BadJtSlot(slot_addr)),
        }
    }

    /// Tears down in reverse order of construction: drops every `Loaded`/
    /// `Purgeable` segment's ref count to zero, then drops the context
    /// itself (address space, trap table, resource handle included).
    /// Memory isn't reclaimed (no `unmap_executable` op exists — see
    /// `DESIGN.md`), so this is bookkeeping, not a free.
    pub fn cleanup(mut self) {
        let ids: Vec<i16> = self
            .segments
            .ids()
            .filter(|&id| {
                self.segments
                    .get(id)
                    .map(|d| matches!(d.state, SegmentState::Loaded | SegmentState::Purgeable))
                    .unwrap_or(false)
            })
            .collect();
        for id in ids {
            while self.segments.get(id).map(|d| d.ref_count).unwrap_or(0) > 0 {
                let _ = self.unload_segment(id);
            }
        }
        drop(self);
    }
}

/// Recovers the segment ID a 68K `_LoadSeg` caller is asking for: a word
/// pushed just below the trap, on the active stack pointer (`"a7"` —
/// `stack_register_names` reports the inspectable `usp`/`ssp` shadow
/// registers, not the one `push`/`pop` actually address, so this reads
/// `"a7"` directly instead). PPC needs no equivalent: the segment ID *is*
/// the trap selector there, recovered from the registration index instead
/// of a register read — see `install_load_seg_trap`.
fn read_trap_seg_id(ctx: &TrapContext) -> Result<i16, OSErr> {
    let sp = ctx.regs.get("a7")?;
    Ok(ctx.mem.read_u16(sp)? as i16)
}
