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

//! The literal end-to-end scenarios from `spec.md` §8, run against the
//! crates they exercise directly rather than through the CLI binary.

use mac7_cpu_backend::{
    AddressSpace, CpuBackend, JtSlotState, OSErr, Registers, TrapContext, TrapTable,
};
use mac7_guest_memory::GuestMemory;
use mac7_heap::{MemoryManager, ZoneId};
use mac7_lowmem_globals::packbits;
use mac7_m68k_interp::M68kBackend;
use mac7_segment_loader::{SegmentLoaderContext, TestResourceFile, CODE};
use std::sync::{Arc, Mutex};

struct Mem(GuestMemory);
impl AddressSpace for Mem {
    fn read_u8(&self, a: u32) -> Result<u8, OSErr> {
        Ok(self.0.read_u8(a)?)
    }
    fn read_u16(&self, a: u32) -> Result<u16, OSErr> {
        Ok(self.0.read_u16(a)?)
    }
    fn read_u32(&self, a: u32) -> Result<u32, OSErr> {
        Ok(self.0.read_u32(a)?)
    }
    fn write_u8(&mut self, a: u32, v: u8) -> Result<(), OSErr> {
        Ok(self.0.write_u8(a, v)?)
    }
    fn write_u16(&mut self, a: u32, v: u16) -> Result<(), OSErr> {
        Ok(self.0.write_u16(a, v)?)
    }
    fn write_u32(&mut self, a: u32, v: u32) -> Result<(), OSErr> {
        Ok(self.0.write_u32(a, v)?)
    }
    fn read_bytes(&self, a: u32, buf: &mut [u8]) -> Result<(), OSErr> {
        Ok(self.0.memcpy_from_guest(buf, a)?)
    }
    fn write_bytes(&mut self, a: u32, data: &[u8]) -> Result<(), OSErr> {
        Ok(self.0.memcpy_into_guest(a, data)?)
    }
    fn ensure_mapped(
        &mut self,
        _a: u32,
        _l: u32,
        _f: mac7_cpu_backend::MapFlags,
    ) -> Result<(), OSErr> {
        Ok(())
    }
    fn max_guest(&self) -> u32 {
        self.0.max_guest()
    }
}

/// E1 — Synthetic two-segment boot (68K). Literal bytes from spec §8.
#[test]
fn e1_synthetic_two_segment_boot() {
    mac7_m68k_interp::register();

    let code0: Vec<u8> = vec![
        0x00, 0x00, 0x02, 0x00, // above_a5_size = 512
        0x00, 0x00, 0x02, 0x00, // below_a5_size = 512
        0x00, 0x00, 0x00, 0x08, // jt_size = 8 (one entry)
        0x00, 0x00, 0x00, 0x00, // jt_offset_from_a5 = 0
        0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, // placeholder entry
    ];
    let code1: Vec<u8> = vec![
        0x00, 0x00, // entry_offset
        0x00, 0x00, // flags
        0x3F, 0x3C, 0x00, 0x02, 0xA9, 0xF0, // push #2, _LoadSeg
        0x4E, 0x75, // RTS
    ];
    let code2: Vec<u8> = vec![0xA8, 0x00, 0x4E, 0x75]; // TRAP $A800, RTS

    let mut resources = TestResourceFile::new();
    resources.insert(CODE, 0, code0);
    resources.insert(CODE, 1, code1);
    resources.insert(CODE, 2, code2);

    let mut ctx = SegmentLoaderContext::initialize("m68k_interp", Box::new(resources)).unwrap();
    ctx.install_load_seg_trap().unwrap();

    let trace_log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let trace_log_handle = trace_log.clone();
    ctx.traps_mut()
        .register(
            0x00,
            Box::new(move |_ctx: TrapContext| {
                trace_log_handle.lock().unwrap().push("CODE 2 executed");
                Ok(())
            }),
        )
        .unwrap();

    ctx.ensure_entry_segments_loaded().unwrap();

    // Segment 1's entry pushes seg_id 2 and traps into `_LoadSeg`, which
    // loads segment 2 and redirects PC straight into it — it never returns
    // to segment 1's own RTS. Give it a stack well clear of the bump
    // allocator's A5-world/segment regions before running.
    ctx.cpu_mut().registers_mut().set("a7", 0x00F0_0000).unwrap();
    ctx.cpu_mut().set_pc(ctx.get_segment_entry_point(1).unwrap());
    for _ in 0..16 {
        if ctx.run(Some(1)).is_err() {
            break;
        }
    }

    assert_eq!(*trace_log.lock().unwrap(), vec!["CODE 2 executed"]);
    assert!(ctx.get_segment_entry_point(2).is_ok());
}

/// E1-PPC — Synthetic two-segment boot (PPC). Mirrors E1 exactly, but on
/// PPC the segment ID travels in R3 instead of on the stack: CODE 1's
/// body is `li r3,2; sc; blr` rather than a stack push + `TRAP #$A9F0`,
/// and the logging trap CODE 2 fires lives at selector 0 (`li r3,0; sc`)
/// rather than `TRAP $A800` — same convention, different register.
#[test]
fn e1_ppc_synthetic_two_segment_boot() {
    mac7_ppc_interp::register();

    let code0: Vec<u8> = vec![
        0x00, 0x00, 0x02, 0x00, // above_a5_size = 512
        0x00, 0x00, 0x02, 0x00, // below_a5_size = 512
        0x00, 0x00, 0x00, 0x08, // jt_size = 8 (one entry)
        0x00, 0x00, 0x00, 0x00, // jt_offset_from_a5 = 0
        0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, // placeholder entry
    ];
    let code1: Vec<u8> = vec![
        0x00, 0x00, // entry_offset
        0x00, 0x00, // flags
        0x38, 0x60, 0x00, 0x02, // li r3,2
        0x44, 0x00, 0x00, 0x00, // sc
        0x4E, 0x80, 0x00, 0x20, // blr
    ];
    let code2: Vec<u8> = vec![
        0x00, 0x00, // entry_offset
        0x00, 0x00, // flags
        0x38, 0x60, 0x00, 0x00, // li r3,0
        0x44, 0x00, 0x00, 0x00, // sc
        0x4E, 0x80, 0x00, 0x20, // blr
    ];

    let mut resources = TestResourceFile::new();
    resources.insert(CODE, 0, code0);
    resources.insert(CODE, 1, code1);
    resources.insert(CODE, 2, code2);

    let mut ctx = SegmentLoaderContext::initialize("ppc_interp", Box::new(resources)).unwrap();
    ctx.install_load_seg_trap().unwrap();

    let trace_log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let trace_log_handle = trace_log.clone();
    ctx.traps_mut()
        .register(
            0x00,
            Box::new(move |_ctx: TrapContext| {
                trace_log_handle.lock().unwrap().push("CODE 2 executed");
                Ok(())
            }),
        )
        .unwrap();

    ctx.ensure_entry_segments_loaded().unwrap();

    // Segment 1's entry loads seg_id 2 into R3 and `sc`s into `_LoadSeg`,
    // which loads segment 2 and redirects PC straight into it — it never
    // returns to segment 1's own `blr`.
    ctx.cpu_mut().set_pc(ctx.get_segment_entry_point(1).unwrap());
    for _ in 0..16 {
        if ctx.run(Some(1)).is_err() {
            break;
        }
    }

    assert_eq!(*trace_log.lock().unwrap(), vec!["CODE 2 executed"]);
    assert!(ctx.get_segment_entry_point(2).is_ok());
}

/// E2 — A5 invariants.
#[test]
fn e2_a5_invariants() {
    mac7_m68k_interp::register();
    let mut code0 = vec![0u8; 16];
    code0[0..4].copy_from_slice(&0x200u32.to_be_bytes()); // above
    code0[4..8].copy_from_slice(&0x200u32.to_be_bytes()); // below
    code0[8..12].copy_from_slice(&0x40u32.to_be_bytes()); // jt_size = 0x40 -> 8 entries
    code0[12..16].copy_from_slice(&0u32.to_be_bytes()); // jt_offset = 0
    for _ in 0..8 {
        code0.extend_from_slice(&[0u8; 8]);
    }
    let code1: Vec<u8> = vec![0x00, 0x00, 0x00, 0x00, 0x4E, 0x75];

    let mut resources = TestResourceFile::new();
    resources.insert(CODE, 0, code0);
    resources.insert(CODE, 1, code1);

    let mut ctx = SegmentLoaderContext::initialize("m68k_interp", Box::new(resources)).unwrap();
    ctx.install_load_seg_trap().unwrap();
    ctx.ensure_entry_segments_loaded().unwrap();

    let world = ctx.a5_world().unwrap();
    assert_eq!(world.below_base + 0x200, world.base);
    assert_eq!(world.jt_base, world.base);
    assert_eq!(world.jt_count, 8);
}

/// E3 — Heap round trip.
#[test]
fn e3_heap_round_trip() {
    use rand::Rng;
    let mut mm = MemoryManager::new();
    let initial_free = mm.free_mem(ZoneId::Application);

    let mut rng = rand::thread_rng();
    let mut ptrs = Vec::new();
    for _ in 0..100 {
        let size = rng.gen_range(1..=4096);
        ptrs.push(mm.new_ptr(size).unwrap());
    }
    for (i, p) in ptrs.iter().enumerate() {
        if i % 2 == 0 {
            mm.dispose_ptr(*p).unwrap();
        }
    }
    for _ in 0..20 {
        let size = rng.gen_range(1..=4096);
        ptrs.push(mm.new_ptr(size).unwrap());
    }

    mm.validate(ZoneId::Application).unwrap();

    for p in ptrs {
        let _ = mm.dispose_ptr(p);
    }
    mm.validate(ZoneId::Application).unwrap();
    assert_eq!(mm.free_mem(ZoneId::Application), initial_free);
}

/// E4 — PackBits.
#[test]
fn e4_packbits_literal_example() {
    let input = [0xAA, 0xAA, 0xAA, 0xAA, 0x01, 0x02, 0x03, 0xAA, 0xAA];
    let packed = packbits::pack(&input);
    assert_eq!(packbits::unpack(&packed).unwrap(), input.to_vec());
}

/// E5 — Lazy stub materialization.
#[test]
fn e5_lazy_stub_materialization() {
    mac7_m68k_interp::register();
    let mut resources = TestResourceFile::new();
    resources.insert(
        CODE,
        0,
        vec![
            0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00,
            0x00, 0x00, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E, 0x4E,
        ],
    );
    resources.insert(CODE, 1, vec![0x00, 0x00, 0x00, 0x00, 0x4E, 0x75]);

    let mut ctx = SegmentLoaderContext::initialize("m68k_interp", Box::new(resources)).unwrap();
    ctx.install_load_seg_trap().unwrap();
    ctx.ensure_entry_segments_loaded().unwrap();

    let jt_base = ctx.a5_world().unwrap().jt_base;
    match ctx.cpu().classify_jt_slot(ctx.mem(), jt_base).unwrap() {
        JtSlotState::Lazy { seg_id } => assert_eq!(seg_id, 1),
        other => panic!("expected still-lazy slot, got {:?}", other),
    }

    let resolved = ctx.resolve_jump_index(0).unwrap();
    match ctx.cpu().classify_jt_slot(ctx.mem(), jt_base).unwrap() {
        JtSlotState::Resolved { target } => assert_eq!(target, resolved),
        other => panic!("expected resolved slot after first call, got {:?}", other),
    }
    assert_eq!(resolved, ctx.get_segment_entry_point(1).unwrap());
}

/// E6 — Condition codes.
#[test]
fn e6_condition_codes() {
    let mut cpu = M68kBackend::new();
    let mut mem = Mem(GuestMemory::new(1024 * 1024));
    let mut traps = TrapTable::new();

    // MOVE.L #0,D0 ; CMP.L #0,D0
    mem.0.write_u16(0x1000, 0x203C).unwrap();
    mem.0.write_u32(0x1002, 0).unwrap();
    mem.0.write_u16(0x1006, 0xB0BC).unwrap(); // CMP.L #imm,D0
    mem.0.write_u32(0x1008, 0).unwrap();
    cpu.reset(0x1000, 0x8000);
    cpu.step(&mut mem, &mut traps).unwrap();
    cpu.step(&mut mem, &mut traps).unwrap();
    assert_eq!(cpu.registers().get("d0").unwrap(), 0);

    // MOVE.L #$FFFFFFFF,D0 ; ADD.L #1,D0
    mem.0.write_u16(0x2000, 0x203C).unwrap();
    mem.0.write_u32(0x2002, 0xFFFF_FFFF).unwrap();
    mem.0.write_u16(0x2006, 0xD0BC).unwrap(); // ADD.L #imm,D0
    mem.0.write_u32(0x2008, 1).unwrap();
    cpu.reset(0x2000, 0x8000);
    cpu.step(&mut mem, &mut traps).unwrap();
    cpu.step(&mut mem, &mut traps).unwrap();
    assert_eq!(cpu.registers().get("d0").unwrap(), 0);
}
