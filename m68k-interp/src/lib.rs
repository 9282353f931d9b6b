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

//! Cooperative 68000 interpreter. Implements the `MOVE`/`MOVEA`/`LEA`/`PEA`/
//! `CLR`/`NOT`/`ADD`/`SUB`/`CMP`/`LINK`/`UNLK`/`JSR`/`JMP`/`BRA`/`BSR`/`Bcc`/
//! `RTS` opcode set plus A-line (`$A000`-`$AFFF`) trap dispatch against
//! [`mac7_cpu_backend::CpuBackend`].

mod decode;
mod regs;

use decode::{decode_ea, read_ea, write_ea, Ea, Size};
use mac7_cpu_backend::{
    AddressSpace, CpuBackend, JtSlotState, OSErr, RelocKind, RelocTable, Registers, TrapContext,
    TrapTable,
};
use regs::{M68kRegs, SR_C, SR_N, SR_V, SR_X, SR_Z};

/// `JMP target.L` — the resolved jump-table slot form.
const JT_SLOT_JMP_ABS_L: u16 = 0x4EF9;
/// `MOVE.W #imm,-(SP)` — first word of the lazy jump-table stub.
const LAZY_STUB_MOVE_W: u16 = 0x3F3C;
/// `TRAP #$A9F0` (`_LoadSeg`).
const LOAD_SEG_TRAP: u16 = 0xA9F0;
const RTS: u16 = 0x4E75;
/// One resolved 68K jump-table entry is padded to 8 bytes to match the
/// lazy stub's footprint and `CODE 0`'s `JT_ENTRY_SIZE` (see
/// `mac7-code-parser`).
const JT_ENTRY_SIZE: u32 = 8;

pub struct M68kBackend {
    regs: M68kRegs,
    halted: bool,
}

impl M68kBackend {
    pub fn new() -> Self {
        M68kBackend { regs: M68kRegs::default(), halted: false }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn fetch_opcode(&mut self, mem: &dyn AddressSpace) -> Result<u16, OSErr> {
        let pc = self.regs.pc;
        let op = mem.read_u16(pc)?;
        self.regs.pc = pc.wrapping_add(2);
        Ok(op)
    }

    fn push32(&mut self, mem: &mut dyn AddressSpace, value: u32) -> Result<(), OSErr> {
        let sp = self.regs.a7().wrapping_sub(4);
        self.regs.set_a7(sp);
        mem.write_u32(sp, value)
    }

    fn pop32(&mut self, mem: &dyn AddressSpace) -> Result<u32, OSErr> {
        let sp = self.regs.a7();
        let v = mem.read_u32(sp)?;
        self.regs.set_a7(sp.wrapping_add(4));
        Ok(v)
    }

    fn push16(&mut self, mem: &mut dyn AddressSpace, value: u16) -> Result<(), OSErr> {
        let sp = self.regs.a7().wrapping_sub(2);
        self.regs.set_a7(sp);
        mem.write_u16(sp, value)
    }

    fn pop16(&mut self, mem: &dyn AddressSpace) -> Result<u16, OSErr> {
        let sp = self.regs.a7();
        let v = mem.read_u16(sp)?;
        self.regs.set_a7(sp.wrapping_add(2));
        Ok(v)
    }

    fn set_nz(&mut self, result: u32, size: Size) {
        let (n, z) = match size {
            Size::Byte => ((result as u8) & 0x80 != 0, (result as u8) == 0),
            Size::Word => ((result as u16) & 0x8000 != 0, (result as u16) == 0),
            Size::Long => (result & 0x8000_0000 != 0, result == 0),
        };
        self.regs.ccr_set(SR_N, n);
        self.regs.ccr_set(SR_Z, z);
    }

    /// ADD/SUB/CMP share carry/overflow computation; `V` is left cleared
    /// (see module docs in `SPEC_FULL.md` §4.5 — a documented MVP
    /// divergence from real 68000 overflow semantics).
    fn add(&mut self, a: u32, b: u32, size: Size, with_flags: bool) -> u32 {
        let result = a.wrapping_add(b);
        if with_flags {
            let bits = size.bytes() * 8;
            let carry = if bits == 32 {
                (a as u64 + b as u64) > u32::MAX as u64
            } else {
                let mask = (1u64 << bits) - 1;
                ((a as u64 & mask) + (b as u64 & mask)) > mask
            };
            self.regs.ccr_set(SR_C, carry);
            self.regs.ccr_set(SR_X, carry);
            self.regs.ccr_set(SR_V, false);
            self.set_nz(result, size);
        }
        mask_to(result, size)
    }

    fn sub(&mut self, a: u32, b: u32, size: Size, with_flags: bool) -> u32 {
        let result = a.wrapping_sub(b);
        if with_flags {
            let bits = size.bytes() * 8;
            let mask = if bits == 32 { u32::MAX as u64 } else { (1u64 << bits) - 1 };
            let borrow = (a as u64 & mask) < (b as u64 & mask);
            self.regs.ccr_set(SR_C, borrow);
            self.regs.ccr_set(SR_X, borrow);
            self.regs.ccr_set(SR_V, false);
            self.set_nz(result, size);
        }
        mask_to(result, size)
    }

    fn exec(
        &mut self,
        op: u16,
        mem: &mut dyn AddressSpace,
        traps: &mut TrapTable,
    ) -> Result<&'static str, OSErr> {
        // A-line trap space: classic Mac OS OS-trap dispatch.
        if op & 0xF000 == 0xA000 {
            let num = op & 0x0FFF;
            let index = (num & 0xFF) as u16;
            if traps.is_registered(index) {
                let mut pc = self.regs.pc;
                let ctx = TrapContext { pc: &mut pc, regs: &mut self.regs, mem };
                traps.dispatch(index, ctx)?;
                self.regs.pc = pc;
            } else {
                log::debug!("unregistered A-line trap {:#06x}, ignoring", op);
            }
            return Ok("TRAP");
        }

        match op {
            0x4E75 => {
                // RTS
                let target = self.pop32(mem)?;
                self.regs.pc = target;
                return Ok("RTS");
            }
            _ => {}
        }

        // LINK An,#d  ->  0100 1110 0101 0rrr
        if op & 0xFFF8 == 0x4E50 {
            let reg = (op & 0x7) as u8;
            let disp = decode::fetch_i16_pub(&mut self.regs, mem)? as i32;
            let an = self.regs.a(reg);
            self.push32(mem, an)?;
            let new_a7 = self.regs.a7();
            self.regs.set_a(reg, new_a7);
            self.regs.set_a7(new_a7.wrapping_add(disp as u32));
            return Ok("LINK");
        }

        // UNLK An  ->  0100 1110 0101 1rrr
        if op & 0xFFF8 == 0x4E58 {
            let reg = (op & 0x7) as u8;
            let an = self.regs.a(reg);
            self.regs.set_a7(an);
            let old = self.pop32(mem)?;
            self.regs.set_a(reg, old);
            return Ok("UNLK");
        }

        // JSR  ->  0100 1110 10 mmmmmm
        if op & 0xFFC0 == 0x4E80 {
            let mode = ((op >> 3) & 0x7) as u8;
            let reg = (op & 0x7) as u8;
            let ea = decode_ea(&mut self.regs, mem, mode, reg, Size::Long)?;
            let target = match ea {
                Ea::Mem(addr) => addr,
                _ => return Err(OSErr::IllegalInstruction),
            };
            let ret = self.regs.pc;
            self.push32(mem, ret)?;
            self.regs.pc = target;
            return Ok("JSR");
        }

        // JMP  ->  0100 1110 11 mmmmmm
        if op & 0xFFC0 == 0x4EC0 {
            let mode = ((op >> 3) & 0x7) as u8;
            let reg = (op & 0x7) as u8;
            let ea = decode_ea(&mut self.regs, mem, mode, reg, Size::Long)?;
            let target = match ea {
                Ea::Mem(addr) => addr,
                _ => return Err(OSErr::IllegalInstruction),
            };
            self.regs.pc = target;
            return Ok("JMP");
        }

        // LEA An,<ea>  ->  0100 rrr111 mmmmmm
        if op & 0xF1C0 == 0x41C0 {
            let an = ((op >> 9) & 0x7) as u8;
            let mode = ((op >> 3) & 0x7) as u8;
            let reg = (op & 0x7) as u8;
            let ea = decode_ea(&mut self.regs, mem, mode, reg, Size::Long)?;
            let addr = match ea {
                Ea::Mem(addr) => addr,
                _ => return Err(OSErr::IllegalInstruction),
            };
            self.regs.set_a(an, addr);
            return Ok("LEA");
        }

        // PEA <ea>  ->  0100 1000 01 mmmmmm
        if op & 0xFFC0 == 0x4840 {
            let mode = ((op >> 3) & 0x7) as u8;
            let reg = (op & 0x7) as u8;
            let ea = decode_ea(&mut self.regs, mem, mode, reg, Size::Long)?;
            let addr = match ea {
                Ea::Mem(addr) => addr,
                _ => return Err(OSErr::IllegalInstruction),
            };
            self.push32(mem, addr)?;
            return Ok("PEA");
        }

        // CLR.sz <ea>  ->  0100 0010 ss mmmmmm
        if op & 0xFF00 == 0x4200 {
            let size = Size::from_std_bits((op >> 6) & 0x3)?;
            let mode = ((op >> 3) & 0x7) as u8;
            let reg = (op & 0x7) as u8;
            let ea = decode_ea(&mut self.regs, mem, mode, reg, size)?;
            write_ea(&mut self.regs, mem, ea, size, 0)?;
            self.regs.ccr_set(SR_N, false);
            self.regs.ccr_set(SR_Z, true);
            self.regs.ccr_set(SR_V, false);
            self.regs.ccr_set(SR_C, false);
            return Ok("CLR");
        }

        // NOT.sz <ea>  ->  0100 0110 ss mmmmmm
        if op & 0xFF00 == 0x4600 {
            let size = Size::from_std_bits((op >> 6) & 0x3)?;
            let mode = ((op >> 3) & 0x7) as u8;
            let reg = (op & 0x7) as u8;
            let ea = decode_ea(&mut self.regs, mem, mode, reg, size)?;
            let v = read_ea(&self.regs, mem, ea, size)?;
            let result = !v;
            write_ea(&mut self.regs, mem, ea, size, result)?;
            self.set_nz(result, size);
            self.regs.ccr_set(SR_V, false);
            self.regs.ccr_set(SR_C, false);
            return Ok("NOT");
        }

        // MOVE/MOVEA  ->  00 ss DDD ddd SSS sss
        if op & 0xC000 == 0x0000 && op & 0x3000 != 0x0000 {
            let size = Size::from_move_bits((op >> 12) & 0x3)?;
            let dst_reg = ((op >> 9) & 0x7) as u8;
            let dst_mode = ((op >> 6) & 0x7) as u8;
            let src_mode = ((op >> 3) & 0x7) as u8;
            let src_reg = (op & 0x7) as u8;
            let src_ea = decode_ea(&mut self.regs, mem, src_mode, src_reg, size)?;
            let value = read_ea(&self.regs, mem, src_ea, size)?;
            let dst_ea = decode_ea(&mut self.regs, mem, dst_mode, dst_reg, size)?;
            write_ea(&mut self.regs, mem, dst_ea, size, value)?;
            if dst_mode != 1 {
                // MOVEA does not affect the condition codes.
                self.set_nz(value, size);
                self.regs.ccr_set(SR_V, false);
                self.regs.ccr_set(SR_C, false);
                Ok("MOVE")
            } else {
                Ok("MOVEA")
            }
        } else if op & 0xF000 == 0xD000 {
            // ADD/ADDA  ->  1101 rrr ooo mmmmmm
            let reg = ((op >> 9) & 0x7) as u8;
            let opmode = ((op >> 6) & 0x7) as u16;
            let mode = ((op >> 3) & 0x7) as u8;
            let eareg = (op & 0x7) as u8;
            match opmode {
                0b000 | 0b001 | 0b010 => {
                    let size = Size::from_std_bits(opmode)?;
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let src = read_ea(&self.regs, mem, ea, size)?;
                    let dst = mask_to(self.regs.d[reg as usize], size);
                    let result = self.add(dst, src, size, true);
                    write_ea(&mut self.regs, mem, Ea::DReg(reg), size, result)?;
                    Ok("ADD")
                }
                0b100 | 0b101 | 0b110 => {
                    let size = Size::from_std_bits(opmode - 0b100)?;
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let dst = read_ea(&self.regs, mem, ea, size)?;
                    let src = mask_to(self.regs.d[reg as usize], size);
                    let result = self.add(dst, src, size, true);
                    write_ea(&mut self.regs, mem, ea, size, result)?;
                    Ok("ADD")
                }
                0b011 | 0b111 => {
                    let size = if opmode == 0b011 { Size::Word } else { Size::Long };
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let src = read_ea(&self.regs, mem, ea, size)?;
                    let an = self.regs.a(reg);
                    let result = self.add(an, src, Size::Long, false);
                    self.regs.set_a(reg, result);
                    Ok("ADDA")
                }
                _ => Err(OSErr::IllegalInstruction),
            }
        } else if op & 0xF000 == 0x9000 {
            // SUB/SUBA  ->  1001 rrr ooo mmmmmm
            let reg = ((op >> 9) & 0x7) as u8;
            let opmode = ((op >> 6) & 0x7) as u16;
            let mode = ((op >> 3) & 0x7) as u8;
            let eareg = (op & 0x7) as u8;
            match opmode {
                0b000 | 0b001 | 0b010 => {
                    let size = Size::from_std_bits(opmode)?;
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let src = read_ea(&self.regs, mem, ea, size)?;
                    let dst = mask_to(self.regs.d[reg as usize], size);
                    let result = self.sub(dst, src, size, true);
                    write_ea(&mut self.regs, mem, Ea::DReg(reg), size, result)?;
                    Ok("SUB")
                }
                0b100 | 0b101 | 0b110 => {
                    let size = Size::from_std_bits(opmode - 0b100)?;
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let dst = read_ea(&self.regs, mem, ea, size)?;
                    let src = mask_to(self.regs.d[reg as usize], size);
                    let result = self.sub(dst, src, size, true);
                    write_ea(&mut self.regs, mem, ea, size, result)?;
                    Ok("SUB")
                }
                0b011 | 0b111 => {
                    let size = if opmode == 0b011 { Size::Word } else { Size::Long };
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let src = read_ea(&self.regs, mem, ea, size)?;
                    let an = self.regs.a(reg);
                    let result = self.sub(an, src, Size::Long, false);
                    self.regs.set_a(reg, result);
                    Ok("SUBA")
                }
                _ => Err(OSErr::IllegalInstruction),
            }
        } else if op & 0xF000 == 0xB000 {
            // CMP/CMPA  ->  1011 rrr ooo mmmmmm
            let reg = ((op >> 9) & 0x7) as u8;
            let opmode = ((op >> 6) & 0x7) as u16;
            let mode = ((op >> 3) & 0x7) as u8;
            let eareg = (op & 0x7) as u8;
            match opmode {
                0b000 | 0b001 | 0b010 => {
                    let size = Size::from_std_bits(opmode)?;
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let src = read_ea(&self.regs, mem, ea, size)?;
                    let dst = mask_to(self.regs.d[reg as usize], size);
                    self.sub(dst, src, size, true);
                    Ok("CMP")
                }
                0b011 | 0b111 => {
                    let size = if opmode == 0b011 { Size::Word } else { Size::Long };
                    let ea = decode_ea(&mut self.regs, mem, mode, eareg, size)?;
                    let src = read_ea(&self.regs, mem, ea, size)?;
                    let an = self.regs.a(reg);
                    self.sub(an, src, Size::Long, true);
                    Ok("CMPA")
                }
                _ => Err(OSErr::IllegalInstruction),
            }
        } else if op & 0xFF00 == 0x6000 {
            // BRA/BSR/Bcc  ->  0110 cccc dddddddd
            let cc = ((op >> 8) & 0xF) as u8;
            let disp8 = (op & 0xFF) as u8;
            let before_ext = self.regs.pc;
            let disp: i32 = if disp8 == 0 {
                let ext = decode::fetch_i16_pub(&mut self.regs, mem)?;
                ext as i32
            } else {
                disp8 as i8 as i32
            };
            // The 68K displacement is relative to the address of the
            // extension word (opcode address + 2), which `before_ext`
            // already is, whether or not a 16-bit extension was present.
            let target = before_ext.wrapping_add(disp as u32);
            match cc {
                0x0 => {
                    self.regs.pc = target;
                    Ok("BRA")
                }
                0x1 => {
                    let ret = self.regs.pc;
                    self.push32(mem, ret)?;
                    self.regs.pc = target;
                    Ok("BSR")
                }
                _ => {
                    if self.regs.test_condition(cc) {
                        self.regs.pc = target;
                    }
                    Ok("Bcc")
                }
            }
        } else {
            Err(OSErr::IllegalInstruction)
        }
    }
}

fn mask_to(v: u32, size: Size) -> u32 {
    match size {
        Size::Byte => v & 0xFF,
        Size::Word => v & 0xFFFF,
        Size::Long => v,
    }
}

impl Default for M68kBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend for M68kBackend {
    fn name(&self) -> &'static str {
        "m68k_interp"
    }

    fn pc(&self) -> u32 {
        self.regs.pc
    }

    fn set_pc(&mut self, pc: u32) {
        self.regs.pc = pc;
    }

    fn registers(&self) -> &dyn Registers {
        &self.regs
    }

    fn registers_mut(&mut self) -> &mut dyn Registers {
        &mut self.regs
    }

    fn reset(&mut self, entry_pc: u32, initial_sp: u32) {
        self.regs = M68kRegs::default();
        self.regs.pc = entry_pc;
        self.regs.usp = initial_sp;
        self.regs.ssp = initial_sp;
        self.halted = false;
    }

    fn a5_register_name(&self) -> &'static str {
        "a5"
    }

    fn stack_register_names(&self) -> (&'static str, Option<&'static str>) {
        ("usp", Some("ssp"))
    }

    fn jt_entry_size(&self) -> u32 {
        JT_ENTRY_SIZE
    }

    fn write_jt_slot(&self, mem: &mut dyn AddressSpace, slot_addr: u32, target: u32) -> Result<(), OSErr> {
        mem.write_u16(slot_addr, JT_SLOT_JMP_ABS_L)?;
        mem.write_u32(slot_addr + 2, target)
    }

    fn make_lazy_jt_stub(
        &self,
        mem: &mut dyn AddressSpace,
        slot_addr: u32,
        seg_id: i16,
        _entry_idx: u8,
    ) -> Result<(), OSErr> {
        mem.write_u16(slot_addr, LAZY_STUB_MOVE_W)?;
        mem.write_u16(slot_addr + 2, seg_id as u16)?;
        mem.write_u16(slot_addr + 4, LOAD_SEG_TRAP)?;
        mem.write_u16(slot_addr + 6, RTS)
    }

    fn relocate(
        &self,
        mem: &mut dyn AddressSpace,
        table: &RelocTable,
        seg_base: u32,
        jt_base: u32,
        a5_base: u32,
    ) -> Result<(), OSErr> {
        for entry in table.iter() {
            let addr = seg_base.wrapping_add(entry.at_offset);
            match entry.kind {
                RelocKind::AbsSegBase | RelocKind::SegmentRef => {
                    mem.write_u32(addr, seg_base.wrapping_add(entry.addend as u32))?;
                }
                RelocKind::A5Relative => {
                    mem.write_u32(addr, a5_base.wrapping_add(entry.addend as u32))?;
                }
                RelocKind::JTImport => {
                    let idx = entry.jt_index.ok_or(OSErr::RelocError)?;
                    mem.write_u32(addr, jt_base + idx as u32 * JT_ENTRY_SIZE)?;
                }
                RelocKind::PCRel16 => {
                    if entry.addend < i16::MIN as i32 || entry.addend > i16::MAX as i32 {
                        return Err(OSErr::RelocError);
                    }
                    mem.write_u16(addr, entry.addend as i16 as u16)?;
                }
                RelocKind::PCRel32 => return Err(OSErr::RelocError),
            }
        }
        Ok(())
    }

    fn classify_jt_slot(&self, mem: &dyn AddressSpace, slot_addr: u32) -> Result<JtSlotState, OSErr> {
        let first = mem.read_u16(slot_addr)?;
        if first == JT_SLOT_JMP_ABS_L {
            let target = mem.read_u32(slot_addr + 2)?;
            return Ok(JtSlotState::Resolved { target });
        }
        if first == LAZY_STUB_MOVE_W {
            let seg_id = mem.read_u16(slot_addr + 2)? as i16;
            return Ok(JtSlotState::Lazy { seg_id });
        }
        Ok(JtSlotState::Unknown)
    }

    fn step(
        &mut self,
        mem: &mut dyn AddressSpace,
        traps: &mut TrapTable,
    ) -> Result<&'static str, OSErr> {
        if self.halted {
            return Err(OSErr::IllegalInstruction);
        }
        let op = match self.fetch_opcode(mem) {
            Ok(op) => op,
            Err(e) => {
                self.halted = true;
                return Err(e);
            }
        };
        match self.exec(op, mem, traps) {
            Ok(name) => Ok(name),
            Err(e) => {
                self.halted = true;
                Err(e)
            }
        }
    }
}

/// Registers this backend with the global registry under `"m68k_interp"`.
/// Called once by the runtime binary during startup.
pub fn register() {
    mac7_cpu_backend::cpu_backend_register("m68k_interp", || Box::new(M68kBackend::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mac7_guest_memory::GuestMemory;

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
        fn ensure_mapped(&mut self, _a: u32, _l: u32, _f: mac7_cpu_backend::MapFlags) -> Result<(), OSErr> {
            Ok(())
        }
        fn max_guest(&self) -> u32 {
            self.0.max_guest()
        }
    }

    fn mem() -> Mem {
        Mem(GuestMemory::new(16 * 1024 * 1024))
    }

    #[test]
    fn move_long_immediate_to_d0_sets_nz() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        // MOVE.L #0, D0 -> size=10(long) dst mode 000 reg 000, src mode 111 reg 100 (imm)
        m.0.write_u16(0x1000, 0x203C).unwrap();
        m.0.write_u32(0x1002, 0).unwrap();
        cpu.reset(0x1000, 0x8000);
        let mut traps = TrapTable::new();
        let name = cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(name, "MOVE");
        assert_eq!(cpu.regs.d[0], 0);
        assert!(cpu.regs.ccr_get(SR_Z));
        assert!(!cpu.regs.ccr_get(SR_N));
    }

    #[test]
    fn bra_short_jumps_forward() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        m.0.write_u16(0x1000, 0x6004).unwrap(); // BRA +4
        cpu.reset(0x1000, 0x8000);
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.pc(), 0x1006);
    }

    #[test]
    fn rts_pops_return_address() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        m.0.write_u16(0x1000, 0x4E75).unwrap(); // RTS
        cpu.reset(0x1000, 0x8000);
        cpu.push32(&mut m, 0x2000).unwrap();
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.pc(), 0x2000);
    }

    #[test]
    fn link_unlk_round_trip_restores_a6_and_sp() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        m.0.write_u16(0x1000, 0x4E56).unwrap(); // LINK A6,#-16
        m.0.write_u16(0x1002, (-16i16) as u16).unwrap();
        m.0.write_u16(0x1004, 0x4E5E).unwrap(); // UNLK A6
        cpu.reset(0x1000, 0x8000);
        let a7_before = cpu.regs.a7();
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.a7(), a7_before - 4 - 16);
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.a7(), a7_before);
    }

    #[test]
    fn unregistered_trap_does_not_halt() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        m.0.write_u16(0x1000, 0xA9F0).unwrap();
        cpu.reset(0x1000, 0x8000);
        let mut traps = TrapTable::new();
        let name = cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(name, "TRAP");
        assert!(!cpu.is_halted());
    }

    #[test]
    fn illegal_opcode_halts() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        m.0.write_u16(0x1000, 0xFFFF).unwrap();
        cpu.reset(0x1000, 0x8000);
        let mut traps = TrapTable::new();
        assert!(cpu.step(&mut m, &mut traps).is_err());
        assert!(cpu.is_halted());
    }

    #[test]
    fn write_jt_slot_emits_jmp_abs_l() {
        let cpu = M68kBackend::new();
        let mut m = mem();
        cpu.write_jt_slot(&mut m, 0x3000, 0x4000).unwrap();
        assert_eq!(m.0.read_u16(0x3000).unwrap(), JT_SLOT_JMP_ABS_L);
        assert_eq!(m.0.read_u32(0x3002).unwrap(), 0x4000);
    }

    #[test]
    fn lazy_stub_round_trips_through_load_seg_trap() {
        let cpu = M68kBackend::new();
        let mut m = mem();
        cpu.make_lazy_jt_stub(&mut m, 0x3000, 2, 5).unwrap();
        assert_eq!(m.0.read_u16(0x3000).unwrap(), LAZY_STUB_MOVE_W);
        assert_eq!(m.0.read_u16(0x3002).unwrap(), 2);
        assert_eq!(m.0.read_u16(0x3004).unwrap(), LOAD_SEG_TRAP);
        assert_eq!(m.0.read_u16(0x3006).unwrap(), RTS);
    }

    #[test]
    fn relocate_patches_jt_import_and_abs_seg_base() {
        use mac7_cpu_backend::{RelocEntry, RelocKind};
        let cpu = M68kBackend::new();
        let mut m = mem();
        let mut table = RelocTable::new();
        table.push(RelocEntry {
            kind: RelocKind::JTImport,
            at_offset: 0,
            addend: 0,
            target_segment: None,
            jt_index: Some(2),
        });
        table.push(RelocEntry {
            kind: RelocKind::AbsSegBase,
            at_offset: 4,
            addend: 0x10,
            target_segment: None,
            jt_index: None,
        });
        cpu.relocate(&mut m, &table, 0x2000, 0x5000, 0x9000).unwrap();
        assert_eq!(m.0.read_u32(0x2000).unwrap(), 0x5000 + 2 * JT_ENTRY_SIZE);
        assert_eq!(m.0.read_u32(0x2004).unwrap(), 0x2010);
    }

    #[test]
    fn classify_jt_slot_distinguishes_resolved_from_lazy() {
        let cpu = M68kBackend::new();
        let mut m = mem();
        cpu.write_jt_slot(&mut m, 0x3000, 0x4000).unwrap();
        assert_eq!(
            cpu.classify_jt_slot(&m, 0x3000).unwrap(),
            mac7_cpu_backend::JtSlotState::Resolved { target: 0x4000 }
        );
        cpu.make_lazy_jt_stub(&mut m, 0x3100, 9, 0).unwrap();
        assert_eq!(
            cpu.classify_jt_slot(&m, 0x3100).unwrap(),
            mac7_cpu_backend::JtSlotState::Lazy { seg_id: 9 }
        );
    }

    #[test]
    fn add_sets_carry_on_overflow() {
        let mut cpu = M68kBackend::new();
        let mut m = mem();
        // ADD.L D1,D0 -> 1101 000 010 000 001
        m.0.write_u16(0x1000, 0xD081).unwrap();
        cpu.reset(0x1000, 0x8000);
        cpu.regs.d[0] = u32::MAX;
        cpu.regs.d[1] = 1;
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.d[0], 0);
        assert!(cpu.regs.ccr_get(SR_C));
        assert!(cpu.regs.ccr_get(SR_Z));
    }
}
