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

//! Cooperative PowerPC interpreter. Decodes the primary opcode space, the
//! opcode-19 (branch/CR) and opcode-31 (integer XO-form) extended spaces,
//! the opcode-59/63 FPU extended spaces, and the opcode-4 AltiVec extended
//! space, covering the integer/branch/trap/float/vector instruction set
//! needed to run segment-loader stubs and guest CODE resources. IEEE-754
//! bit-for-bit rounding fidelity is not attempted (ordinary `f32`/`f64`
//! arithmetic stands in for the real FPU's rounding modes); unrecognized
//! extended opcodes in either space still decode to `OSErr::IllegalInstruction`.

mod altivec;
mod decode;
mod regs;

use mac7_cpu_backend::{
    AddressSpace, CpuBackend, JtSlotState, OSErr, RelocKind, RelocTable, Registers, TrapContext,
    TrapTable,
};
use regs::PpcRegs;

const SPR_CTR: u16 = 9;
/// Resolved jump-table slot: `lis r11,hi16; ori r11,r11,lo16; mtctr r11; bctr`.
const JT_ENTRY_SIZE: u32 = 16;

fn encode_spr_field(spr: u16) -> u32 {
    let spr = spr as u32;
    ((spr & 0x1F) << 5) | (spr >> 5)
}

fn instr_addis(rd: u8, ra: u8, simm: i16) -> u32 {
    (15 << 26) | ((rd as u32) << 21) | ((ra as u32) << 16) | (simm as u16 as u32)
}

fn instr_ori(ra: u8, rs: u8, uimm: u16) -> u32 {
    (24 << 26) | ((rs as u32) << 21) | ((ra as u32) << 16) | uimm as u32
}

fn instr_mtspr(rs: u8, spr: u16) -> u32 {
    (31 << 26) | ((rs as u32) << 21) | (encode_spr_field(spr) << 11) | (467 << 1)
}

fn instr_bcctr_always() -> u32 {
    // BO=20 (0b10100): ignore CTR, ignore the CR condition — unconditional.
    (19 << 26) | (20 << 21) | (528 << 1)
}

fn instr_addi(rd: u8, ra: u8, simm: i16) -> u32 {
    (14 << 26) | ((rd as u32) << 21) | ((ra as u32) << 16) | (simm as u16 as u32)
}

fn instr_sc() -> u32 {
    17 << 26
}

fn instr_blr() -> u32 {
    // bclr with BO=20 (branch always, ignore CTR/condition), BI=0, LK=0.
    (19 << 26) | (20 << 21) | (16 << 1)
}

pub struct PpcBackend {
    regs: PpcRegs,
    halted: bool,
}

impl PpcBackend {
    pub fn new() -> Self {
        PpcBackend { regs: PpcRegs::default(), halted: false }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn fetch(&mut self, mem: &dyn AddressSpace) -> Result<u32, OSErr> {
        let pc = self.regs.pc;
        let instr = mem.read_u32(pc)?;
        self.regs.pc = pc.wrapping_add(4);
        Ok(instr)
    }

    fn test_branch(&mut self, instr: u32) -> bool {
        let bo = decode::bo(instr);
        let bi = decode::bi(instr);
        let bo0 = (bo >> 4) & 1 != 0;
        let bo1 = (bo >> 3) & 1 != 0;
        let bo2 = (bo >> 2) & 1 != 0;
        let bo3 = (bo >> 1) & 1 != 0;
        if !bo2 {
            self.regs.ctr = self.regs.ctr.wrapping_sub(1);
        }
        let ctr_ok = bo2 || ((self.regs.ctr != 0) != bo3);
        let cond_ok = bo0 || (self.regs.cr_bit(bi) == bo1);
        ctr_ok && cond_ok
    }

    fn exec(
        &mut self,
        instr: u32,
        mem: &mut dyn AddressSpace,
        traps: &mut TrapTable,
    ) -> Result<&'static str, OSErr> {
        let op = decode::opcode(instr);
        match op {
            14 => {
                // addi: RA=0 means "load immediate" (no base register).
                let ra = decode::ra(instr);
                let base = if ra == 0 { 0 } else { self.regs.gpr[ra as usize] };
                let result = base.wrapping_add(decode::simm(instr) as u32);
                self.regs.gpr[decode::rd(instr) as usize] = result;
                Ok("ADDI")
            }
            15 => {
                // addis: like addi but the immediate is shifted left 16.
                let ra = decode::ra(instr);
                let base = if ra == 0 { 0 } else { self.regs.gpr[ra as usize] };
                let result = base.wrapping_add((decode::simm(instr) as u32) << 16);
                self.regs.gpr[decode::rd(instr) as usize] = result;
                Ok("ADDIS")
            }
            32 => {
                // lwz
                let ra = decode::ra(instr);
                let base = if ra == 0 { 0 } else { self.regs.gpr[ra as usize] };
                let addr = base.wrapping_add(decode::simm(instr) as u32);
                let v = mem.read_u32(addr)?;
                self.regs.gpr[decode::rd(instr) as usize] = v;
                Ok("LWZ")
            }
            36 => {
                // stw
                let ra = decode::ra(instr);
                let base = if ra == 0 { 0 } else { self.regs.gpr[ra as usize] };
                let addr = base.wrapping_add(decode::simm(instr) as u32);
                let v = self.regs.gpr[decode::rd(instr) as usize];
                mem.write_u32(addr, v)?;
                Ok("STW")
            }
            18 => {
                // b / bl / ba / bla
                let before = self.regs.pc;
                let disp = decode::li(instr);
                let target = if decode::aa(instr) {
                    disp as u32
                } else {
                    before.wrapping_sub(4).wrapping_add(disp as u32)
                };
                if decode::lk(instr) {
                    self.regs.lr = before;
                }
                self.regs.pc = target;
                Ok("B")
            }
            16 => {
                // bc
                let before = self.regs.pc;
                let taken = self.test_branch(instr);
                if taken {
                    let disp = decode::bd(instr);
                    let target = if decode::aa(instr) {
                        disp as u32
                    } else {
                        before.wrapping_sub(4).wrapping_add(disp as u32)
                    };
                    if decode::lk(instr) {
                        self.regs.lr = before;
                    }
                    self.regs.pc = target;
                }
                Ok("BC")
            }
            17 => {
                // sc: R3 carries the trap selector.
                let selector = (self.regs.gpr[3] & 0xFF) as u16;
                if traps.is_registered(selector) {
                    let mut pc = self.regs.pc;
                    let ctx = TrapContext { pc: &mut pc, regs: &mut self.regs, mem };
                    traps.dispatch(selector, ctx)?;
                    self.regs.pc = pc;
                } else {
                    log::debug!("unregistered sc selector {:#x}, ignoring", selector);
                }
                Ok("SC")
            }
            19 => self.exec_op19(instr),
            31 => self.exec_op31(instr, mem),
            4 => self.exec_op4(instr),
            59 => self.exec_op59(instr),
            63 => self.exec_op63(instr),
            _ => Err(OSErr::IllegalInstruction),
        }
    }

    /// Single-precision FPU forms (A-form, dispatched on the 5-bit XO since
    /// bits 21-25 are the `FRC` register operand, not opcode bits).
    fn exec_op59(&mut self, instr: u32) -> Result<&'static str, OSErr> {
        let frd = decode::rd(instr) as usize;
        let fra = self.regs.fpr[decode::ra(instr) as usize];
        let frb = self.regs.fpr[decode::rb(instr) as usize];
        let frc = self.regs.fpr[decode::frc(instr) as usize];
        let rc = decode::rc(instr);
        let (name, result): (&'static str, f64) = match decode::xo5(instr) {
            21 => ("FADDS", (fra as f32 + frb as f32) as f64),
            20 => ("FSUBS", (fra as f32 - frb as f32) as f64),
            25 => ("FMULS", (fra as f32 * frc as f32) as f64),
            18 => ("FDIVS", (fra as f32 / frb as f32) as f64),
            22 => ("FSQRTS", (frb as f32).sqrt() as f64),
            24 => ("FRES", (1.0f32 / frb as f32) as f64),
            29 => ("FMADDS", ((fra as f32 * frc as f32) + frb as f32) as f64),
            28 => ("FMSUBS", ((fra as f32 * frc as f32) - frb as f32) as f64),
            31 => ("FNMADDS", (-((fra as f32 * frc as f32) + frb as f32)) as f64),
            30 => ("FNMSUBS", (-((fra as f32 * frc as f32) - frb as f32)) as f64),
            other => {
                log::debug!("unimplemented opcode 59 extended {:#x}", other);
                return Err(OSErr::IllegalInstruction);
            }
        };
        self.regs.fpr[frd] = result;
        if rc {
            self.update_fprf(result);
        }
        Ok(name)
    }

    /// Double-precision arithmetic (A-form, XO5) plus compare/round/sign/move
    /// (X-form, XO10) — opcode 63 covers both families.
    fn exec_op63(&mut self, instr: u32) -> Result<&'static str, OSErr> {
        let frd = decode::rd(instr) as usize;
        let fra = self.regs.fpr[decode::ra(instr) as usize];
        let frb = self.regs.fpr[decode::rb(instr) as usize];
        let frc = self.regs.fpr[decode::frc(instr) as usize];
        let rc = decode::rc(instr);

        let arith: Option<(&'static str, f64)> = match decode::xo5(instr) {
            21 => Some(("FADD", fra + frb)),
            20 => Some(("FSUB", fra - frb)),
            25 => Some(("FMUL", fra * frc)),
            18 => Some(("FDIV", fra / frb)),
            22 => Some(("FSQRT", frb.sqrt())),
            23 => Some(("FSEL", if fra >= 0.0 { frc } else { frb })),
            26 => Some(("FRSQRTE", 1.0 / frb.sqrt())),
            29 => Some(("FMADD", (fra * frc) + frb)),
            28 => Some(("FMSUB", (fra * frc) - frb)),
            31 => Some(("FNMADD", -((fra * frc) + frb))),
            30 => Some(("FNMSUB", -((fra * frc) - frb))),
            _ => None,
        };
        if let Some((name, result)) = arith {
            self.regs.fpr[frd] = result;
            if rc {
                self.update_fprf(result);
            }
            return Ok(name);
        }

        match decode::xo10(instr) {
            0 => {
                self.fcmp(fra, frb, instr);
                Ok("FCMPU")
            }
            32 => {
                self.fcmp(fra, frb, instr);
                Ok("FCMPO")
            }
            12 => {
                let result = frb as f32 as f64;
                self.regs.fpr[frd] = result;
                if rc {
                    self.update_fprf(result);
                }
                Ok("FRSP")
            }
            40 => {
                let result = -frb;
                self.regs.fpr[frd] = result;
                if rc {
                    self.update_fprf(result);
                }
                Ok("FNEG")
            }
            136 => {
                let result = -frb.abs();
                self.regs.fpr[frd] = result;
                if rc {
                    self.update_fprf(result);
                }
                Ok("FNABS")
            }
            264 => {
                let result = frb.abs();
                self.regs.fpr[frd] = result;
                if rc {
                    self.update_fprf(result);
                }
                Ok("FABS")
            }
            72 => {
                self.regs.fpr[frd] = frb;
                if rc {
                    self.update_fprf(frb);
                }
                Ok("FMR")
            }
            other => {
                log::debug!("unimplemented opcode 63 extended {:#x}", other);
                Err(OSErr::IllegalInstruction)
            }
        }
    }

    /// `fcmpu`/`fcmpo`: sets `crfD` (bits 23-25, `RD >> 2`) from an ordinary
    /// `<`/`>`/`==` comparison. Unordered (NaN) handling is not modeled.
    fn fcmp(&mut self, fra: f64, frb: f64, instr: u32) {
        let crfd = decode::rd(instr) >> 2;
        let field = if fra < frb {
            0b1000
        } else if fra > frb {
            0b0100
        } else {
            0b0010
        };
        self.regs.set_cr_field(crfd, field);
    }

    /// Mirrors `PPC_UpdateFPSCR`: clears FPRF then sets FL/FG/FE from the
    /// result's sign, called only for `Rc`-tagged instructions.
    fn update_fprf(&mut self, result: f64) {
        self.regs.fpscr &= !0xF000_0000;
        if result < 0.0 {
            self.regs.fpscr |= 0x8000_0000;
        } else if result > 0.0 {
            self.regs.fpscr |= 0x4000_0000;
        } else {
            self.regs.fpscr |= 0x2000_0000;
        }
    }

    /// AltiVec. `vperm`/`vsel` are true VA-form (6-bit XO at bits 26-31, `vC`
    /// at bits 21-25); every other supported op is VX-form, where the field
    /// AltiVec's own manual calls the "extended opcode" is the full 11 bits
    /// at bits 21-31 (`decode::vxo11`).
    fn exec_op4(&mut self, instr: u32) -> Result<&'static str, OSErr> {
        let vd = decode::rd(instr) as usize;
        let va = decode::ra(instr) as usize;
        let vb = decode::rb(instr) as usize;

        let xo6 = instr & 0x3F;
        if xo6 == 43 {
            let vc = self.regs.vr[decode::frc(instr) as usize];
            let (a, b) = (self.regs.vr[va], self.regs.vr[vb]);
            let mut out = [0u8; 16];
            for i in 0..16 {
                let sel = vc[i] & 0x1F;
                out[i] = if sel < 16 { a[sel as usize] } else { b[(sel - 16) as usize] };
            }
            self.regs.vr[vd] = out;
            return Ok("VPERM");
        }
        if xo6 == 42 {
            let vc = self.regs.vr[decode::frc(instr) as usize];
            let (a, b) = (self.regs.vr[va], self.regs.vr[vb]);
            let mut out = [0u8; 16];
            for i in 0..16 {
                out[i] = (a[i] & !vc[i]) | (b[i] & vc[i]);
            }
            self.regs.vr[vd] = out;
            return Ok("VSEL");
        }

        let (a, b) = (self.regs.vr[va], self.regs.vr[vb]);
        use altivec::*;
        let result: [u8; 16] = match decode::vxo11(instr) {
            0 => map_bytes(a, b, |x, y| x.wrapping_add(y)), // vaddubm
            64 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.wrapping_add(y))), // vadduhm
            128 => from_words(map_words(words(&a), words(&b), |x, y| x.wrapping_add(y))), // vadduwm
            1024 => map_bytes(a, b, |x, y| x.wrapping_sub(y)), // vsububm
            1088 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.wrapping_sub(y))), // vsubuhm
            1152 => from_words(map_words(words(&a), words(&b), |x, y| x.wrapping_sub(y))), // vsubuwm
            512 => map_bytes(a, b, |x, y| x.saturating_add(y)), // vaddubs
            768 => map_bytes(a, b, |x, y| ((x as i8).saturating_add(y as i8)) as u8), // vaddsbs
            576 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.saturating_add(y))), // vadduhs
            832 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| {
                ((x as i16).saturating_add(y as i16)) as u16
            })), // vaddshs
            1536 => map_bytes(a, b, |x, y| x.saturating_sub(y)), // vsububs
            1792 => map_bytes(a, b, |x, y| ((x as i8).saturating_sub(y as i8)) as u8), // vsubsbs
            1600 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.saturating_sub(y))), // vsubuhs
            1856 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| {
                ((x as i16).saturating_sub(y as i16)) as u16
            })), // vsubshs
            1028 => map_bytes(a, b, |x, y| x & y), // vand
            1092 => map_bytes(a, b, |x, y| x & !y), // vandc
            1156 => map_bytes(a, b, |x, y| x | y), // vor
            1220 => map_bytes(a, b, |x, y| x ^ y), // vxor
            1284 => map_bytes(a, b, |x, y| !(x | y)), // vnor
            6 => map_bytes(a, b, |x, y| if x == y { 0xFF } else { 0 }), // vcmpequb
            70 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| if x == y { 0xFFFF } else { 0 })), // vcmpequh
            134 => from_words(map_words(words(&a), words(&b), |x, y| if x == y { 0xFFFF_FFFF } else { 0 })), // vcmpequw
            518 => map_bytes(a, b, |x, y| if x > y { 0xFF } else { 0 }), // vcmpgtub
            774 => map_bytes(a, b, |x, y| if (x as i8) > (y as i8) { 0xFF } else { 0 }), // vcmpgtsb
            582 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| if x > y { 0xFFFF } else { 0 })), // vcmpgtuh
            838 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| {
                if (x as i16) > (y as i16) { 0xFFFF } else { 0 }
            })), // vcmpgtsh
            646 => from_words(map_words(words(&a), words(&b), |x, y| if x > y { 0xFFFF_FFFF } else { 0 })), // vcmpgtuw
            902 => from_words(map_words(words(&a), words(&b), |x, y| {
                if (x as i32) > (y as i32) { 0xFFFF_FFFF } else { 0 }
            })), // vcmpgtsw
            260 => map_bytes(a, b, |x, y| x.wrapping_shl((y & 7) as u32)), // vslb
            516 => map_bytes(a, b, |x, y| x.wrapping_shr((y & 7) as u32)), // vsrb
            772 => map_bytes(a, b, |x, y| ((x as i8) >> (y & 7)) as u8), // vsrab
            324 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.wrapping_shl((y & 15) as u32))), // vslh
            580 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.wrapping_shr((y & 15) as u32))), // vsrh
            388 => from_words(map_words(words(&a), words(&b), |x, y| x.wrapping_shl(y & 31))), // vslw
            644 => from_words(map_words(words(&a), words(&b), |x, y| x.wrapping_shr(y & 31))), // vsrw
            836 => from_words(map_words(words(&a), words(&b), |x, y| ((x as i32) >> (y & 31)) as u32)), // vsraw
            4 => map_bytes(a, b, |x, y| x.rotate_left((y & 7) as u32)), // vrlb
            68 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| x.rotate_left((y & 15) as u32))), // vrlh
            132 => from_words(map_words(words(&a), words(&b), |x, y| x.rotate_left(y & 31))), // vrlw
            258 => map_bytes(a, b, |x, y| ((x as i8).max(y as i8)) as u8), // vmaxsb
            2 => map_bytes(a, b, |x, y| x.max(y)), // vmaxub
            770 => map_bytes(a, b, |x, y| ((x as i8).min(y as i8)) as u8), // vminsb
            514 => map_bytes(a, b, |x, y| x.min(y)), // vminub
            322 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| ((x as i16).max(y as i16)) as u16)), // vmaxsh
            834 => from_halfwords(map_halfwords(halfwords(&a), halfwords(&b), |x, y| ((x as i16).min(y as i16)) as u16)), // vminsh
            1282 => map_bytes(a, b, |x, y| (((x as i16) + (y as i16) + 1) / 2) as u8), // vavgsb
            1026 => map_bytes(a, b, |x, y| (((x as u16) + (y as u16) + 1) / 2) as u8), // vavgub
            12 => merge_high_bytes(a, b), // vmrghb
            268 => merge_low_bytes(a, b), // vmrglb
            76 => merge_high_halfwords(a, b), // vmrghh
            332 => merge_low_halfwords(a, b), // vmrglh
            140 => merge_high_words(a, b), // vmrghw
            396 => merge_low_words(a, b), // vmrglw
            14 => pack_halfwords_modulo(a, b), // vpkuhum
            78 => pack_words_modulo(a, b), // vpkuwum
            142 => pack_halfwords_saturate(a, b), // vpkuhus
            206 => pack_words_saturate(a, b), // vpkuwus
            526 => unpack_high_signed_bytes(b), // vupkhsb
            590 => unpack_low_signed_bytes(b), // vupklsb
            654 => unpack_high_signed_halfwords(b), // vupkhsh
            718 => unpack_low_signed_halfwords(b), // vupklsh
            776 => from_halfwords(mul_even_signed_bytes(a, b)), // vmulesb
            264 => from_halfwords(mul_odd_signed_bytes(a, b)), // vmulosb
            520 => from_halfwords(mul_even_unsigned_bytes(a, b)), // vmuleub
            8 => from_halfwords(mul_odd_unsigned_bytes(a, b)), // vmuloub
            840 => from_words(mul_even_signed_halfwords(a, b)), // vmulesh
            328 => from_words(mul_odd_signed_halfwords(a, b)), // vmulosh
            584 => from_words(mul_even_unsigned_halfwords(a, b)), // vmuleuh
            72 => from_words(mul_odd_unsigned_halfwords(a, b)), // vmulouh
            524 => splat_byte(b, decode::ra(instr) as usize & 0xF), // vspltb (UIM in vA's bit field, source is vB)
            588 => splat_halfword(b, decode::ra(instr) as usize & 0x7), // vsplth
            652 => splat_word(b, decode::ra(instr) as usize & 0x3), // vspltw
            780 => splat_imm_byte(sign_extend5(decode::ra(instr))), // vspltisb
            844 => splat_imm_halfword(sign_extend5(decode::ra(instr))), // vspltish
            908 => splat_imm_word(sign_extend5(decode::ra(instr))), // vspltisw
            1544 => from_words(sum4_unsigned_bytes_saturate(a, b)), // vsum4ubs
            1800 => from_words(sum4_signed_bytes_saturate(a, b)), // vsum4sbs
            other => {
                log::debug!("unimplemented AltiVec opcode {:#x}", other);
                return Err(OSErr::IllegalInstruction);
            }
        };
        self.regs.vr[vd] = result;
        Ok("ALTIVEC")
    }

    fn exec_op19(&mut self, instr: u32) -> Result<&'static str, OSErr> {
        match decode::xo10(instr) {
            16 => {
                // bclr
                let before = self.regs.pc;
                let taken = self.test_branch(instr);
                if taken {
                    if decode::lk(instr) {
                        self.regs.lr = before;
                    }
                    self.regs.pc = self.regs.lr & !0x3;
                }
                Ok("BCLR")
            }
            528 => {
                // bcctr: must not decrement CTR (BO[2] forced true by convention)
                let bo = decode::bo(instr) | 0b00100;
                let bi = decode::bi(instr);
                let bo0 = (bo >> 4) & 1 != 0;
                let bo1 = (bo >> 3) & 1 != 0;
                let cond_ok = bo0 || (self.regs.cr_bit(bi) == bo1);
                let before = self.regs.pc;
                if cond_ok {
                    if decode::lk(instr) {
                        self.regs.lr = before;
                    }
                    self.regs.pc = self.regs.ctr & !0x3;
                }
                Ok("BCCTR")
            }
            _ => Err(OSErr::IllegalInstruction),
        }
    }

    fn exec_op31(
        &mut self,
        instr: u32,
        mem: &mut dyn AddressSpace,
    ) -> Result<&'static str, OSErr> {
        let rd = decode::rd(instr);
        let ra = decode::ra(instr);
        let rb = decode::rb(instr);
        match decode::xo10(instr) {
            266 => {
                // add
                let (result, carry) = self.regs.gpr[ra as usize]
                    .overflowing_add(self.regs.gpr[rb as usize]);
                self.regs.gpr[rd as usize] = result;
                if decode::oe(instr) {
                    self.regs.set_xer_so_ov(carry);
                }
                if decode::rc(instr) {
                    self.regs.set_cr0(result as i32);
                }
                Ok("ADD")
            }
            40 => {
                // subf: RB - RA
                let (result, carry) = self.regs.gpr[rb as usize]
                    .overflowing_sub(self.regs.gpr[ra as usize]);
                self.regs.gpr[rd as usize] = result;
                if decode::oe(instr) {
                    self.regs.set_xer_so_ov(carry);
                }
                if decode::rc(instr) {
                    self.regs.set_cr0(result as i32);
                }
                Ok("SUBF")
            }
            444 => {
                // or rA,rS,rB (the X-form's "rd" field is the source RS here;
                // `mr rA,rS` is assembled as `or rA,rS,rS`).
                let rs = rd;
                let value = self.regs.gpr[rs as usize] | self.regs.gpr[rb as usize];
                self.regs.gpr[ra as usize] = value;
                if decode::rc(instr) {
                    self.regs.set_cr0(value as i32);
                }
                Ok("OR")
            }
            0 => {
                // cmp (signed)
                let crf = rd >> 2;
                let a = self.regs.gpr[ra as usize] as i32;
                let b = self.regs.gpr[rb as usize] as i32;
                let field = if a < b {
                    0b1000
                } else if a > b {
                    0b0100
                } else {
                    0b0010
                };
                self.regs.set_cr_field(crf, field);
                Ok("CMP")
            }
            32 => {
                // cmpl (unsigned)
                let crf = rd >> 2;
                let a = self.regs.gpr[ra as usize];
                let b = self.regs.gpr[rb as usize];
                let field = if a < b {
                    0b1000
                } else if a > b {
                    0b0100
                } else {
                    0b0010
                };
                self.regs.set_cr_field(crf, field);
                Ok("CMPL")
            }
            339 => {
                // mfspr
                let sprn = decode::spr(instr);
                let value = match sprn {
                    1 => self.regs.xer,
                    8 => self.regs.lr,
                    9 => self.regs.ctr,
                    268 => self.regs.tbl,
                    269 => self.regs.tbu,
                    22 => self.regs.dec,
                    287 => self.regs.pvr,
                    _ => return Err(OSErr::IllegalInstruction),
                };
                self.regs.gpr[rd as usize] = value;
                Ok("MFSPR")
            }
            467 => {
                // mtspr
                let sprn = decode::spr(instr);
                let value = self.regs.gpr[rd as usize];
                match sprn {
                    1 => self.regs.xer = value,
                    8 => self.regs.lr = value,
                    9 => self.regs.ctr = value,
                    22 => self.regs.dec = value,
                    268 | 269 | 287 => {} // read-only in user mode
                    _ => return Err(OSErr::IllegalInstruction),
                }
                Ok("MTSPR")
            }
            20 => {
                // lwarx: single-threaded simplification, behaves as lwz.
                let base = if ra == 0 { 0 } else { self.regs.gpr[ra as usize] };
                let addr = base.wrapping_add(self.regs.gpr[rb as usize]);
                self.regs.gpr[rd as usize] = mem.read_u32(addr)?;
                Ok("LWARX")
            }
            150 => {
                // stwcx.: reservation always succeeds (single-threaded model).
                let base = if ra == 0 { 0 } else { self.regs.gpr[ra as usize] };
                let addr = base.wrapping_add(self.regs.gpr[rb as usize]);
                mem.write_u32(addr, self.regs.gpr[rd as usize])?;
                self.regs.set_cr_field(0, 0b0010);
                Ok("STWCX")
            }
            598 | 854 | 982 | 1014 => {
                // sync, eieio, icbi, dcbz and friends share this family in
                // spirit; the full set NOPs under interpretation.
                Ok("ORDERING_NOP")
            }
            _ => Err(OSErr::IllegalInstruction),
        }
    }
}

impl Default for PpcBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend for PpcBackend {
    fn name(&self) -> &'static str {
        "ppc_interp"
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
        self.regs = PpcRegs::default();
        self.regs.pc = entry_pc;
        self.regs.gpr[1] = initial_sp;
        self.halted = false;
    }

    fn a5_register_name(&self) -> &'static str {
        "r13"
    }

    fn stack_register_names(&self) -> (&'static str, Option<&'static str>) {
        ("r1", None)
    }

    fn jt_entry_size(&self) -> u32 {
        JT_ENTRY_SIZE
    }

    fn write_jt_slot(&self, mem: &mut dyn AddressSpace, slot_addr: u32, target: u32) -> Result<(), OSErr> {
        let hi = (target >> 16) as i16;
        let lo = (target & 0xFFFF) as u16;
        mem.write_u32(slot_addr, instr_addis(11, 0, hi))?;
        mem.write_u32(slot_addr + 4, instr_ori(11, 11, lo))?;
        mem.write_u32(slot_addr + 8, instr_mtspr(11, SPR_CTR))?;
        mem.write_u32(slot_addr + 12, instr_bcctr_always())
    }

    fn make_lazy_jt_stub(
        &self,
        mem: &mut dyn AddressSpace,
        slot_addr: u32,
        seg_id: i16,
        _entry_idx: u8,
    ) -> Result<(), OSErr> {
        mem.write_u32(slot_addr, instr_addi(3, 0, seg_id))?;
        mem.write_u32(slot_addr + 4, instr_sc())?;
        mem.write_u32(slot_addr + 8, instr_blr())
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
                    mem.write_u16(addr + 2, entry.addend as i16 as u16)?;
                }
                RelocKind::PCRel32 => {
                    if entry.addend % 4 != 0 || entry.addend < -(1 << 25) || entry.addend >= (1 << 25) {
                        return Err(OSErr::RelocError);
                    }
                    let orig = mem.read_u32(addr)?;
                    let opcode_bits = orig & 0xFC00_0000;
                    let li_field = (entry.addend as u32) & 0x03FF_FFFC;
                    mem.write_u32(addr, opcode_bits | li_field)?;
                }
            }
        }
        Ok(())
    }

    fn advance_time_base(&mut self, ticks: u64) {
        self.regs.set_time_base(self.regs.time_base().wrapping_add(ticks));
    }

    fn classify_jt_slot(&self, mem: &dyn AddressSpace, slot_addr: u32) -> Result<JtSlotState, OSErr> {
        let first = mem.read_u32(slot_addr)?;
        if first & 0xFFFF_0000 == 0x3860_0000 {
            let seg_id = (first & 0xFFFF) as i16;
            return Ok(JtSlotState::Lazy { seg_id });
        }
        if decode::opcode(first) == 15 && decode::rd(first) == 11 && decode::ra(first) == 0 {
            let hi = decode::uimm(first);
            let second = mem.read_u32(slot_addr + 4)?;
            let lo = decode::uimm(second);
            let target = (hi << 16) | lo;
            return Ok(JtSlotState::Resolved { target });
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
        let instr = match self.fetch(mem) {
            Ok(i) => i,
            Err(e) => {
                self.halted = true;
                return Err(e);
            }
        };
        match self.exec(instr, mem, traps) {
            Ok(name) => Ok(name),
            Err(e) => {
                self.halted = true;
                Err(e)
            }
        }
    }
}

/// Registers this backend with the global registry under `"ppc_interp"`.
pub fn register() {
    mac7_cpu_backend::cpu_backend_register("ppc_interp", || Box::new(PpcBackend::new()));
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

    fn asm_addi(rd: u8, ra: u8, simm: i16) -> u32 {
        (14 << 26) | ((rd as u32) << 21) | ((ra as u32) << 16) | (simm as u16 as u32)
    }

    #[test]
    fn addi_loads_immediate_when_ra_is_zero() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        m.0.write_u32(0x2000, asm_addi(3, 0, 42)).unwrap();
        cpu.reset(0x2000, 0x8000);
        let mut traps = TrapTable::new();
        let name = cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(name, "ADDI");
        assert_eq!(cpu.regs.gpr[3], 42);
    }

    #[test]
    fn sc_dispatches_through_trap_table_using_r3() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        m.0.write_u32(0x2000, 17 << 26).unwrap(); // sc
        cpu.reset(0x2000, 0x8000);
        cpu.regs.gpr[3] = 7;
        let mut traps = TrapTable::new();
        traps
            .register(
                7,
                Box::new(|ctx| {
                    ctx.regs.set("r3", 99)?;
                    Ok(())
                }),
            )
            .unwrap();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.gpr[3], 99);
    }

    #[test]
    fn unconditional_branch_sets_lr_when_linked() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // bl +8 (AA=0, LK=1)
        let instr = (18u32 << 26) | (8u32 & 0x03FF_FFFC) | 1;
        m.0.write_u32(0x3000, instr).unwrap();
        cpu.reset(0x3000, 0x8000);
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.pc(), 0x3008);
        assert_eq!(cpu.regs.lr, 0x3004);
    }

    #[test]
    fn bcctr_does_not_decrement_ctr() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // bcctr with BO=20 (branch always, ignore CTR) -> xo=528
        let instr = (19u32 << 26) | (20u32 << 21) | (528u32 << 1);
        m.0.write_u32(0x4000, instr).unwrap();
        cpu.reset(0x4000, 0x8000);
        cpu.regs.ctr = 0x5000;
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.pc(), 0x5000);
        assert_eq!(cpu.regs.ctr, 0x5000);
    }

    #[test]
    fn stwcx_always_sets_cr0_eq() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // stwcx. r3, 0, r4 -> op31 xo=150, rc forced 1
        let instr = (31u32 << 26) | (3u32 << 21) | (4u32 << 11) | (150u32 << 1) | 1;
        m.0.write_u32(0x5000, instr).unwrap();
        cpu.reset(0x5000, 0x8000);
        cpu.regs.gpr[3] = 0xDEAD_BEEF;
        cpu.regs.gpr[4] = 0x9000;
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.cr_field(0), 0b0010);
        assert_eq!(m.0.read_u32(0x9000).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn write_jt_slot_builds_lis_ori_mtctr_bctr() {
        let cpu = PpcBackend::new();
        let mut m = mem();
        cpu.write_jt_slot(&mut m, 0x3000, 0x0012_3456).unwrap();
        assert_eq!(m.0.read_u32(0x3000).unwrap(), instr_addis(11, 0, 0x0012));
        assert_eq!(m.0.read_u32(0x3004).unwrap(), instr_ori(11, 11, 0x3456));
        assert_eq!(m.0.read_u32(0x3008).unwrap(), instr_mtspr(11, SPR_CTR));
        assert_eq!(m.0.read_u32(0x300C).unwrap(), instr_bcctr_always());
    }

    #[test]
    fn lazy_stub_executes_through_sc_and_blr() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        cpu.make_lazy_jt_stub(&mut m, 0x3000, 4, 0).unwrap();
        cpu.reset(0x3000, 0x8000);
        cpu.regs.lr = 0x9000;
        let mut traps = TrapTable::new();
        traps
            .register(4, Box::new(|_ctx| Ok(())))
            .unwrap();
        cpu.step(&mut m, &mut traps).unwrap(); // li r3,4
        assert_eq!(cpu.regs.gpr[3], 4);
        cpu.step(&mut m, &mut traps).unwrap(); // sc
        cpu.step(&mut m, &mut traps).unwrap(); // blr
        assert_eq!(cpu.pc(), 0x9000);
    }

    #[test]
    fn relocate_patches_jt_import() {
        use mac7_cpu_backend::{RelocEntry, RelocKind};
        let cpu = PpcBackend::new();
        let mut m = mem();
        let mut table = RelocTable::new();
        table.push(RelocEntry {
            kind: RelocKind::JTImport,
            at_offset: 0,
            addend: 0,
            target_segment: None,
            jt_index: Some(3),
        });
        cpu.relocate(&mut m, &table, 0x2000, 0x5000, 0x9000).unwrap();
        assert_eq!(m.0.read_u32(0x2000).unwrap(), 0x5000 + 3 * JT_ENTRY_SIZE);
    }

    #[test]
    fn classify_jt_slot_distinguishes_resolved_from_lazy() {
        let cpu = PpcBackend::new();
        let mut m = mem();
        cpu.write_jt_slot(&mut m, 0x3000, 0x0012_3456).unwrap();
        assert_eq!(
            cpu.classify_jt_slot(&m, 0x3000).unwrap(),
            mac7_cpu_backend::JtSlotState::Resolved { target: 0x0012_3456 }
        );
        cpu.make_lazy_jt_stub(&mut m, 0x3100, 9, 0).unwrap();
        assert_eq!(
            cpu.classify_jt_slot(&m, 0x3100).unwrap(),
            mac7_cpu_backend::JtSlotState::Lazy { seg_id: 9 }
        );
    }

    #[test]
    fn unimplemented_altivec_opcode_is_illegal() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // opcode 4, extended opcode 1 — not a VXO constant this interpreter knows.
        m.0.write_u32(0x6000, (4u32 << 26) | 1).unwrap();
        cpu.reset(0x6000, 0x8000);
        let mut traps = TrapTable::new();
        assert!(cpu.step(&mut m, &mut traps).is_err());
        assert!(cpu.is_halted());
    }

    #[test]
    fn vaddubm_wraps_per_byte_lane() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // vaddubm v3,v1,v2 -> opcode 4, vxo11=0
        let instr = (4u32 << 26) | (3u32 << 21) | (1u32 << 16) | (2u32 << 11);
        m.0.write_u32(0x6000, instr).unwrap();
        cpu.reset(0x6000, 0x8000);
        cpu.regs.vr[1] = [0xFF; 16];
        cpu.regs.vr[2] = [1; 16];
        let mut traps = TrapTable::new();
        let name = cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(name, "ALTIVEC");
        assert_eq!(cpu.regs.vr[3], [0u8; 16]);
    }

    #[test]
    fn vand_is_bitwise_and_per_lane() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // vand v3,v1,v2 -> vxo11=1028, encoded directly in the low 11 bits.
        let instr = (4u32 << 26) | (3u32 << 21) | (1u32 << 16) | (2u32 << 11) | 1028;
        m.0.write_u32(0x6000, instr).unwrap();
        cpu.reset(0x6000, 0x8000);
        cpu.regs.vr[1] = [0b1100_1100; 16];
        cpu.regs.vr[2] = [0b1010_1010; 16];
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.vr[3], [0b1000_1000; 16]);
    }

    #[test]
    fn fadd_computes_double_precision_sum() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // fadd f1,f2,f3 -> opcode 63, xo5=21 (A-form: bit1 set, bits1-5=21<<1... )
        let instr = (63u32 << 26) | (1u32 << 21) | (2u32 << 16) | (3u32 << 11) | (21u32 << 1);
        m.0.write_u32(0x7000, instr).unwrap();
        cpu.reset(0x7000, 0x8000);
        cpu.regs.fpr[2] = 1.5;
        cpu.regs.fpr[3] = 2.25;
        let mut traps = TrapTable::new();
        let name = cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(name, "FADD");
        assert_eq!(cpu.regs.fpr[1], 3.75);
    }

    #[test]
    fn advance_time_base_increments_tbl_and_carries_into_tbu() {
        let mut cpu = PpcBackend::new();
        cpu.regs.tbl = u32::MAX - 1;
        cpu.regs.tbu = 0;
        cpu.advance_time_base(1);
        assert_eq!(cpu.regs.tbl, u32::MAX);
        assert_eq!(cpu.regs.tbu, 0);
        cpu.advance_time_base(1);
        assert_eq!(cpu.regs.tbl, 0);
        assert_eq!(cpu.regs.tbu, 1);
    }

    #[test]
    fn mfspr_reads_incremented_time_base() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // mfspr r3, tbl (SPR 268) -> op31 xo=339
        let spr_field = ((268u32 & 0x1F) << 5) | (268u32 >> 5);
        let instr = (31u32 << 26) | (3u32 << 21) | (spr_field << 11) | (339u32 << 1);
        m.0.write_u32(0x8000, instr).unwrap();
        cpu.reset(0x8000, 0x9000);
        cpu.advance_time_base(42);
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.gpr[3], 42);
    }

    #[test]
    fn fcmpu_sets_cr_field_from_comparison() {
        let mut cpu = PpcBackend::new();
        let mut m = mem();
        // fcmpu crf0,f2,f3 -> opcode 63, xo10=0
        let instr = (63u32 << 26) | (2u32 << 16) | (3u32 << 11);
        m.0.write_u32(0x7000, instr).unwrap();
        cpu.reset(0x7000, 0x8000);
        cpu.regs.fpr[2] = 1.0;
        cpu.regs.fpr[3] = 2.0;
        let mut traps = TrapTable::new();
        cpu.step(&mut m, &mut traps).unwrap();
        assert_eq!(cpu.regs.cr_field(0), 0b1000);
    }
}
