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

use crate::regs::M68kRegs;
use mac7_cpu_backend::{AddressSpace, OSErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    pub fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    /// `MOVE`'s two-bit size field uses a different encoding than most other
    /// instructions (`01`=byte, `11`=word, `10`=long).
    pub fn from_move_bits(bits: u16) -> Result<Size, OSErr> {
        match bits {
            0b01 => Ok(Size::Byte),
            0b11 => Ok(Size::Word),
            0b10 => Ok(Size::Long),
            _ => Err(OSErr::IllegalInstruction),
        }
    }

    /// Most other instructions use the conventional `00`=byte, `01`=word,
    /// `10`=long size field.
    pub fn from_std_bits(bits: u16) -> Result<Size, OSErr> {
        match bits {
            0b00 => Ok(Size::Byte),
            0b01 => Ok(Size::Word),
            0b10 => Ok(Size::Long),
            _ => Err(OSErr::IllegalInstruction),
        }
    }
}

/// A decoded effective address operand. `Mem` already carries the fully
/// computed host-visible guest address; any pre/post increment or extension
/// word consumption happened as a side effect of decoding it.
#[derive(Debug, Clone, Copy)]
pub enum Ea {
    DReg(u8),
    AReg(u8),
    Mem(u32),
    Imm(u32),
}

/// The `A7`-on-byte-op quirk: stack pointer pre/post adjustments always move
/// by at least 2 bytes even for byte-sized operands, to keep it word-aligned.
fn step_size(size: Size, reg: u8) -> u32 {
    if reg == 7 && size == Size::Byte {
        2
    } else {
        size.bytes()
    }
}

pub fn decode_ea(
    regs: &mut M68kRegs,
    mem: &mut dyn AddressSpace,
    mode: u8,
    reg: u8,
    size: Size,
) -> Result<Ea, OSErr> {
    match mode {
        0 => Ok(Ea::DReg(reg)),
        1 => Ok(Ea::AReg(reg)),
        2 => Ok(Ea::Mem(regs.a(reg))),
        3 => {
            let addr = regs.a(reg);
            regs.set_a(reg, addr.wrapping_add(step_size(size, reg)));
            Ok(Ea::Mem(addr))
        }
        4 => {
            let addr = regs.a(reg).wrapping_sub(step_size(size, reg));
            regs.set_a(reg, addr);
            Ok(Ea::Mem(addr))
        }
        5 => {
            let disp = fetch_i16(regs, mem)? as i32;
            Ok(Ea::Mem(regs.a(reg).wrapping_add(disp as u32)))
        }
        6 => {
            let base = regs.a(reg);
            Ok(Ea::Mem(decode_indexed(regs, mem, base)?))
        }
        7 => match reg {
            0 => {
                let addr = fetch_i16(regs, mem)? as i32 as u32;
                Ok(Ea::Mem(addr))
            }
            1 => {
                let addr = fetch_u32(regs, mem)?;
                Ok(Ea::Mem(addr))
            }
            2 => {
                let base = regs.pc;
                let disp = fetch_i16(regs, mem)? as i32;
                Ok(Ea::Mem(base.wrapping_add(disp as u32)))
            }
            3 => {
                let base = regs.pc;
                Ok(Ea::Mem(decode_indexed(regs, mem, base)?))
            }
            4 => match size {
                Size::Long => {
                    let v = fetch_u32(regs, mem)?;
                    Ok(Ea::Imm(v))
                }
                _ => {
                    let v = fetch_i16(regs, mem)? as u16 as u32;
                    Ok(Ea::Imm(v))
                }
            },
            _ => Err(OSErr::IllegalInstruction),
        },
        _ => Err(OSErr::IllegalInstruction),
    }
}

/// Decodes a brief extension word (`d8(An,Xn)` / `d8(PC,Xn)`): bit 15 picks
/// D or A register, bits 14..12 the register number, bit 11 word/long size
/// of the index, bits 7..0 the signed byte displacement. Scale is always 1
/// (no 68020 scale field in this MVP).
fn decode_indexed(regs: &mut M68kRegs, mem: &mut dyn AddressSpace, base: u32) -> Result<u32, OSErr> {
    let ext = fetch_u16_raw(regs, mem)?;
    let is_addr_reg = ext & 0x8000 != 0;
    let xn = ((ext >> 12) & 0x7) as u8;
    let long_index = ext & 0x0800 != 0;
    let disp8 = (ext & 0xFF) as i8 as i32;
    let index_val = if is_addr_reg { regs.a(xn) } else { regs.d[xn as usize] };
    let index_val = if long_index {
        index_val as i32
    } else {
        index_val as i16 as i32
    };
    Ok(base.wrapping_add(index_val as u32).wrapping_add(disp8 as u32))
}

fn fetch_u16_raw(regs: &mut M68kRegs, mem: &dyn AddressSpace) -> Result<u16, OSErr> {
    let v = mem.read_u16(regs.pc)?;
    regs.pc = regs.pc.wrapping_add(2);
    Ok(v)
}

fn fetch_i16(regs: &mut M68kRegs, mem: &dyn AddressSpace) -> Result<i16, OSErr> {
    Ok(fetch_u16_raw(regs, mem)? as i16)
}

/// Public wrapper used by `lib.rs` for instructions (`LINK`, `Bcc` 16-bit
/// extension words) that fetch a signed displacement outside of EA decode.
pub fn fetch_i16_pub(regs: &mut M68kRegs, mem: &dyn AddressSpace) -> Result<i16, OSErr> {
    fetch_i16(regs, mem)
}

fn fetch_u32(regs: &mut M68kRegs, mem: &dyn AddressSpace) -> Result<u32, OSErr> {
    let v = mem.read_u32(regs.pc)?;
    regs.pc = regs.pc.wrapping_add(4);
    Ok(v)
}

pub fn read_ea(
    regs: &M68kRegs,
    mem: &dyn AddressSpace,
    ea: Ea,
    size: Size,
) -> Result<u32, OSErr> {
    match ea {
        Ea::DReg(r) => Ok(mask(regs.d[r as usize], size)),
        Ea::AReg(r) => Ok(regs.a(r)),
        Ea::Imm(v) => Ok(mask(v, size)),
        Ea::Mem(addr) => match size {
            Size::Byte => Ok(mem.read_u8(addr)? as u32),
            Size::Word => Ok(mem.read_u16(addr)? as u32),
            Size::Long => Ok(mem.read_u32(addr)?),
        },
    }
}

pub fn write_ea(
    regs: &mut M68kRegs,
    mem: &mut dyn AddressSpace,
    ea: Ea,
    size: Size,
    value: u32,
) -> Result<(), OSErr> {
    match ea {
        Ea::DReg(r) => {
            regs.d[r as usize] = merge(regs.d[r as usize], value, size);
            Ok(())
        }
        Ea::AReg(r) => {
            // Writes to an address register are always sign-extended,
            // regardless of operand size (MOVEA's defined behaviour).
            let v = match size {
                Size::Word => value as i16 as i32 as u32,
                _ => value,
            };
            regs.set_a(r, v);
            Ok(())
        }
        Ea::Imm(_) => Err(OSErr::IllegalInstruction),
        Ea::Mem(addr) => match size {
            Size::Byte => mem.write_u8(addr, value as u8),
            Size::Word => mem.write_u16(addr, value as u16),
            Size::Long => mem.write_u32(addr, value),
        },
    }
}

fn mask(v: u32, size: Size) -> u32 {
    match size {
        Size::Byte => v & 0xFF,
        Size::Word => v & 0xFFFF,
        Size::Long => v,
    }
}

fn merge(old: u32, new: u32, size: Size) -> u32 {
    match size {
        Size::Byte => (old & !0xFF) | (new & 0xFF),
        Size::Word => (old & !0xFFFF) | (new & 0xFFFF),
        Size::Long => new,
    }
}
