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

use mac7_cpu_backend::{OSErr, Registers};

/// PowerPC 603 identifier, the MVP's default `PVR` value.
pub const PVR_603: u32 = 0x0003_0001;

pub const XER_SO: u32 = 1 << 31;
pub const XER_OV: u32 = 1 << 30;
pub const XER_CA: u32 = 1 << 29;

/// The register file. `fpr` backs the opcode-59/63 FPU instructions and `vr`
/// the opcode-4 AltiVec instructions decoded in `ppc-interp`'s `exec_op59`/
/// `exec_op63`/`exec_op4`; `tbl`/`tbu` form the 64-bit time base advanced by
/// [`super::PpcBackend`]'s [`mac7_cpu_backend::CpuBackend::advance_time_base`]
/// override.
#[derive(Debug, Clone)]
pub struct PpcRegs {
    pub gpr: [u32; 32],
    pub fpr: [f64; 32],
    pub vr: [[u8; 16]; 32],
    pub pc: u32,
    pub lr: u32,
    pub ctr: u32,
    /// 8 fields of 4 bits each, field 0 in the most-significant nibble.
    pub cr: u32,
    pub xer: u32,
    pub fpscr: u32,
    pub msr: u32,
    pub tbl: u32,
    pub tbu: u32,
    pub dec: u32,
    pub pvr: u32,
}

impl Default for PpcRegs {
    fn default() -> Self {
        PpcRegs {
            gpr: [0; 32],
            fpr: [0.0; 32],
            vr: [[0; 16]; 32],
            pc: 0,
            lr: 0,
            ctr: 0,
            cr: 0,
            xer: 0,
            fpscr: 0,
            msr: 0,
            tbl: 0,
            tbu: 0,
            dec: 0,
            pvr: PVR_603,
        }
    }
}

impl PpcRegs {
    pub fn cr_field(&self, n: u8) -> u8 {
        let shift = (7 - n) * 4;
        ((self.cr >> shift) & 0xF) as u8
    }

    pub fn set_cr_field(&mut self, n: u8, value: u8) {
        let shift = (7 - n) * 4;
        self.cr = (self.cr & !(0xF << shift)) | (((value as u32) & 0xF) << shift);
    }

    pub fn cr_bit(&self, bi: u8) -> bool {
        let field = bi / 4;
        let bit_in_field = 3 - (bi % 4);
        (self.cr_field(field) >> bit_in_field) & 1 != 0
    }

    pub fn set_cr0(&mut self, result: i32) {
        let so = self.xer & XER_SO != 0;
        let mut field = 0u8;
        if result < 0 {
            field |= 0b1000;
        } else if result > 0 {
            field |= 0b0100;
        } else {
            field |= 0b0010;
        }
        if so {
            field |= 0b0001;
        }
        self.set_cr_field(0, field);
    }

    pub fn set_xer_so_ov(&mut self, overflow: bool) {
        if overflow {
            self.xer |= XER_OV | XER_SO;
        } else {
            self.xer &= !XER_OV;
        }
    }

    /// `TBL`/`TBU` form one 64-bit free-running counter (`TBU:TBL`).
    pub fn time_base(&self) -> u64 {
        ((self.tbu as u64) << 32) | self.tbl as u64
    }

    pub fn set_time_base(&mut self, value: u64) {
        self.tbu = (value >> 32) as u32;
        self.tbl = value as u32;
    }
}

impl Registers for PpcRegs {
    fn get(&self, name: &str) -> Result<u32, OSErr> {
        if let Some(n) = name.strip_prefix('r') {
            if let Ok(i) = n.parse::<usize>() {
                if i < 32 {
                    return Ok(self.gpr[i]);
                }
            }
        }
        match name {
            "pc" => Ok(self.pc),
            "lr" => Ok(self.lr),
            "ctr" => Ok(self.ctr),
            "cr" => Ok(self.cr),
            "xer" => Ok(self.xer),
            "msr" => Ok(self.msr),
            "tbl" => Ok(self.tbl),
            "tbu" => Ok(self.tbu),
            "dec" => Ok(self.dec),
            "pvr" => Ok(self.pvr),
            _ => Err(OSErr::ParamErr),
        }
    }

    fn set(&mut self, name: &str, value: u32) -> Result<(), OSErr> {
        if let Some(n) = name.strip_prefix('r') {
            if let Ok(i) = n.parse::<usize>() {
                if i < 32 {
                    self.gpr[i] = value;
                    return Ok(());
                }
            }
        }
        match name {
            "pc" => self.pc = value,
            "lr" => self.lr = value,
            "ctr" => self.ctr = value,
            "cr" => self.cr = value,
            "xer" => self.xer = value,
            "msr" => self.msr = value,
            "tbl" | "tbu" | "pvr" => {} // read-only in user mode
            "dec" => self.dec = value,
            _ => return Err(OSErr::ParamErr),
        }
        Ok(())
    }

    fn return_reg(&self) -> &'static str {
        "r3"
    }
}
