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

use mac7_cpu_backend::AddressSpace;

/// A named low-memory global's byte address, mirroring the fixed catalog
/// the classic 68K/PPC runtime reserved in the first 4 KiB of guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Global {
    Ticks,
    CurrentA5,
    ThePort,
    MemTop,
    SysZone,
    ApplZone,
}

impl Global {
    pub fn addr(self) -> u32 {
        match self {
            Global::Ticks => 0x016A,
            Global::CurrentA5 => 0x0904,
            Global::ThePort => 0x0A86,
            Global::MemTop => 0x0108,
            Global::SysZone => 0x02A6,
            Global::ApplZone => 0x02AA,
        }
    }
}

/// The low-memory region's size; addresses at or beyond this are rejected
/// by [`lm_get_u8`] and friends rather than forwarded to guest memory.
pub const LOW_MEMORY_SIZE: u32 = 4096;

fn in_range(addr: u32) -> bool {
    addr < LOW_MEMORY_SIZE
}

pub fn lm_get_u8(mem: &dyn AddressSpace, addr: u32) -> u8 {
    if !in_range(addr) {
        log::warn!("low-memory global read out of range: {:#x}", addr);
        return 0;
    }
    mem.read_u8(addr).unwrap_or(0)
}

pub fn lm_get_u16(mem: &dyn AddressSpace, addr: u32) -> u16 {
    if !in_range(addr) {
        log::warn!("low-memory global read out of range: {:#x}", addr);
        return 0;
    }
    mem.read_u16(addr).unwrap_or(0)
}

pub fn lm_get_u32(mem: &dyn AddressSpace, addr: u32) -> u32 {
    if !in_range(addr) {
        log::warn!("low-memory global read out of range: {:#x}", addr);
        return 0;
    }
    mem.read_u32(addr).unwrap_or(0)
}

pub fn lm_set_u8(mem: &mut dyn AddressSpace, addr: u32, value: u8) {
    if !in_range(addr) {
        log::warn!("low-memory global write out of range: {:#x}, ignored", addr);
        return;
    }
    let _ = mem.write_u8(addr, value);
}

pub fn lm_set_u16(mem: &mut dyn AddressSpace, addr: u32, value: u16) {
    if !in_range(addr) {
        log::warn!("low-memory global write out of range: {:#x}, ignored", addr);
        return;
    }
    let _ = mem.write_u16(addr, value);
}

pub fn lm_set_u32(mem: &mut dyn AddressSpace, addr: u32, value: u32) {
    if !in_range(addr) {
        log::warn!("low-memory global write out of range: {:#x}, ignored", addr);
        return;
    }
    let _ = mem.write_u32(addr, value);
}
