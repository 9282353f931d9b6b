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

use crate::bump_alloc::BumpAllocator;
use crate::error::SegLoaderError;
use mac7_code_parser::Code0Info;
use mac7_cpu_backend::{AddressSpace, CpuBackend, MapFlags};

const SIZE_GUARD: u32 = 1024 * 1024;
/// `CODE 0`'s own jump-table entry width, fixed by the resource format
/// regardless of which backend ends up materializing the slots.
const CODE0_JT_ENTRY_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy)]
pub struct A5World {
    pub below_base: u32,
    pub base: u32,
    pub jt_base: u32,
    /// Guest-memory span of the jump table, in the *backend's* slot size
    /// (`jt_count * cpu.jt_entry_size()`), which on PPC is larger than the
    /// resource's own `jt_size` field — see `DESIGN.md`.
    pub jt_span: u32,
    pub jt_count: usize,
    pub above_base: u32,
    pub above_size: u32,
}

/// Lays out the below-A5/A5/jump-table/above-A5 region as one contiguous
/// bump allocation and points the backend's A5 (or R13) register at it.
/// Verifies the four invariants from `SPEC_FULL.md` §3.
pub fn install_a5_world(
    cpu: &mut dyn CpuBackend,
    mem: &mut dyn AddressSpace,
    bump: &mut BumpAllocator,
    code0: &Code0Info,
) -> Result<A5World, SegLoaderError> {
    if code0.below_a5_size > SIZE_GUARD || code0.above_a5_size > SIZE_GUARD || code0.jt_size > SIZE_GUARD {
        return Err(SegLoaderError::A5WorldInvariant("below/above-A5/JT size exceeds sanity guard"));
    }
    let jt_count = code0.jt_count();
    if jt_count as u32 * CODE0_JT_ENTRY_SIZE != code0.jt_size {
        return Err(SegLoaderError::A5WorldInvariant("jt_count * jt_entry_size != jt_size"));
    }

    let jt_span = jt_count as u32 * cpu.jt_entry_size();
    let total = code0
        .below_a5_size
        .saturating_add(code0.jt_offset_from_a5)
        .saturating_add(jt_span)
        .saturating_add(code0.above_a5_size);
    let region_base = bump.alloc(mem, total, MapFlags::READ | MapFlags::WRITE)?;

    let below_base = region_base;
    let base = below_base + code0.below_a5_size;
    let jt_base = base + code0.jt_offset_from_a5;
    let above_base = jt_base + jt_span;
    let above_size = code0.above_a5_size;

    if below_base + code0.below_a5_size != base {
        return Err(SegLoaderError::A5WorldInvariant("a5_below_base + a5_below_size != a5_base"));
    }
    if jt_base != base + code0.jt_offset_from_a5 {
        return Err(SegLoaderError::A5WorldInvariant("jt_base != a5_base + jt_offset_from_a5"));
    }

    cpu.registers_mut()
        .set(cpu.a5_register_name(), base)
        .map_err(SegLoaderError::Backend)?;
    let read_back = cpu.registers().get(cpu.a5_register_name()).map_err(SegLoaderError::Backend)?;
    if read_back != base {
        return Err(SegLoaderError::A5WorldInvariant("A5 register does not equal a5_base after construction"));
    }

    Ok(A5World { below_base, base, jt_base, jt_span, jt_count, above_base, above_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mac7_code_parser::JtEntry;
    use mac7_guest_memory::GuestMemory;
    use mac7_m68k_interp::M68kBackend;
    use mac7_cpu_backend::OSErr;

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
        fn ensure_mapped(&mut self, _a: u32, _l: u32, _f: MapFlags) -> Result<(), OSErr> {
            Ok(())
        }
        fn max_guest(&self) -> u32 {
            self.0.max_guest()
        }
    }

    fn sample_code0() -> Code0Info {
        Code0Info {
            above_a5_size: 512,
            below_a5_size: 256,
            jt_size: 16,
            jt_offset_from_a5: 0,
            entries: vec![JtEntry { offset: 0, instruction: 0, target: 0 }; 2],
        }
    }

    #[test]
    fn lays_out_a5_world_and_sets_register() {
        let mut cpu = M68kBackend::new();
        let mut mem = Mem(GuestMemory::new(4 * 1024 * 1024));
        let mut bump = BumpAllocator::new(0x1000);
        let world = install_a5_world(&mut cpu, &mut mem, &mut bump, &sample_code0()).unwrap();
        assert_eq!(world.below_base + 256, world.base);
        assert_eq!(world.jt_base, world.base);
        assert_eq!(world.above_base, world.jt_base + world.jt_span);
        assert_eq!(cpu.registers().get("a5").unwrap(), world.base);
    }

    #[test]
    fn rejects_jt_size_mismatch() {
        let mut cpu = M68kBackend::new();
        let mut mem = Mem(GuestMemory::new(4 * 1024 * 1024));
        let mut bump = BumpAllocator::new(0x1000);
        let mut code0 = sample_code0();
        code0.jt_size = 100; // doesn't match entries.len() * 8
        assert!(install_a5_world(&mut cpu, &mut mem, &mut bump, &code0).is_err());
    }
}
