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

use crate::error::SegLoaderError;
use mac7_cpu_backend::{AddressSpace, CpuBackend};

/// Entries per segment in the `seg_id = (i/16)+1` mapping (see `SPEC_FULL.md`
/// §9's Open Questions — a real linker would carry per-entry segment
/// metadata instead of this even split).
const ENTRIES_PER_SEGMENT: usize = 16;

/// Writes a lazy-loading stub into every jump-table slot. Every slot starts
/// cold; `_LoadSeg` hot-patches it to a direct jump on first use.
pub fn build_jump_table(
    cpu: &dyn CpuBackend,
    mem: &mut dyn AddressSpace,
    jt_base: u32,
    jt_count: usize,
) -> Result<(), SegLoaderError> {
    let stride = cpu.jt_entry_size();
    for i in 0..jt_count {
        let slot_addr = jt_base + i as u32 * stride;
        let seg_id = (i / ENTRIES_PER_SEGMENT) as i16 + 1;
        let entry_idx = (i % ENTRIES_PER_SEGMENT) as u8;
        cpu.make_lazy_jt_stub(mem, slot_addr, seg_id, entry_idx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mac7_cpu_backend::{JtSlotState, MapFlags, OSErr};
    use mac7_guest_memory::GuestMemory;
    use mac7_m68k_interp::M68kBackend;

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

    #[test]
    fn every_slot_starts_as_a_lazy_stub_for_its_segment() {
        let cpu = M68kBackend::new();
        let mut mem = Mem(GuestMemory::new(1024 * 1024));
        build_jump_table(&cpu, &mut mem, 0x4000, 18).unwrap();
        assert_eq!(
            cpu.classify_jt_slot(&mem, 0x4000).unwrap(),
            JtSlotState::Lazy { seg_id: 1 }
        );
        // Slot 16 is the first of segment 2.
        let slot16 = 0x4000 + 16 * cpu.jt_entry_size();
        assert_eq!(
            cpu.classify_jt_slot(&mem, slot16).unwrap(),
            JtSlotState::Lazy { seg_id: 2 }
        );
    }
}
