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

//! The one concrete [`AddressSpace`] the runtime actually constructs.
//! Everything above `mac7-guest-memory` — both interpreters, the segment
//! loader — talks to guest memory only through the trait, so this is the
//! single place that names the concrete paged-memory type.

use mac7_cpu_backend::{AddressSpace, MapFlags, OSErr};
use mac7_guest_memory::GuestMemory;

pub struct GuestAddressSpace(GuestMemory);

impl GuestAddressSpace {
    pub fn new(max_guest: u32) -> Self {
        GuestAddressSpace(GuestMemory::new(max_guest))
    }
}

impl AddressSpace for GuestAddressSpace {
    fn read_u8(&self, addr: u32) -> Result<u8, OSErr> {
        Ok(self.0.read_u8(addr)?)
    }
    fn read_u16(&self, addr: u32) -> Result<u16, OSErr> {
        Ok(self.0.read_u16(addr)?)
    }
    fn read_u32(&self, addr: u32) -> Result<u32, OSErr> {
        Ok(self.0.read_u32(addr)?)
    }
    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), OSErr> {
        Ok(self.0.write_u8(addr, value)?)
    }
    fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), OSErr> {
        Ok(self.0.write_u16(addr, value)?)
    }
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), OSErr> {
        Ok(self.0.write_u32(addr, value)?)
    }
    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), OSErr> {
        Ok(self.0.memcpy_from_guest(buf, addr)?)
    }
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), OSErr> {
        Ok(self.0.memcpy_into_guest(addr, data)?)
    }
    fn ensure_mapped(&mut self, _addr: u32, _len: u32, _flags: MapFlags) -> Result<(), OSErr> {
        // mac7-guest-memory pages lazily on first write; nothing to
        // pre-commit here beyond the bounds check reads/writes already do.
        Ok(())
    }
    fn max_guest(&self) -> u32 {
        self.0.max_guest()
    }
}
