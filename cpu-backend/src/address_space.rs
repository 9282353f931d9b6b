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

use crate::OSErr;
use bitflags::bitflags;

bitflags! {
    /// Mirrors the guest memory's own page protection bits; kept as a
    /// separate type here so backends don't need to depend on
    /// `mac7-guest-memory`'s internals to request a mapping.
    pub struct MapFlags: u8 {
        const READ    = 0b001;
        const WRITE   = 0b010;
        const EXECUTE = 0b100;
    }
}

bitflags! {
    /// Flags passed to [`AddressSpace::enter`] describing how control is
    /// being transferred into guest code (fresh call vs. trap return,
    /// whether the jump table's lazy-load stub is allowed to fire).
    pub struct EnterFlags: u8 {
        const ALLOW_LAZY_LOAD = 0b001;
        const IS_TRAP_RETURN  = 0b010;
    }
}

/// Object-safe view of the guest's paged address space a [`CpuBackend`]
/// operates over. A trait rather than a concrete type so the interpreter
/// crates never need to depend on `mac7-guest-memory` directly — they only
/// see this seam.
///
/// [`CpuBackend`]: crate::CpuBackend
pub trait AddressSpace {
    fn read_u8(&self, addr: u32) -> Result<u8, OSErr>;
    fn read_u16(&self, addr: u32) -> Result<u16, OSErr>;
    fn read_u32(&self, addr: u32) -> Result<u32, OSErr>;

    fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), OSErr>;
    fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), OSErr>;
    fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), OSErr>;

    fn read_bytes(&self, addr: u32, buf: &mut [u8]) -> Result<(), OSErr>;
    fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), OSErr>;

    /// Ensures `len` bytes starting at `addr` are backed by committed pages
    /// with the given protections, paging new pages in as needed.
    fn ensure_mapped(&mut self, addr: u32, len: u32, flags: MapFlags) -> Result<(), OSErr>;

    fn max_guest(&self) -> u32;
}
