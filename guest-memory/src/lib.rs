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

//! A sparse, page-allocated guest address space.
//!
//! Pages are 4 KiB, allocated lazily on first write, and never freed
//! individually — only en masse when the owning [`GuestMemory`] is dropped.
//! A page never moves once allocated, so guest pointers into it stay
//! stable for the address space's lifetime.

use mac7_endian_codec::{read_u16_be, read_u32_be, write_u16_be, write_u32_be};
use thiserror::Error;

pub const PAGE_SIZE: u32 = 4096;

/// A guest address space error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GuestMemError {
    #[error("guest address {0:#x} is out of range")]
    OutOfRange(u32),
    #[error("misaligned access at {addr:#x} for a {size}-byte value")]
    Unaligned { addr: u32, size: u32 },
    #[error("read of unmapped guest address {0:#x}")]
    Unmapped(u32),
}

type Page = Box<[u8; PAGE_SIZE as usize]>;

/// A bounded, lazily-allocated 4 KiB-paged guest address space.
pub struct GuestMemory {
    max_guest: u32,
    pages: Vec<Option<Page>>,
}

impl GuestMemory {
    /// Creates a new guest address space spanning `[0, max_guest)`.
    ///
    /// `max_guest` must be a power of two and a multiple of [`PAGE_SIZE`].
    pub fn new(max_guest: u32) -> Self {
        assert!(max_guest.is_power_of_two());
        assert_eq!(max_guest % PAGE_SIZE, 0);
        let page_count = (max_guest / PAGE_SIZE) as usize;
        let mut pages = Vec::with_capacity(page_count);
        pages.resize_with(page_count, || None);
        GuestMemory { max_guest, pages }
    }

    pub fn max_guest(&self) -> u32 {
        self.max_guest
    }

    fn page_index(&self, addr: u32) -> Result<usize, GuestMemError> {
        if addr >= self.max_guest {
            return Err(GuestMemError::OutOfRange(addr));
        }
        Ok((addr / PAGE_SIZE) as usize)
    }

    /// Returns the host page backing `addr`, allocating a zeroed page on
    /// first access when `allocate` is true. Returns `None` if `addr` is
    /// out of range or the page is absent and `allocate` is false.
    fn get_page(&mut self, addr: u32, allocate: bool) -> Option<&mut Page> {
        let idx = self.page_index(addr).ok()?;
        if self.pages[idx].is_none() {
            if !allocate {
                return None;
            }
            self.pages[idx] = Some(Box::new([0u8; PAGE_SIZE as usize]));
        }
        self.pages[idx].as_mut()
    }

    fn get_page_ro(&self, addr: u32) -> Option<&Page> {
        let idx = self.page_index(addr).ok()?;
        self.pages[idx].as_ref()
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, GuestMemError> {
        self.page_index(addr)?;
        let page = self
            .get_page_ro(addr)
            .ok_or(GuestMemError::Unmapped(addr))?;
        Ok(page[(addr % PAGE_SIZE) as usize])
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), GuestMemError> {
        let off = (addr % PAGE_SIZE) as usize;
        let page = self
            .get_page(addr, true)
            .ok_or(GuestMemError::OutOfRange(addr))?;
        page[off] = value;
        Ok(())
    }

    /// Classic 68K rule: 16- and 32-bit accesses both require 2-byte
    /// alignment. Misalignment is an `AddressError`, not silently fixed up.
    fn check_align(addr: u32, size: u32) -> Result<(), GuestMemError> {
        if addr % 2 != 0 {
            return Err(GuestMemError::Unaligned { addr, size });
        }
        Ok(())
    }

    pub fn read_u16(&self, addr: u32) -> Result<u16, GuestMemError> {
        Self::check_align(addr, 2)?;
        let hi = self.read_u8(addr)?;
        let lo = self.read_u8(addr + 1)?;
        let mut buf = [0u8; 2];
        buf[0] = hi;
        buf[1] = lo;
        Ok(read_u16_be(&buf, 0))
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), GuestMemError> {
        Self::check_align(addr, 2)?;
        let mut buf = [0u8; 2];
        write_u16_be(&mut buf, 0, value);
        self.write_u8(addr, buf[0])?;
        self.write_u8(addr + 1, buf[1])?;
        Ok(())
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, GuestMemError> {
        Self::check_align(addr, 4)?;
        let mut buf = [0u8; 4];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_u8(addr + i as u32)?;
        }
        Ok(read_u32_be(&buf, 0))
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), GuestMemError> {
        Self::check_align(addr, 4)?;
        let mut buf = [0u8; 4];
        write_u32_be(&mut buf, 0, value);
        for (i, b) in buf.iter().enumerate() {
            self.write_u8(addr + i as u32, *b)?;
        }
        Ok(())
    }

    /// Byte-wise copy from host `src` into guest memory starting at `addr`,
    /// allocating pages as needed.
    pub fn memcpy_into_guest(&mut self, addr: u32, src: &[u8]) -> Result<(), GuestMemError> {
        for (i, b) in src.iter().enumerate() {
            self.write_u8(addr + i as u32, *b)?;
        }
        Ok(())
    }

    /// Byte-wise copy from guest memory starting at `addr` into host `dst`.
    pub fn memcpy_from_guest(&self, dst: &mut [u8], addr: u32) -> Result<(), GuestMemError> {
        for (i, b) in dst.iter_mut().enumerate() {
            *b = self.read_u8(addr + i as u32)?;
        }
        Ok(())
    }
}
