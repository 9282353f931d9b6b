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

//! `GetResource`/`ReleaseResource` seam. Production boot reads from a real
//! resource-fork reader elsewhere in the workspace; tests and the
//! `test-boot` feature use [`TestResourceFile`], an in-memory stand-in
//! selected at compile time rather than the classic runtime's
//! `SEGLOADER_TEST_BOOT` switch.

use crate::error::SegLoaderError;

pub type ResType = [u8; 4];

pub const CODE: ResType = *b"CODE";

/// Supplies resource bytes to the segment loader. A handle's lifetime in
/// the classic API is bounded by `ReleaseResource`; here it's bounded by
/// the returned `Vec`'s own lifetime, since every caller immediately
/// copies the bytes into guest memory or a parser.
pub trait ResourceSource {
    fn get_resource(&self, kind: ResType, id: i16) -> Result<Vec<u8>, SegLoaderError>;
}

#[cfg(any(test, feature = "test-boot"))]
pub struct TestResourceFile {
    entries: std::collections::HashMap<(ResType, i16), Vec<u8>>,
}

#[cfg(any(test, feature = "test-boot"))]
impl TestResourceFile {
    pub fn new() -> Self {
        TestResourceFile { entries: std::collections::HashMap::new() }
    }

    pub fn insert(&mut self, kind: ResType, id: i16, bytes: Vec<u8>) {
        self.entries.insert((kind, id), bytes);
    }
}

#[cfg(any(test, feature = "test-boot"))]
impl Default for TestResourceFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-boot"))]
impl ResourceSource for TestResourceFile {
    fn get_resource(&self, kind: ResType, id: i16) -> Result<Vec<u8>, SegLoaderError> {
        self.entries
            .get(&(kind, id))
            .cloned()
            .ok_or(SegLoaderError::ResourceNotFound("CODE", id))
    }
}
