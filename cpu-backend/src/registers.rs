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

/// Opaque, string-keyed access to a backend's register file. Trap handlers
/// are written once against this trait and work whether the underlying
/// interpreter is 68K or PPC; each backend picks its own key set (`"d0"`,
/// `"a0"`, `"sr"` for 68K, `"r3"`, `"lr"`, `"cr"` for PPC) and documents it.
pub trait Registers {
    fn get(&self, name: &str) -> Result<u32, OSErr>;
    fn set(&mut self, name: &str, value: u32) -> Result<(), OSErr>;

    /// The register conventionally used to pass a trap/syscall's return
    /// value back to the caller (D0 on 68K, R3 on PPC).
    fn return_reg(&self) -> &'static str;
}
