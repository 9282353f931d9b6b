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

use mac7_guest_memory::GuestMemError;
use thiserror::Error;

/// The runtime's shared error currency ("OSErr" in the classic API).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OSErr {
    #[error("invalid argument")]
    ParamErr,
    #[error("heap exhausted")]
    OutOfMemory,
    #[error("resource not found")]
    NotFound,
    #[error("malformed resource data")]
    BadFormat,
    #[error("A5 world invariant violated")]
    A5WorldError,
    #[error("jump table slot pattern unrecognized or index out of range")]
    JTError,
    #[error("relocation target out of bounds or misaligned")]
    RelocError,
    #[error("misaligned guest memory access")]
    AddressError,
    #[error("unimplemented or reserved opcode")]
    IllegalInstruction,
    #[error("trap handler returned an error")]
    TrapError,
    #[error("guest access to an unmapped region")]
    BusError,
}

impl From<GuestMemError> for OSErr {
    fn from(e: GuestMemError) -> Self {
        match e {
            GuestMemError::OutOfRange(_) => OSErr::ParamErr,
            GuestMemError::Unaligned { .. } => OSErr::AddressError,
            GuestMemError::Unmapped(_) => OSErr::BusError,
        }
    }
}
