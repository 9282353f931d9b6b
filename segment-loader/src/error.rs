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

use mac7_cpu_backend::OSErr;
use mac7_code_parser::CodeParseError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegLoaderError {
    #[error("no such resource ('{0}', id {1})")]
    ResourceNotFound(&'static str, i16),
    #[error("segment table is full (256 segments)")]
    TableFull,
    #[error("no segment descriptor for id {0}")]
    UnknownSegment(i16),
    #[error("CODE resource malformed: {0}")]
    BadCode(#[from] CodeParseError),
    #[error("A5 world invariant violated: {0}")]
    A5WorldInvariant(&'static str),
    #[error("jump table slot at {0:#010x} unrecognized")]
    BadJtSlot(u32),
    #[error("jump table index {0} out of range")]
    JtIndexOutOfRange(u16),
    #[error(transparent)]
    Backend(#[from] OSErr),
}

impl From<SegLoaderError> for OSErr {
    fn from(e: SegLoaderError) -> Self {
        match e {
            SegLoaderError::Backend(inner) => inner,
            SegLoaderError::ResourceNotFound(..) => OSErr::NotFound,
            SegLoaderError::TableFull | SegLoaderError::UnknownSegment(_) => OSErr::ParamErr,
            SegLoaderError::BadCode(_) => OSErr::BadFormat,
            SegLoaderError::A5WorldInvariant(_) => OSErr::A5WorldError,
            SegLoaderError::BadJtSlot(_) | SegLoaderError::JtIndexOutOfRange(_) => OSErr::JTError,
        }
    }
}
