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

/// What a jump-table slot's bytes currently encode, as classified by
/// [`crate::CpuBackend::classify_jt_slot`]. The segment loader uses this to
/// decide whether `_LoadSeg` needs to run or the slot can be jumped through
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JtSlotState {
    /// Already patched to a direct jump/branch to `target`.
    Resolved { target: u32 },
    /// Still the lazy-loading stub for `seg_id`.
    Lazy { seg_id: i16 },
    /// Neither recognized pattern — a corrupt slot or one nobody built.
    Unknown,
}
