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

use crate::address_space::AddressSpace;
use crate::jt_slot::JtSlotState;
use crate::reloc::RelocTable;
use crate::registers::Registers;
use crate::traps::TrapTable;
use crate::OSErr;

/// Portable interpreter core. Replaces the classic `ICPUBackend`
/// function-pointer vtable with a trait object: `m68k-interp` and
/// `ppc-interp` each provide one concrete type implementing it, and
/// everything above this crate (the segment loader, the runtime binary)
/// talks only to `Box<dyn CpuBackend>`.
pub trait CpuBackend {
    /// Short, stable identifier used by the backend registry and by log
    /// messages (`"m68k_interp"`, `"ppc_interp"`).
    fn name(&self) -> &'static str;

    fn pc(&self) -> u32;
    fn set_pc(&mut self, pc: u32);

    fn registers(&self) -> &dyn Registers;
    fn registers_mut(&mut self) -> &mut dyn Registers;

    /// Resets all registers and the PC to the backend's cold-boot state.
    /// Does not touch the address space.
    fn reset(&mut self, entry_pc: u32, initial_sp: u32);

    /// Decodes and executes exactly one instruction at the current PC,
    /// advancing PC and dispatching through `traps` if the instruction was
    /// a trap/syscall. Returns the decoded opcode's mnemonic for tracing.
    fn step(
        &mut self,
        mem: &mut dyn AddressSpace,
        traps: &mut TrapTable,
    ) -> Result<&'static str, OSErr>;

    /// Register name this backend's A5 world lives in (`"a5"` on 68K,
    /// `"r13"` — the small-data-area base — on PPC). Looked up through
    /// [`Registers`] rather than hardcoded, so the segment loader never
    /// needs to know which ISA it's driving.
    fn a5_register_name(&self) -> &'static str;

    /// `(user_stack_register, supervisor_stack_register)`. 68K exposes both
    /// `USP` and `SSP`; PPC's `R1` is the only stack pointer, so the second
    /// element is `None`.
    fn stack_register_names(&self) -> (&'static str, Option<&'static str>);

    /// Size in bytes of one resolved jump-table entry for this backend (6
    /// bytes of code plus padding on 68K rounds to 8; 16 on PPC).
    fn jt_entry_size(&self) -> u32;

    /// Overwrites a jump-table slot with a direct jump/branch to `target`.
    fn write_jt_slot(&self, mem: &mut dyn AddressSpace, slot_addr: u32, target: u32) -> Result<(), OSErr>;

    /// Writes the lazy-loading stub (`MOVE.W #seg_id,-(SP); TRAP #$A9F0;
    /// RTS` on 68K, `li r3,seg_id; sc; blr` on PPC) into a jump-table slot.
    /// `entry_idx` is not encoded in the stub bytes — the `_LoadSeg` trap
    /// handler recovers it from the slot address it was called through.
    fn make_lazy_jt_stub(
        &self,
        mem: &mut dyn AddressSpace,
        slot_addr: u32,
        seg_id: i16,
        entry_idx: u8,
    ) -> Result<(), OSErr>;

    /// Applies a relocation table produced by the CODE parser's heuristic
    /// scan to a mapped segment's bytes.
    fn relocate(
        &self,
        mem: &mut dyn AddressSpace,
        table: &RelocTable,
        seg_base: u32,
        jt_base: u32,
        a5_base: u32,
    ) -> Result<(), OSErr>;

    /// Inspects a jump-table slot's bytes and reports whether it's already
    /// resolved to a direct jump, still the lazy stub, or neither.
    fn classify_jt_slot(&self, mem: &dyn AddressSpace, slot_addr: u32) -> Result<JtSlotState, OSErr>;

    /// Advances any host-driven free-running counter this backend exposes
    /// (PPC's `TBL`/`TBU` time base). 68K has no such register, so the
    /// default is a no-op; callers that step the CPU in a loop (like
    /// `SegmentLoaderContext::run`) call this once per instruction so the
    /// counter stays monotonic without the loop needing to know which ISA
    /// it's driving.
    fn advance_time_base(&mut self, _ticks: u64) {}

    /// Runs [`Self::step`] in a loop until `should_stop` returns `true` or
    /// an error is hit. `should_stop` is checked before each instruction so
    /// callers can implement single-stepping, breakpoints, or instruction
    /// budgets without the backend knowing about any of them.
    fn run(
        &mut self,
        mem: &mut dyn AddressSpace,
        traps: &mut TrapTable,
        mut should_stop: impl FnMut(&Self) -> bool,
    ) -> Result<(), OSErr>
    where
        Self: Sized,
    {
        while !should_stop(self) {
            self.step(mem, traps)?;
        }
        Ok(())
    }
}

/// Constructs a fresh, zeroed backend instance. Kept separate from
/// `CpuBackend` itself (rather than a `new()` associated function) so the
/// registry can store one factory per backend name without the trait
/// needing to be object-safe with a `Self`-returning constructor.
pub type CpuBackendFactory = fn() -> Box<dyn CpuBackend>;
