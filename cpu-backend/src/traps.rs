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
use crate::registers::Registers;
use crate::OSErr;

pub const TRAP_TABLE_SIZE: usize = 256;

/// Everything a trap handler needs to inspect or mutate: the saved PC (so it
/// can be advanced or left alone to retry), the register file, and the
/// guest address space — `_LoadSeg` needs the last one to read the
/// segment ID a 68K caller pushed onto the stack before trapping.
///
/// The classic `CPUTrapHandler` signature threaded a `void *ctx` through
/// every call so C handlers could recover their own state. Rust closures
/// already close over whatever they need, so that parameter is dropped here
/// — a handler that wants shared mutable state captures an `Rc<RefCell<_>>`
/// or similar instead of receiving an opaque pointer.
pub struct TrapContext<'a> {
    pub pc: &'a mut u32,
    pub regs: &'a mut dyn Registers,
    pub mem: &'a mut dyn AddressSpace,
}

pub type TrapHandler = Box<dyn FnMut(TrapContext) -> Result<(), OSErr> + Send>;

/// Dispatch table for trap/syscall numbers (`_LoadSeg`, `_Gestalt`, and
/// friends on 68K; the `sc` immediate on PPC). Indices above
/// [`TRAP_TABLE_SIZE`] are rejected at registration time.
pub struct TrapTable {
    slots: Vec<Option<TrapHandler>>,
}

impl TrapTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(TRAP_TABLE_SIZE);
        slots.resize_with(TRAP_TABLE_SIZE, || None);
        TrapTable { slots }
    }

    pub fn register(&mut self, index: u16, handler: TrapHandler) -> Result<(), OSErr> {
        let slot = self.slots.get_mut(index as usize).ok_or(OSErr::TrapError)?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn unregister(&mut self, index: u16) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = None;
        }
    }

    pub fn is_registered(&self, index: u16) -> bool {
        self.slots
            .get(index as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn dispatch(&mut self, index: u16, ctx: TrapContext) -> Result<(), OSErr> {
        let slot = self.slots.get_mut(index as usize).ok_or(OSErr::TrapError)?;
        match slot {
            Some(handler) => handler(ctx),
            None => Err(OSErr::TrapError),
        }
    }
}

impl Default for TrapTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMem;
    impl AddressSpace for FakeMem {
        fn read_u8(&self, _a: u32) -> Result<u8, OSErr> {
            Err(OSErr::AddressError)
        }
        fn read_u16(&self, _a: u32) -> Result<u16, OSErr> {
            Err(OSErr::AddressError)
        }
        fn read_u32(&self, _a: u32) -> Result<u32, OSErr> {
            Err(OSErr::AddressError)
        }
        fn write_u8(&mut self, _a: u32, _v: u8) -> Result<(), OSErr> {
            Err(OSErr::AddressError)
        }
        fn write_u16(&mut self, _a: u32, _v: u16) -> Result<(), OSErr> {
            Err(OSErr::AddressError)
        }
        fn write_u32(&mut self, _a: u32, _v: u32) -> Result<(), OSErr> {
            Err(OSErr::AddressError)
        }
        fn read_bytes(&self, _a: u32, _buf: &mut [u8]) -> Result<(), OSErr> {
            Err(OSErr::AddressError)
        }
        fn write_bytes(&mut self, _a: u32, _data: &[u8]) -> Result<(), OSErr> {
            Err(OSErr::AddressError)
        }
        fn ensure_mapped(&mut self, _a: u32, _l: u32, _f: crate::address_space::MapFlags) -> Result<(), OSErr> {
            Ok(())
        }
        fn max_guest(&self) -> u32 {
            0
        }
    }

    struct FakeRegs(u32);
    impl Registers for FakeRegs {
        fn get(&self, name: &str) -> Result<u32, OSErr> {
            if name == "d0" {
                Ok(self.0)
            } else {
                Err(OSErr::ParamErr)
            }
        }
        fn set(&mut self, name: &str, value: u32) -> Result<(), OSErr> {
            if name == "d0" {
                self.0 = value;
                Ok(())
            } else {
                Err(OSErr::ParamErr)
            }
        }
        fn return_reg(&self) -> &'static str {
            "d0"
        }
    }

    #[test]
    fn unregistered_slot_errors() {
        let mut table = TrapTable::new();
        let mut regs = FakeRegs(0);
        let mut pc = 0u32;
        let mut mem = FakeMem;
        let ctx = TrapContext { pc: &mut pc, regs: &mut regs, mem: &mut mem };
        assert!(table.dispatch(0xA9F0, ctx).is_err());
    }

    #[test]
    fn registered_handler_runs_and_can_mutate_regs() {
        let mut table = TrapTable::new();
        table
            .register(
                0xA9F0,
                Box::new(|ctx: TrapContext| {
                    ctx.regs.set("d0", 42)?;
                    *ctx.pc += 2;
                    Ok(())
                }),
            )
            .unwrap();
        let mut regs = FakeRegs(0);
        let mut pc = 100u32;
        let mut mem = FakeMem;
        let ctx = TrapContext { pc: &mut pc, regs: &mut regs, mem: &mut mem };
        table.dispatch(0xA9F0, ctx).unwrap();
        assert_eq!(regs.0, 42);
        assert_eq!(pc, 102);
    }

    #[test]
    fn register_out_of_range_index_errors() {
        let mut table = TrapTable::new();
        assert!(table.register(u16::MAX, Box::new(|_| Ok(()))).is_err());
        assert_eq!(table.slots.len(), TRAP_TABLE_SIZE);
    }
}
