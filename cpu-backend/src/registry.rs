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

use crate::backend::{CpuBackend, CpuBackendFactory};
use crate::OSErr;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;

struct Registry {
    factories: HashMap<&'static str, CpuBackendFactory>,
    default: Option<&'static str>,
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry {
        factories: HashMap::new(),
        default: None,
    });
}

/// Registers a backend factory under `name`. The first backend registered
/// in a process becomes the default returned by [`cpu_backend_get_default`];
/// `m68k-interp` and `ppc-interp` each call this from a `ctor`-free
/// `register()` function invoked by `runtime`'s startup code, rather than
/// relying on link-time registration tricks.
pub fn cpu_backend_register(name: &'static str, factory: CpuBackendFactory) {
    let mut reg = REGISTRY.lock().unwrap();
    if reg.default.is_none() {
        reg.default = Some(name);
    }
    reg.factories.insert(name, factory);
}

pub fn cpu_backend_get(name: &str) -> Result<Box<dyn CpuBackend>, OSErr> {
    let reg = REGISTRY.lock().unwrap();
    let factory = reg.factories.get(name).ok_or(OSErr::NotFound)?;
    Ok(factory())
}

pub fn cpu_backend_get_default() -> Result<Box<dyn CpuBackend>, OSErr> {
    let reg = REGISTRY.lock().unwrap();
    let name = reg.default.ok_or(OSErr::NotFound)?;
    let factory = reg.factories.get(name).ok_or(OSErr::NotFound)?;
    Ok(factory())
}
