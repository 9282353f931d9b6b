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

use crate::globals::{lm_get_u32, lm_set_u32, Global};
use mac7_cpu_backend::AddressSpace;
use std::time::Instant;

pub const TICK_HZ: u64 = 60;

/// Abstracts "a monotonic tick source" so `os_utils_increment_ticks` can be
/// driven by the real clock in `runtime` and by a deterministic fake in
/// tests, without either caller touching `std::time` directly.
pub trait TickSource {
    /// Number of 1/60s ticks that have elapsed since the source started.
    fn elapsed_ticks(&mut self) -> u64;
}

pub struct SystemTickSource {
    start: Instant,
}

impl SystemTickSource {
    pub fn new() -> Self {
        SystemTickSource { start: Instant::now() }
    }
}

impl Default for SystemTickSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SystemTickSource {
    fn elapsed_ticks(&mut self) -> u64 {
        let elapsed = self.start.elapsed();
        elapsed.as_secs() * TICK_HZ + (elapsed.subsec_millis() as u64 * TICK_HZ) / 1000
    }
}

/// Deterministic test double: ticks only advance when [`ManualTickSource::advance`]
/// is called.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualTickSource {
    ticks: u64,
}

impl ManualTickSource {
    pub fn new() -> Self {
        ManualTickSource { ticks: 0 }
    }

    pub fn advance(&mut self, n: u64) {
        self.ticks += n;
    }
}

impl TickSource for ManualTickSource {
    fn elapsed_ticks(&mut self) -> u64 {
        self.ticks
    }
}

/// Last `Ticks` value a rate-limited log message was emitted for, so the
/// host timer callback doesn't flood the log at 60 Hz.
const LOG_EVERY_N_TICKS: u64 = 60;

/// Reads `Ticks` from low memory, increments it by the number of ticks the
/// source has advanced since last call, writes it back, and rate-limits a
/// trace log to roughly once a second.
pub fn os_utils_increment_ticks(mem: &mut dyn AddressSpace, source: &mut dyn TickSource, delta: u64) {
    let current = lm_get_u32(mem, Global::Ticks.addr());
    let next = current.wrapping_add(delta as u32);
    lm_set_u32(mem, Global::Ticks.addr(), next);
    let _ = source.elapsed_ticks();
    if next as u64 % LOG_EVERY_N_TICKS == 0 {
        log::trace!("Ticks = {}", next);
    }
}
