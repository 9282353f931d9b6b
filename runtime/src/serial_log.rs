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

//! The "serial port" log sink of `spec.md` §6, wired up as a [`log::Log`]
//! implementation so every `log::info!`/`debug!` call site elsewhere in the
//! workspace needs no special API — the same indirection the teacher uses
//! to route its own log interface behind the `log` facade callers expect.

use log::{Level, Log, Metadata, Record};

pub struct SerialLogger {
    enable_colors: bool,
}

impl SerialLogger {
    pub fn new() -> Self {
        SerialLogger { enable_colors: atty::is(atty::Stream::Stderr) }
    }

    /// Installs this logger as the global `log` backend at `filter`.
    pub fn install(filter: log::LevelFilter) {
        log::set_max_level(filter);
        log::set_boxed_logger(Box::new(SerialLogger::new()))
            .expect("serial logger installed more than once");
    }
}

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERR ",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBG",
            Level::Trace => "TRCE",
        };
        let mut style = ansi_term::Style::default();
        if self.enable_colors {
            style.is_dimmed = true;
        }
        eprintln!(
            "{}[{}]{} {}",
            style.prefix(),
            tag,
            style.suffix(),
            record.args()
        );
    }

    fn flush(&self) {}
}
