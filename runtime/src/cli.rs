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

use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "mac7-runtime", about = "Boots a System 7.1-compatible CODE resource file.")]
pub struct CliOptions {
    /// Resource file to boot, as a flat sequence of (id, length, bytes)
    /// CODE records — see `resource_file::FlatResourceFile`.
    #[structopt(parse(from_os_str))]
    pub boot_file: PathBuf,

    /// CPU backend to drive the boot with.
    #[structopt(long, default_value = "m68k_interp")]
    pub backend: String,

    /// Stops the run after this many instructions instead of running until
    /// the interpreter faults or hits an unimplemented opcode.
    #[structopt(long)]
    pub instruction_budget: Option<u64>,

    /// Minimum log level printed to the serial sink.
    #[structopt(long, default_value = "info")]
    pub log_level: log::LevelFilter,
}
