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

//! Wires the interpreters, segment loader, and low-memory globals together
//! into a runnable boot sequence, the way `kernel/cli`'s `main.rs` wires
//! `redshirt-core` and the hosted native programs together.

mod cli;
mod error;
mod resource_file;
mod serial_log;

use cli::CliOptions;
use error::RuntimeError;
use mac7_segment_loader::SegmentLoaderContext;
use resource_file::FlatResourceFile;
use structopt::StructOpt;

fn register_backends() {
    mac7_m68k_interp::register();
    mac7_ppc_interp::register();
}

fn run(opts: CliOptions) -> Result<(), RuntimeError> {
    register_backends();

    let resources = FlatResourceFile::load(&opts.boot_file)?;
    let mut ctx = SegmentLoaderContext::initialize(&opts.backend, Box::new(resources))?;

    ctx.install_load_seg_trap()?;
    ctx.ensure_entry_segments_loaded()?;
    log::info!(
        "boot complete on {}, entry segment at {:#010x}",
        opts.backend,
        ctx.get_segment_entry_point(1)?
    );

    let executed = ctx.run(opts.instruction_budget)?;
    log::info!("ran {} instructions in {:?}", executed, ctx.uptime());

    ctx.cleanup();
    Ok(())
}

fn main() {
    let opts = CliOptions::from_args();
    serial_log::SerialLogger::install(opts.log_level);

    if let Err(err) = run(opts) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
