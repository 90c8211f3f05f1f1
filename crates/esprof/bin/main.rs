#[macro_use]
extern crate tracing;

mod args;
mod cmd;
mod opts;
mod utils;

use args::{EsprofArgs, EsprofSubcommand};
use clap::Parser;
use eyre::Result;

fn main() -> Result<()> {
    utils::install_error_handler();
    utils::subscriber();
    utils::enable_paint();

    let opts = EsprofArgs::parse();

    match opts.cmd {
        EsprofSubcommand::Instrument(cmd) => cmd.run(),
        EsprofSubcommand::Run(cmd) => utils::with_large_stack(move || cmd.run()),
    }
}
