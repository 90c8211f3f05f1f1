use std::{fs, path::PathBuf};

use clap::Parser;
use esprof_instrument::{instrument_estree, instrument_source};
use eyre::{Result, WrapErr};

use super::read_script;
use crate::opts::InstrumentOpts;

/// CLI arguments for `esprof instrument`.
#[derive(Clone, Debug, Parser)]
pub struct InstrumentArgs {
    /// The script to instrument.
    #[clap(value_name = "FILE")]
    file: PathBuf,

    /// Write the result to this file instead of stdout.
    #[clap(long, short, value_name = "OUT")]
    output: Option<PathBuf>,

    /// Read and write ESTree JSON instead of source text.
    #[clap(long)]
    estree: bool,

    #[command(flatten)]
    instrument: InstrumentOpts,
}

impl InstrumentArgs {
    pub fn run(self) -> Result<()> {
        let Self { file, output, estree, instrument } = self;
        let config = instrument.config(&file);
        let input = read_script(&file)?;

        let instrumented = if estree {
            instrument_estree(&input, &config)
        } else {
            instrument_source(&input, &config)
        }
        .wrap_err_with(|| format!("failed to instrument {}", file.display()))?;
        debug!(file = %file.display(), bytes = instrumented.len(), "instrumented");

        match output {
            Some(output) => fs::write(&output, instrumented)
                .wrap_err_with(|| format!("failed to write {}", output.display()))?,
            None => print!("{instrumented}"),
        }
        Ok(())
    }
}
