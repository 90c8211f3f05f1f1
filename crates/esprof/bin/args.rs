use crate::cmd::{instrument::InstrumentArgs, run::RunArgs};
use clap::{Parser, Subcommand};

/// esprof: observe every allocation, property access and call of a script.
#[derive(Parser, Debug)]
#[command(
    name = "esprof",
    version,
    after_help = "Set RUST_LOG to see what the instrumenter and runtime are doing.",
    next_display_order = None,
)]
pub struct EsprofArgs {
    #[command(subcommand)]
    pub cmd: EsprofSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum EsprofSubcommand {
    /// Print the instrumented form of a script.
    #[command(visible_alias = "i")]
    Instrument(InstrumentArgs),

    /// Instrument a script and run it with profiler, tracer or event counter attached.
    #[command(visible_alias = "r")]
    Run(RunArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        EsprofArgs::command().debug_assert();
    }

    #[test]
    fn parse_run_flags() {
        let args = EsprofArgs::parse_from([
            "esprof",
            "run",
            "app.js",
            "--profile",
            "--count",
            "--cutoff",
            "0.01",
            "--sort",
            "self",
            "--disable",
            "propRead",
        ]);
        let EsprofSubcommand::Run(run) = args.cmd else {
            panic!("expected the run subcommand");
        };
        assert!(run.profile && run.count && !run.trace);
    }
}
