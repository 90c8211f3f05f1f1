use std::{collections::BTreeMap, path::PathBuf};

use clap::{Parser, ValueEnum};
use esprof_instrument::instrument_source;
use esprof_runtime::{
    Consumer, EventCounter, EventKind, ProfileReport, Profiler, ProfilerConfig, Runtime, SortKey, Tracer,
};
use eyre::{eyre, Result, WrapErr};
use serde::Serialize;
use yansi::Paint;

use super::read_script;
use crate::opts::InstrumentOpts;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Most invoked functions first.
    #[default]
    Count,
    /// Functions with the most self time first.
    #[value(name = "self")]
    SelfTime,
}

impl From<SortArg> for SortKey {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Count => Self::Count,
            SortArg::SelfTime => Self::SelfTime,
        }
    }
}

/// CLI arguments for `esprof run`.
#[derive(Clone, Debug, Parser)]
pub struct RunArgs {
    /// The script to run.
    #[clap(value_name = "FILE")]
    file: PathBuf,

    /// Print a profile of function timings when the script finishes.
    #[clap(long)]
    pub profile: bool,

    /// Print every function entry as it happens, indented by call depth.
    #[clap(long)]
    pub trace: bool,

    /// Print how many events of each kind fired.
    #[clap(long)]
    pub count: bool,

    /// Hide profile rows whose share of self time is below this ratio.
    #[clap(long, value_name = "RATIO", default_value_t = 0.0)]
    cutoff: f64,

    /// Order of the profile rows.
    #[clap(long, value_enum, default_value_t = SortArg::Count)]
    sort: SortArg,

    /// Print the profile and event counts as JSON.
    #[clap(long)]
    json: bool,

    /// Maximum depth of nested calls before the script fails with a RangeError.
    #[clap(long, value_name = "DEPTH")]
    max_call_depth: Option<usize>,

    #[command(flatten)]
    instrument: InstrumentOpts,
}

#[derive(Debug, Serialize)]
struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<ProfileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<BTreeMap<EventKind, u64>>,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = self.instrument.config(&self.file);
        let source = read_script(&self.file)?;
        let instrumented = instrument_source(&source, &config)
            .wrap_err_with(|| format!("failed to instrument {}", self.file.display()))?;

        let mut runtime = Runtime::new();
        if let Some(depth) = self.max_call_depth {
            runtime.interpreter_mut().set_max_call_depth(depth);
        }
        let profiler = self.profile.then(|| {
            let config = ProfilerConfig::default().with_cutoff(self.cutoff).with_sort(self.sort.into());
            Profiler::new(config)
        });
        let counter = self.count.then(EventCounter::new);
        let tracer = self.trace.then(Tracer::new);
        let consumers = [
            profiler.as_ref().map(|p| p as &dyn Consumer),
            tracer.as_ref().map(|t| t as &dyn Consumer),
            counter.as_ref().map(|c| c as &dyn Consumer),
        ];
        for consumer in consumers.into_iter().flatten() {
            runtime.attach(consumer).map_err(|err| eyre!("failed to attach consumer: {err}"))?;
        }

        debug!(file = %self.file.display(), "running script");
        let outcome = runtime
            .eval(&instrumented)
            .map(drop)
            .map_err(|err| eyre!("{err}").wrap_err(format!("failed to run {}", self.file.display())));

        let summary = Summary {
            profile: profiler.map(|profiler| profiler.report()),
            events: counter.as_ref().map(EventCounter::snapshot),
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            if let Some(report) = &summary.profile {
                println!("{report}");
            }
            if let Some(counter) = &counter {
                println!("\n{}", "Events".bold());
                println!("{counter}");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn script(source: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.js");
        fs::write(&path, source).unwrap();
        let path = path.to_str().unwrap().to_string();
        (dir, path)
    }

    #[test]
    fn test_run_with_consumers() {
        let (_dir, path) = script("function f(n) { return n < 2 ? n : f(n - 1) + f(n - 2); } f(10);");
        RunArgs::parse_from(["run", path.as_str(), "--profile", "--trace", "--count"])
            .run()
            .unwrap();
        RunArgs::parse_from(["run", path.as_str(), "--profile", "--count", "--json"])
            .run()
            .unwrap();
    }

    #[test]
    fn test_script_failure_is_reported() {
        let (_dir, path) = script("var o = null; o.p = 1;");
        let err = RunArgs::parse_from(["run", path.as_str(), "--count"]).run().unwrap_err();
        assert!(err.to_string().starts_with("failed to run"));
        assert!(format!("{err:?}").contains("Cannot set property 'p' of null"));
    }

    #[test]
    fn test_call_depth_limit() {
        let (_dir, path) = script("function f() { f(); } f();");
        let err = RunArgs::parse_from(["run", path.as_str(), "--max-call-depth", "50"])
            .run()
            .unwrap_err();
        assert!(format!("{err:?}").contains("Maximum call stack size exceeded"));
    }
}
