//! Call-stack profiler.
//!
//! Every `methodEntry` pushes a [`TimerFrame`]; every `methodExit` pops it and charges the
//! elapsed time to the function's [`ProfileEntry`]. A call whose identifier is still on the
//! stack below it is recursive: it only bumps the invocation count, so time spent in nested
//! recursive calls is charged once, to the outermost invocation.
//!
//! Exceptions can skip the exit hook of the functions they unwind through. Those frames are
//! reconciled on the next exit that does match: everything above the matching frame is
//! popped as if it exited at that moment.

use std::{cell::RefCell, fmt, rc::Rc};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::Consumer;
use crate::{
    clock::{Clock, MonotonicClock},
    error::Result,
    event::{Event, EventKind},
    interpreter::Interpreter,
    registry::EventBus,
    value::Value,
};

/// Identifier of the root frame, which stands for the script's own top-level code.
pub const TOPLEVEL: &str = "<toplevel>";

/// Name under which functions created with `new` on a callable are profiled.
pub const CONSTRUCTED_FUNCTION: &str = "Function";

/// Global function a script can call to print the profile collected so far.
pub const DUMP_PROFILE: &str = "esprof$dumpProfile";

const RULE: &str =
    "--------------------------------------------------------------------------------";

const MIN_COUNT_WIDTH: usize = "[count]".len();

/// Row order of a [`ProfileReport`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum SortKey {
    /// Most invoked first.
    #[default]
    Count,
    /// Most self time first.
    SelfTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfilerConfig {
    /// Rows whose share of self time falls below this ratio are left out of reports, along
    /// with every row after them.
    pub cutoff: f64,
    pub sort: SortKey,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self { cutoff: 0.0, sort: SortKey::Count }
    }
}

impl ProfilerConfig {
    /// Set the self-time cutoff. If not set, every row is shown.
    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Set the row order. If not set, rows are ordered by invocation count.
    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }
}

/// An active invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct TimerFrame {
    pub id: String,
    pub start_ms: f64,
    /// Time spent in callees that already returned.
    pub children_ms: f64,
}

impl TimerFrame {
    fn new(id: String, start_ms: f64) -> Self {
        Self { id, start_ms, children_ms: 0.0 }
    }
}

/// Accumulated statistics of one function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEntry {
    pub count: u64,
    pub cumulative_ms: f64,
    pub self_ms: f64,
}

struct ProfileState {
    /// Never empty: the first frame is the root.
    frames: Vec<TimerFrame>,
    /// Entries in creation order, which breaks ties when sorting.
    entries: Vec<(String, ProfileEntry)>,
    index: FxHashMap<String, usize>,
}

impl ProfileState {
    fn new(now: f64) -> Self {
        let mut state = Self {
            frames: vec![TimerFrame::new(TOPLEVEL.to_string(), now)],
            entries: Vec::new(),
            index: FxHashMap::default(),
        };
        state.entry_mut(TOPLEVEL).count = 1;
        state
    }

    fn entry_mut(&mut self, id: &str) -> &mut ProfileEntry {
        let position = match self.index.get(id) {
            Some(&position) => position,
            None => {
                self.entries.push((id.to_string(), ProfileEntry::default()));
                self.index.insert(id.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    /// Pop the top frame and charge it as exiting at `now`.
    fn pop(&mut self, now: f64) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let elapsed = now - frame.start_ms;
        let recursive = self.frames.iter().any(|outer| outer.id == frame.id);
        let entry = self.entry_mut(&frame.id);
        entry.count += 1;
        if !recursive {
            entry.cumulative_ms += elapsed;
            entry.self_ms += elapsed - frame.children_ms;
        }
        if let Some(caller) = self.frames.last_mut() {
            caller.children_ms += elapsed;
        }
    }
}

/// Collects timing statistics from `methodEntry` and `methodExit` events.
///
/// Clones share the same statistics.
#[derive(Clone)]
pub struct Profiler {
    config: ProfilerConfig,
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<ProfileState>>,
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Profiler")
            .field("config", &self.config)
            .field("depth", &state.frames.len())
            .field("entries", &state.entries.len())
            .finish()
    }
}

impl Profiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_clock(config, Rc::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: ProfilerConfig, clock: Rc<dyn Clock>) -> Self {
        let state = ProfileState::new(clock.now_ms());
        Self { config, clock, state: Rc::new(RefCell::new(state)) }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn enter(&self, name: &str, location: &str) {
        let frame = TimerFrame::new(format!("{name} {location}"), self.clock.now_ms());
        self.state.borrow_mut().frames.push(frame);
    }

    pub fn exit(&self, name: &str, location: &str) {
        let id = format!("{name} {location}");
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        let Some(position) =
            state.frames.iter().rposition(|frame| frame.id == id).filter(|&position| position > 0)
        else {
            warn!(%id, "exit without a matching entry, ignoring");
            return;
        };
        let stale = state.frames.len() - position - 1;
        if stale > 0 {
            debug!(%id, stale, "closing frames skipped by an exception");
        }
        while state.frames.len() > position {
            state.pop(now);
        }
    }

    /// Number of active frames, including the root.
    pub fn depth(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn entry(&self, id: &str) -> Option<ProfileEntry> {
        let state = self.state.borrow();
        state.index.get(id).map(|&position| state.entries[position].1)
    }

    /// Close the root's current interval and summarize everything collected so far.
    ///
    /// The root interval restarts afterwards, so a second report right after the first
    /// covers an interval of about zero instead of repeating the first one.
    pub fn report(&self) -> ProfileReport {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        let (interval_ms, children_ms) = match state.frames.first_mut() {
            Some(root) => {
                let interval = (now - root.start_ms, root.children_ms);
                root.start_ms = now;
                root.children_ms = 0.0;
                interval
            }
            None => (0.0, 0.0),
        };
        let root = state.entry_mut(TOPLEVEL);
        root.cumulative_ms += interval_ms;
        root.self_ms += interval_ms - children_ms;
        let total_ms = root.cumulative_ms;

        let entries = state
            .entries
            .iter()
            .sorted_by(|(_, a), (_, b)| match self.config.sort {
                SortKey::Count => b.count.cmp(&a.count),
                SortKey::SelfTime => b.self_ms.total_cmp(&a.self_ms),
            })
            .collect::<Vec<_>>();
        let max_count = entries.iter().map(|(_, entry)| entry.count).max().unwrap_or_default();

        let mut rows = Vec::with_capacity(entries.len());
        let mut elided = 0;
        for (i, (id, entry)) in entries.iter().enumerate() {
            let self_ratio = entry.self_ms / total_ms;
            if self_ratio < self.config.cutoff {
                elided = entries.len() - i;
                break;
            }
            rows.push(ProfileRow {
                id: id.clone(),
                count: entry.count,
                self_ms: entry.self_ms,
                cumulative_ms: entry.cumulative_ms,
                self_ratio,
                cumulative_ratio: entry.cumulative_ms / total_ms,
            });
        }
        trace!(rows = rows.len(), elided, interval_ms, "profile report");

        ProfileReport {
            interval_ms,
            total_ms,
            rows,
            elided,
            count_width: max_count.to_string().len().max(MIN_COUNT_WIDTH),
        }
    }

    /// Replacement for a callable created with `new`: it reports its own calls, because code
    /// built at runtime carries no entry and exit hooks of its own.
    fn wrap_constructed(&self, interpreter: &Interpreter, target: Value, location: String) -> Value {
        let profiler = self.clone();
        interpreter
            .native_function(CONSTRUCTED_FUNCTION, move |interpreter, this, args| {
                profiler.enter(CONSTRUCTED_FUNCTION, &location);
                let result = interpreter.call_function(&target, this, args);
                profiler.exit(CONSTRUCTED_FUNCTION, &location);
                result
            })
            .into()
    }
}

impl Consumer for Profiler {
    fn attach(&self, bus: &EventBus, interpreter: &mut Interpreter) -> Result<()> {
        let profiler = self.clone();
        bus.on(
            EventKind::MethodEntry,
            Rc::new(move |_: &mut Interpreter, event: &Event| {
                if let Event::MethodEntry { name, location, .. } = event {
                    profiler.enter(name, location);
                }
                Ok(None)
            }),
        );
        let profiler = self.clone();
        bus.on(
            EventKind::MethodExit,
            Rc::new(move |_: &mut Interpreter, event: &Event| {
                if let Event::MethodExit { name, location, .. } = event {
                    profiler.exit(name, location);
                }
                Ok(None)
            }),
        );
        let profiler = self.clone();
        bus.on(
            EventKind::Alloc,
            Rc::new(move |interpreter: &mut Interpreter, event: &Event| match event {
                Event::Alloc { object, tag, location } if tag == "new" && object.is_callable() => {
                    Ok(Some(profiler.wrap_constructed(interpreter, object.clone(), location.clone())))
                }
                _ => Ok(None),
            }),
        );

        let profiler = self.clone();
        interpreter.define_global_function(DUMP_PROFILE, move |interpreter, _, _| {
            for line in profiler.report().to_string().lines() {
                interpreter.print_line(line);
            }
            Ok(Value::Undefined)
        });
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRow {
    pub id: String,
    pub count: u64,
    pub self_ms: f64,
    pub cumulative_ms: f64,
    /// Share of the root's cumulative time spent in this function itself.
    pub self_ratio: f64,
    pub cumulative_ratio: f64,
}

/// A rendered profile. Its `Display` form is the classic text table.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    /// Root time closed by this report.
    pub interval_ms: f64,
    /// Root time across all reports so far.
    pub total_ms: f64,
    pub rows: Vec<ProfileRow>,
    /// Rows left out because of the cutoff.
    pub elided: usize,
    #[serde(skip)]
    count_width: usize,
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", 100.0 * ratio)
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.count_width;
        writeln!(f, "\n\nProfile")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "{:>width$}   [self]   [cumul]   [function]", "[count]")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>width$}   {:>6}   {:>6}   {}",
                row.count,
                percent(row.self_ratio),
                percent(row.cumulative_ratio),
                row.id
            )?;
        }
        if self.elided > 0 {
            writeln!(f, "+ {} more (not shown)", self.elided)?;
        }
        write!(f, "{RULE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const F: &str = "a.js@1.0-3.1";
    const G: &str = "a.js@4.0-6.1";

    fn profiler(config: ProfilerConfig) -> (Profiler, ManualClock) {
        let clock = ManualClock::new();
        (Profiler::with_clock(config, Rc::new(clock.clone())), clock)
    }

    /// Root runs 100ms: `f` calls `g` once, then `g` runs again on its own.
    fn sample(config: ProfilerConfig) -> (Profiler, ManualClock) {
        let (profiler, clock) = self::profiler(config);
        profiler.enter("f", F);
        clock.advance(10.0);
        profiler.enter("g", G);
        clock.advance(30.0);
        profiler.exit("g", G);
        clock.advance(10.0);
        profiler.exit("f", F);
        profiler.enter("g", G);
        clock.advance(20.0);
        profiler.exit("g", G);
        clock.advance(30.0);
        (profiler, clock)
    }

    #[test]
    fn test_self_and_cumulative_time() {
        let (profiler, _) = sample(ProfilerConfig::default());
        assert_eq!(
            profiler.entry(&format!("f {F}")),
            Some(ProfileEntry { count: 1, cumulative_ms: 50.0, self_ms: 20.0 })
        );
        assert_eq!(
            profiler.entry(&format!("g {G}")),
            Some(ProfileEntry { count: 2, cumulative_ms: 50.0, self_ms: 50.0 })
        );
        assert_eq!(profiler.depth(), 1);
    }

    #[test]
    fn test_report_text() {
        let (profiler, _) = sample(ProfilerConfig::default());
        let report = profiler.report();
        assert_eq!(report.interval_ms, 100.0);
        let expected = [
            "",
            "",
            "Profile",
            RULE,
            "[count]   [self]   [cumul]   [function]",
            "      2    50.0%    50.0%   g a.js@4.0-6.1",
            "      1    30.0%   100.0%   <toplevel>",
            "      1    20.0%    50.0%   f a.js@1.0-3.1",
            RULE,
        ]
        .join("\n");
        assert_eq!(report.to_string(), expected);
    }

    #[test]
    fn test_report_json() {
        let (profiler, _) = sample(ProfilerConfig::default());
        let json = serde_json::to_value(profiler.report()).unwrap();
        assert_eq!(json["intervalMs"], 100.0);
        assert_eq!(json["elided"], 0);
        assert_eq!(json["rows"][0]["id"], "g a.js@4.0-6.1");
        assert_eq!(json["rows"][0]["selfMs"], 50.0);
        assert_eq!(json["rows"][0]["selfRatio"], 0.5);
        assert!(json.get("countWidth").is_none());
    }

    #[test]
    fn test_cutoff_and_sort() {
        let config = ProfilerConfig::default().with_cutoff(0.25).with_sort(SortKey::SelfTime);
        let (profiler, _) = sample(config);
        let report = profiler.report();
        let ids: Vec<_> = report.rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["g a.js@4.0-6.1", "<toplevel>"]);
        assert_eq!(report.elided, 1);
        assert!(report.to_string().contains("\n+ 1 more (not shown)\n"));
    }

    #[test]
    fn test_repeated_report_does_not_double_count() {
        let (profiler, clock) = sample(ProfilerConfig::default());
        let first = profiler.report();
        let second = profiler.report();
        assert_eq!(first.interval_ms, 100.0);
        assert_eq!(second.interval_ms, 0.0);
        assert_eq!(second.total_ms, 100.0);

        clock.advance(5.0);
        let third = profiler.report();
        assert_eq!(third.interval_ms, 5.0);
        assert_eq!(profiler.entry(TOPLEVEL).map(|e| e.self_ms), Some(35.0));
    }

    #[test]
    fn test_recursion_is_timed_once() {
        let (profiler, clock) = profiler(ProfilerConfig::default());
        for _ in 0..4 {
            profiler.enter("fact", F);
            clock.advance(1.0);
        }
        for _ in 0..4 {
            profiler.exit("fact", F);
            clock.advance(1.0);
        }
        assert_eq!(
            profiler.entry(&format!("fact {F}")),
            Some(ProfileEntry { count: 4, cumulative_ms: 7.0, self_ms: 2.0 })
        );
    }

    #[test]
    fn test_skipped_exits_are_closed_by_the_caller() {
        let (profiler, clock) = profiler(ProfilerConfig::default());
        profiler.enter("f", F);
        profiler.enter("g", G);
        profiler.enter("h", G);
        clock.advance(4.0);
        profiler.exit("f", F);

        assert_eq!(profiler.depth(), 1);
        for id in ["h", "g", "f"] {
            let location = if id == "f" { F } else { G };
            let entry = profiler.entry(&format!("{id} {location}")).unwrap();
            assert_eq!((entry.count, entry.cumulative_ms), (1, 4.0));
        }
    }

    #[test]
    fn test_unmatched_exit_is_ignored() {
        let (profiler, _) = profiler(ProfilerConfig::default());
        profiler.enter("f", F);
        profiler.exit("g", G);
        profiler.exit(TOPLEVEL, "");
        assert_eq!(profiler.depth(), 2);
        assert_eq!(profiler.entry(&format!("g {G}")), None);
    }

    #[test]
    fn test_empty_report_is_nan() {
        let (profiler, _) = profiler(ProfilerConfig::default());
        let report = profiler.report();
        assert_eq!(report.rows.len(), 1);
        assert!(report.to_string().contains("      1     NaN%     NaN%   <toplevel>"));
    }
}
