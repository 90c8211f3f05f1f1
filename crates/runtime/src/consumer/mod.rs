//! Subscribers that turn the event stream into something useful.

use crate::{error::Result, interpreter::Interpreter, registry::EventBus};

mod counter;
mod profiler;
mod tracer;

pub use counter::EventCounter;
pub use profiler::{
    ProfileEntry, ProfileReport, ProfileRow, Profiler, ProfilerConfig, SortKey, TimerFrame,
    CONSTRUCTED_FUNCTION, DUMP_PROFILE, TOPLEVEL,
};
pub use tracer::Tracer;

/// Something that subscribes to the bus of a runtime.
pub trait Consumer {
    /// Register listeners on `bus`. Consumers that offer script-callable helpers install
    /// them into `interpreter`.
    fn attach(&self, bus: &EventBus, interpreter: &mut Interpreter) -> Result<()>;
}
