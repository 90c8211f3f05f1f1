//! # esprof-runtime
//!
//! Runs instrumented scripts. The hook library turns every hook call into an [`Event`] on an
//! [`EventBus`], and consumers such as the [`Profiler`], the [`Tracer`] and the
//! [`EventCounter`] subscribe to it. A [`Runtime`] bundles one interpreter with one bus.

#[macro_use]
extern crate tracing;

pub mod clock;
pub mod consumer;
mod context;
mod error;
pub mod event;
pub mod hooks;
pub mod interpreter;
pub mod registry;
pub mod value;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use consumer::{
    Consumer, EventCounter, ProfileReport, Profiler, ProfilerConfig, SortKey, Tracer,
};
pub use context::Runtime;
pub use error::{Result, RuntimeError};
pub use event::{Event, EventKind};
pub use interpreter::Interpreter;
pub use registry::{EventBus, Listener};
pub use value::Value;
