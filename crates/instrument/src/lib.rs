//! # esprof-instrument
//!
//! Source-to-source instrumentation. A program is parsed, walked once, and every allocation,
//! property access, call and function boundary is rewritten into a call to one of the
//! `esprof$on*` hooks listed in [`hooks`]. The rewritten program behaves like the original as
//! long as the hooks forward to the default behavior.

#[macro_use]
extern crate tracing;

mod config;
mod engine;
mod error;
pub mod hooks;
mod roles;
mod scope;
pub mod visitor;

pub use config::{Category, InstrumentConfig};
pub use engine::{instrument_estree, instrument_program, instrument_source};
pub use error::InstrumentError;
