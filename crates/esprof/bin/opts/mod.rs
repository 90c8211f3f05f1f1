mod instrument;

pub use instrument::InstrumentOpts;
