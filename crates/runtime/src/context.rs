use esprof_instrument::{instrument_program, InstrumentConfig};
use esprof_syntax::{parse, ParseOptions, Program};

use crate::{
    consumer::Consumer,
    error::Result,
    hooks,
    interpreter::{Interpreter, Printer},
    registry::{EventBus, Listener},
    value::Value,
};

/// Everything one execution of an instrumented program needs: an interpreter with the hook
/// library installed and the bus the hooks dispatch to.
///
/// Nothing is shared between runtimes. A fresh runtime has no listeners, and consumers
/// attached to it start with empty statistics of their own.
pub struct Runtime {
    interpreter: Interpreter,
    bus: EventBus,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        let mut interpreter = Interpreter::new();
        let bus = EventBus::new();
        hooks::install(&mut interpreter, &bus);
        Self { interpreter, bus }
    }

    /// Set where script output goes. If not set, it goes to stdout.
    pub fn set_printer(&mut self, printer: Printer) {
        self.interpreter.set_printer(printer);
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, target: &str, listener: Listener) -> Result<()> {
        self.bus.subscribe(target, listener)
    }

    pub fn attach(&mut self, consumer: &dyn Consumer) -> Result<()> {
        consumer.attach(&self.bus, &mut self.interpreter)
    }

    /// Run source text as is. It is expected to be instrumented already.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        self.interpreter.run_source(source)
    }

    pub fn run(&mut self, program: &Program) -> Result<Value> {
        self.interpreter.run(program)
    }

    /// Parse `source`, instrument it with `config` and run the result.
    pub fn eval_instrumented(&mut self, source: &str, config: &InstrumentConfig) -> Result<Value> {
        let program = parse(source, &ParseOptions::default())?;
        let program = instrument_program(program, config);
        self.interpreter.run(&program)
    }

    pub fn global(&self, name: &str) -> Value {
        self.interpreter.global(name)
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{consumer::EventCounter, event::EventKind};

    #[test]
    fn test_runtimes_are_independent() {
        let mut first = Runtime::new();
        let counter = EventCounter::new();
        first.attach(&counter).unwrap();
        first.eval_instrumented("var a = [];", &InstrumentConfig::default()).unwrap();
        assert_eq!(counter.count(EventKind::Alloc), 1);

        let mut second = Runtime::new();
        second.eval_instrumented("var a = [];", &InstrumentConfig::default()).unwrap();
        assert_eq!(counter.count(EventKind::Alloc), 1);
        assert_eq!(second.bus().listener_count(EventKind::Alloc), 0);
        assert_eq!(second.global("a").to_string(), "");
    }

    #[test]
    fn test_hooks_are_hidden_globals() {
        let mut runtime = Runtime::new();
        let result = runtime
            .eval("var names = []; for (var k in this) names.push(k); names.join()")
            .unwrap();
        assert_eq!(result, Value::from("names,k"));
        assert!(runtime.global("esprof$onPropRead").is_callable());
    }
}
