//! Prints the call tree as it unfolds.

use std::{cell::RefCell, rc::Rc};

use super::Consumer;
use crate::{
    error::Result,
    event::{Event, EventKind},
    interpreter::Interpreter,
    registry::EventBus,
    value::Value,
};

/// Name under which functions created with `new` on a callable show up in traces.
const CONSTRUCTED_FUNCTION: &str = "<Function>";

/// Writes one line per function entry through the interpreter's printer, indented by call
/// depth:
///
/// ```text
/// |- main (a.js@1.0-9.1)
/// |--|- helper (a.js@3.4-5.5)
/// ```
#[derive(Clone, Debug, Default)]
pub struct Tracer {
    /// Ids of the functions currently active, innermost last.
    frames: Rc<RefCell<Vec<String>>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// The trace line for entering `name`, at the current depth.
    pub fn line(&self, name: &str, location: &str) -> String {
        format!("{}|- {name} ({location})", "|--".repeat(self.depth()))
    }

    pub fn enter(&self, interpreter: &Interpreter, name: &str, location: &str) {
        interpreter.print_line(&self.line(name, location));
        self.frames.borrow_mut().push(format!("{name} {location}"));
    }

    /// Leave the innermost active call of `name`. Calls above it lost their exit to an
    /// exception and are closed as well.
    pub fn exit(&self, name: &str, location: &str) {
        let id = format!("{name} {location}");
        let mut frames = self.frames.borrow_mut();
        let Some(position) = frames.iter().rposition(|frame| *frame == id) else {
            warn!(%id, "exit without a matching entry, ignoring");
            return;
        };
        frames.truncate(position);
    }

    fn wrap_constructed(&self, interpreter: &Interpreter, target: Value, location: String) -> Value {
        let tracer = self.clone();
        interpreter
            .native_function(CONSTRUCTED_FUNCTION, move |interpreter, this, args| {
                tracer.enter(interpreter, CONSTRUCTED_FUNCTION, &location);
                let result = interpreter.call_function(&target, this, args);
                tracer.exit(CONSTRUCTED_FUNCTION, &location);
                result
            })
            .into()
    }
}

impl Consumer for Tracer {
    fn attach(&self, bus: &EventBus, _interpreter: &mut Interpreter) -> Result<()> {
        let tracer = self.clone();
        bus.on(
            EventKind::MethodEntry,
            Rc::new(move |interpreter: &mut Interpreter, event: &Event| {
                if let Event::MethodEntry { name, location, .. } = event {
                    tracer.enter(interpreter, name, location);
                }
                Ok(None)
            }),
        );
        let tracer = self.clone();
        bus.on(
            EventKind::MethodExit,
            Rc::new(move |_: &mut Interpreter, event: &Event| {
                if let Event::MethodExit { name, location, .. } = event {
                    tracer.exit(name, location);
                }
                Ok(None)
            }),
        );
        let tracer = self.clone();
        bus.on(
            EventKind::Alloc,
            Rc::new(move |interpreter: &mut Interpreter, event: &Event| match event {
                Event::Alloc { object, tag, location } if tag == "new" && object.is_callable() => {
                    Ok(Some(tracer.wrap_constructed(interpreter, object.clone(), location.clone())))
                }
                _ => Ok(None),
            }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_indentation() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let mut interpreter = Interpreter::new();
        interpreter.set_printer(Rc::new(move |line: &str| sink.borrow_mut().push(line.to_string())));

        let tracer = Tracer::new();
        tracer.enter(&interpreter, "main", "a.js@1.0-9.1");
        tracer.enter(&interpreter, "helper", "a.js@3.4-5.5");
        tracer.exit("helper", "a.js@3.4-5.5");
        tracer.enter(&interpreter, "other", "a.js@6.4-8.5");
        tracer.exit("other", "a.js@6.4-8.5");
        tracer.exit("main", "a.js@1.0-9.1");
        tracer.exit("main", "a.js@1.0-9.1");

        assert_eq!(tracer.depth(), 0);
        assert_eq!(
            *lines.borrow(),
            vec![
                "|- main (a.js@1.0-9.1)",
                "|--|- helper (a.js@3.4-5.5)",
                "|--|- other (a.js@6.4-8.5)",
            ]
        );
    }

    #[test]
    fn test_skipped_exits_are_reconciled() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let mut interpreter = Interpreter::new();
        interpreter.set_printer(Rc::new(move |line: &str| sink.borrow_mut().push(line.to_string())));

        let tracer = Tracer::new();
        tracer.enter(&interpreter, "outer", "a.js@1.0-9.1");
        tracer.enter(&interpreter, "thrower", "a.js@2.4-2.40");
        tracer.enter(&interpreter, "leaf", "a.js@3.4-3.20");
        // Both inner calls unwound by an exception; only `outer` reports its exit.
        tracer.exit("outer", "a.js@1.0-9.1");
        assert_eq!(tracer.depth(), 0);
        tracer.enter(&interpreter, "next", "a.js@10.0-11.1");

        assert_eq!(lines.borrow().last().map(String::as_str), Some("|- next (a.js@10.0-11.1)"));
    }
}
