//! The hook functions instrumented programs call.
//!
//! Every hook turns its invocation into an [`Event`] on the bus and then performs the
//! operation it stands in for, so an instrumented program computes exactly what the original
//! would. The library also exposes the script-side `esprof.on(kind, fn)` subscription API.

use std::rc::Rc;

use esprof_instrument::hooks as names;
use esprof_syntax::AssignmentOperator;

use crate::{
    error::{Result, RuntimeError},
    event::{Event, ALL},
    interpreter::Interpreter,
    registry::EventBus,
    value::{Elements, ObjectKind, Value},
};

/// Name of the script-visible subscription object.
pub const SCRIPT_API: &str = "esprof";

type Hook = fn(&HookLibrary, &mut Interpreter, &[Value]) -> Result<Value>;

struct HookLibrary {
    bus: EventBus,
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Install the `esprof$on…` hooks and the `esprof` object as globals of `interpreter`.
pub fn install(interpreter: &mut Interpreter, bus: &EventBus) {
    let library = Rc::new(HookLibrary { bus: bus.clone() });
    let table: [(&str, Hook); 10] = [
        (names::METHOD_ENTRY, HookLibrary::on_method_entry),
        (names::METHOD_EXIT, HookLibrary::on_method_exit),
        (names::OBJECT_ALLOC, HookLibrary::on_object_alloc),
        (names::FUNCTION_DEFINED, HookLibrary::on_function_defined),
        (names::PROP_READ, HookLibrary::on_prop_read),
        (names::PROP_WRITE, HookLibrary::on_prop_write),
        (names::PROP_OP_WRITE, HookLibrary::on_prop_op_write),
        (names::PROP_UPDATE, HookLibrary::on_prop_update),
        (names::PROP_CALL, HookLibrary::on_prop_call),
        (names::DIRECT_CALL, HookLibrary::on_direct_call),
    ];
    for (name, hook) in table {
        let library = library.clone();
        interpreter.define_global_function(name, move |interpreter, _, args| {
            hook(&library, interpreter, &args)
        });
    }
    install_script_api(interpreter, bus);
    debug!(hooks = table.len(), "installed hook library");
}

impl HookLibrary {
    fn on_method_entry(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let event = Event::MethodEntry {
            name: interpreter.coerce_string(&arg(args, 0))?,
            arguments: arg(args, 1),
            location: interpreter.coerce_string(&arg(args, 2))?,
        };
        self.bus.dispatch(interpreter, &event)?;
        Ok(Value::Undefined)
    }

    fn on_method_exit(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let value = arg(args, 1);
        let event = Event::MethodExit {
            name: interpreter.coerce_string(&arg(args, 0))?,
            value: value.clone(),
            location: interpreter.coerce_string(&arg(args, 2))?,
        };
        self.bus.dispatch(interpreter, &event)?;
        Ok(value)
    }

    fn on_object_alloc(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let tag = interpreter.coerce_string(&arg(args, 1))?;
        let location = interpreter.coerce_string(&arg(args, 2))?;
        self.alloc(interpreter, arg(args, 0), tag, location)
    }

    fn alloc(
        &self,
        interpreter: &mut Interpreter,
        object: Value,
        tag: String,
        location: String,
    ) -> Result<Value> {
        let event = Event::Alloc { object: object.clone(), tag, location };
        match self.bus.dispatch(interpreter, &event)? {
            Some(replacement) if !replacement.is_undefined() => Ok(replacement),
            _ => Ok(object),
        }
    }

    fn on_function_defined(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let function = arg(args, 0);
        let event = Event::FunctionDefined {
            function: function.clone(),
            location: interpreter.coerce_string(&arg(args, 1))?,
        };
        self.bus.dispatch(interpreter, &event)?;
        Ok(function)
    }

    fn on_prop_read(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let location = interpreter.coerce_string(&arg(args, 2))?;
        self.read(interpreter, arg(args, 0), arg(args, 1), location)
    }

    fn read(
        &self,
        interpreter: &mut Interpreter,
        object: Value,
        key: Value,
        location: String,
    ) -> Result<Value> {
        let name = interpreter.coerce_string(&key)?;
        let event = Event::PropRead { object: object.clone(), key, location };
        self.bus.dispatch(interpreter, &event)?;
        interpreter.get_property(&object, &name)
    }

    fn on_prop_write(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let location = interpreter.coerce_string(&arg(args, 3))?;
        self.write(interpreter, arg(args, 0), arg(args, 1), arg(args, 2), location)
    }

    fn write(
        &self,
        interpreter: &mut Interpreter,
        object: Value,
        key: Value,
        value: Value,
        location: String,
    ) -> Result<Value> {
        let name = interpreter.coerce_string(&key)?;
        let event = Event::PropWrite { object: object.clone(), key, value: value.clone(), location };
        self.bus.dispatch(interpreter, &event)?;
        interpreter.put_property(&object, &name, value.clone())?;
        Ok(value)
    }

    /// `object[key] = current <operator> operand`
    fn on_prop_op_write(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let (object, key) = (arg(args, 0), arg(args, 1));
        let (current, operand) = (arg(args, 2), arg(args, 3));
        let tag = interpreter.coerce_string(&arg(args, 4))?;
        let location = interpreter.coerce_string(&arg(args, 5))?;
        let Some(operator) =
            format!("{tag}=").parse::<AssignmentOperator>().ok().and_then(AssignmentOperator::binary)
        else {
            return Err(RuntimeError::UnknownOperator(tag));
        };

        let event = Event::PropOpWrite {
            object: object.clone(),
            key: key.clone(),
            current: current.clone(),
            operand: operand.clone(),
            operator: tag,
            location: location.clone(),
        };
        self.bus.dispatch(interpreter, &event)?;
        let value = interpreter.binary(operator, current, operand)?;
        self.write(interpreter, object, key, value, location)
    }

    /// `++x`, `--x`, `x++` and `x--` on a property. The operand is converted to a number the
    /// way the native operators do.
    fn on_prop_update(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let (object, key) = (arg(args, 0), arg(args, 1));
        let tag = interpreter.coerce_string(&arg(args, 2))?;
        let location = interpreter.coerce_string(&arg(args, 3))?;
        let (delta, prefix) = match tag.as_str() {
            "++x" => (1.0, true),
            "--x" => (-1.0, true),
            "x++" => (1.0, false),
            "x--" => (-1.0, false),
            _ => return Err(RuntimeError::UnknownOperator(tag)),
        };

        let event = Event::PropUpdate {
            object: object.clone(),
            key: key.clone(),
            operator: tag,
            location: location.clone(),
        };
        self.bus.dispatch(interpreter, &event)?;
        let current = self.read(interpreter, object.clone(), key.clone(), location.clone())?;
        let old = interpreter.coerce_number(&current)?;
        let new = self.write(interpreter, object, key, Value::Number(old + delta), location)?;
        Ok(if prefix { new } else { Value::Number(old) })
    }

    fn on_prop_call(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let (object, arguments) = (arg(args, 0), arg(args, 2));
        let location = interpreter.coerce_string(&arg(args, 3))?;
        let callee = self.read(interpreter, object.clone(), arg(args, 1), location.clone())?;
        self.call(interpreter, object, callee, arguments, location)
    }

    fn on_direct_call(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let location = interpreter.coerce_string(&arg(args, 3))?;
        self.call(interpreter, arg(args, 0), arg(args, 1), arg(args, 2), location)
    }

    /// Invoke `callee` between a `beforeCall` and an `afterCall` event.
    fn call(
        &self,
        interpreter: &mut Interpreter,
        receiver: Value,
        callee: Value,
        arguments: Value,
        location: String,
    ) -> Result<Value> {
        let before = Event::BeforeCall {
            receiver: receiver.clone(),
            callee: callee.clone(),
            arguments: arguments.clone(),
            location: location.clone(),
        };
        self.bus.dispatch(interpreter, &before)?;

        let values = arguments
            .as_object()
            .and_then(|array| array.borrow().elements().map(Elements::to_vec))
            .transpose()?
            .unwrap_or_default();
        let result = interpreter.call_function(&callee, receiver.clone(), values)?;

        let after = Event::AfterCall { receiver, callee: callee.clone(), arguments, location };
        self.bus.dispatch(interpreter, &after)?;

        let creates = match (callee.as_object(), &interpreter.realm().object_create) {
            (Some(callee), Some(create)) => callee.ptr_eq(create),
            _ => false,
        };
        if creates {
            return self.alloc(interpreter, result, "{}".to_string(), after.location().to_string());
        }
        Ok(result)
    }
}

/// Define the `esprof` global whose `on(kind, fn)` subscribes script functions.
///
/// `kind` is an event kind name, `"all"`, `null` (same as `"all"`) or an array of names.
/// The listener is called with the kind name followed by the event's parameters; a result
/// other than `undefined` is used as the replacement value.
fn install_script_api(interpreter: &mut Interpreter, bus: &EventBus) {
    let api = interpreter.new_object();
    let bus = bus.clone();
    let on = interpreter.native_function("on", move |interpreter, _, args| {
        let (target, callback) = (arg(&args, 0), arg(&args, 1));
        if !callback.is_callable() {
            return Err(RuntimeError::Type(format!("{} is not a function", callback.type_of())));
        }
        let targets = match &target {
            Value::Null => vec![ALL.to_string()],
            Value::String(name) => vec![name.clone()],
            Value::Object(list) if matches!(list.borrow().kind, ObjectKind::Array(_)) => {
                let names = list.borrow().elements().map(Elements::to_vec).transpose()?.unwrap_or_default();
                names.iter().map(|name| interpreter.coerce_string(name)).collect::<Result<_>>()?
            }
            other => vec![interpreter.coerce_string(other)?],
        };
        for target in targets {
            subscribe_script(&bus, &target, callback.clone())?;
        }
        Ok(Value::Undefined)
    });
    api.borrow_mut().define_hidden("on", on.into());
    interpreter.define_global(SCRIPT_API, api.into());
}

fn subscribe_script(bus: &EventBus, target: &str, callback: Value) -> Result<()> {
    let listener = move |interpreter: &mut Interpreter, event: &Event| -> Result<Option<Value>> {
        let mut args = vec![Value::from(event.kind().as_ref())];
        args.extend(event.values());
        let result = interpreter.call_function(&callback, Value::Undefined, args)?;
        Ok((!result.is_undefined()).then_some(result))
    };
    bus.subscribe(target, Rc::new(listener))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{event::EventKind, registry::Listener};

    fn setup() -> (Interpreter, EventBus) {
        let mut interpreter = Interpreter::new();
        let bus = EventBus::new();
        install(&mut interpreter, &bus);
        (interpreter, bus)
    }

    fn record(bus: &EventBus, target: &str) -> Rc<RefCell<Vec<Event>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let listener: Listener = Rc::new(move |_: &mut Interpreter, event: &Event| {
            sink.borrow_mut().push(event.clone());
            Ok(None)
        });
        bus.subscribe(target, listener).unwrap();
        log
    }

    #[test]
    fn test_read_and_write_hooks() {
        let (mut interpreter, bus) = setup();
        let log = record(&bus, ALL);
        let result = interpreter
            .run_source(
                "var o = {};
                 esprof$onPropWrite(o, 'a', 2, 'l');
                 esprof$onPropRead(o, 'a', 'l') + o.a",
            )
            .unwrap();
        assert_eq!(result, Value::Number(4.0));
        let kinds: Vec<_> = log.borrow().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::PropWrite, EventKind::PropRead]);
    }

    #[test]
    fn test_op_write_and_update() {
        let (mut interpreter, bus) = setup();
        let log = record(&bus, ALL);
        let result = interpreter
            .run_source(
                "var o = {n: 5};
                 esprof$onPropOpWrite(o, 'n', o.n, 4, '+', 'l');
                 var post = esprof$onPropUpdate(o, 'n', 'x++', 'l');
                 var pre = esprof$onPropUpdate(o, 'n', '--x', 'l');
                 [post, pre, o.n].join()",
            )
            .unwrap();
        assert_eq!(result, Value::from("9,9,9"));
        let kinds: Vec<_> = log.borrow().iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PropOpWrite,
                EventKind::PropWrite,
                EventKind::PropUpdate,
                EventKind::PropRead,
                EventKind::PropWrite,
                EventKind::PropUpdate,
                EventKind::PropRead,
                EventKind::PropWrite,
            ]
        );
    }

    #[test]
    fn test_update_converts_to_number() {
        let (mut interpreter, _) = setup();
        let result = interpreter
            .run_source("var o = {s: '41'}; esprof$onPropUpdate(o, 's', '++x', 'l'); typeof o.s + o.s")
            .unwrap();
        assert_eq!(result, Value::from("number42"));
    }

    #[test]
    fn test_unknown_operators_are_fatal() {
        let (mut interpreter, _) = setup();
        let err = interpreter
            .run_source("try { esprof$onPropOpWrite({}, 'n', 1, 1, '**', 'l'); } catch (e) {}")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownOperator(op) if op == "**"));
        let err = interpreter.run_source("esprof$onPropUpdate({}, 'n', 'x+', 'l')").unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownOperator(_)));

        let err = interpreter
            .run_source(
                "function f() { try { esprof$onPropOpWrite({n: 1}, 'n', 1, 2, '**', 'l'); } finally { return 'x'; } }
                 f()",
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownOperator(op) if op == "**"));
        let err = interpreter
            .run_source("function g() { try { esprof.on('nope', function () {}); } finally { return 'x'; } } g()")
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownEvent(name) if name == "nope"));
    }

    #[test]
    fn test_calls_are_bracketed() {
        let (mut interpreter, bus) = setup();
        let log = record(&bus, ALL);
        let result = interpreter
            .run_source("var o = {f: function (x) { return this === o && x; }}; esprof$onPropCall(o, 'f', [7], 'l')")
            .unwrap();
        assert_eq!(result, Value::Number(7.0));
        let kinds: Vec<_> = log.borrow().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::PropRead, EventKind::BeforeCall, EventKind::AfterCall]);
    }

    #[test]
    fn test_object_create_is_an_allocation() {
        let (mut interpreter, bus) = setup();
        let log = record(&bus, "alloc");
        interpreter.run_source("esprof$onPropCall(Object, 'create', [null], 'l')").unwrap();
        assert!(matches!(&log.borrow()[..], [Event::Alloc { tag, .. }] if tag == "{}"));
    }

    #[test]
    fn test_alloc_replacement() {
        let (mut interpreter, bus) = setup();
        let listener: Listener = Rc::new(|_: &mut Interpreter, event: &Event| {
            Ok(matches!(event, Event::Alloc { tag, .. } if tag == "[]").then(|| Value::from("swapped")))
        });
        bus.on(EventKind::Alloc, listener);
        let result = interpreter
            .run_source("[esprof$onObjectAlloc([], '[]', 'l'), esprof$onObjectAlloc({}, '{}', 'l')].length")
            .unwrap();
        assert_eq!(result, Value::Number(2.0));
        assert_eq!(
            interpreter.run_source("esprof$onObjectAlloc([], '[]', 'l')").unwrap(),
            Value::from("swapped")
        );
    }

    #[test]
    fn test_exit_and_definition_pass_values_through() {
        let (mut interpreter, _) = setup();
        let result = interpreter
            .run_source("var f = esprof$onFunctionDefined(function () { return 3; }, 'l'); esprof$onMethodExit('f', f(), 'l')")
            .unwrap();
        assert_eq!(result, Value::Number(3.0));
    }

    #[test]
    fn test_script_subscription() {
        let (mut interpreter, bus) = setup();
        let result = interpreter
            .run_source(
                "var seen = [];
                 esprof.on(['alloc', 'propRead'], function (kind, a, b, c) { seen.push(kind + ':' + b); });
                 esprof$onObjectAlloc({}, '{}', 'l');
                 esprof$onPropRead({}, 'k', 'l');
                 seen.join()",
            )
            .unwrap();
        assert_eq!(result, Value::from("alloc:{},propRead:k"));
        assert_eq!(bus.listener_count(EventKind::Alloc), 1);

        let err = interpreter.run_source("esprof.on('nope', function () {})").unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownEvent(name) if name == "nope"));
    }

    #[test]
    fn test_script_listener_replacement() {
        let (mut interpreter, _) = setup();
        let result = interpreter
            .run_source(
                "esprof.on(null, function (kind, object, tag) { if (tag === 'new') return 'replaced'; });
                 esprof$onObjectAlloc({}, 'new', 'l')",
            )
            .unwrap();
        assert_eq!(result, Value::from("replaced"));
    }
}
