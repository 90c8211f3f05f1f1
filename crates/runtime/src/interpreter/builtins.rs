//! The global objects available to every script.

use std::rc::Rc;

use esprof_syntax::{parse, Expression, ParseOptions, Statement};
use rustc_hash::FxHashMap;

use super::Interpreter;
use crate::{
    error::{Result, RuntimeError},
    value::{array_length, Callable, Elements, Object, ObjectKind, ObjectRef, RegExp, Value},
};

const ERROR_TYPES: &[&str] = &["TypeError", "RangeError", "ReferenceError", "SyntaxError"];

/// Intrinsic objects shared by everything created in one interpreter.
pub struct Realm {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub regexp_prototype: ObjectRef,
    error_prototypes: FxHashMap<String, ObjectRef>,
    /// The original `Object.create`, which the hook library treats as an allocation site.
    pub object_create: Option<ObjectRef>,
}

impl Realm {
    pub(crate) fn new() -> Self {
        let object_prototype = ObjectRef::new(Object::new(ObjectKind::Ordinary, None));
        let function_prototype = ObjectRef::new(Object::new(
            ObjectKind::Function(Callable::Native {
                name: String::new(),
                call: Rc::new(|_: &mut Interpreter, _: Value, _: Vec<Value>| -> Result<Value> {
                    Ok(Value::Undefined)
                }),
            }),
            Some(object_prototype.clone()),
        ));
        let array_prototype =
            ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(object_prototype.clone())));
        let regexp_prototype =
            ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(object_prototype.clone())));

        let mut error_prototypes = FxHashMap::default();
        let error_prototype =
            ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(object_prototype.clone())));
        error_prototype.borrow_mut().define_hidden("name", "Error".into());
        error_prototype.borrow_mut().define_hidden("message", "".into());
        for name in ERROR_TYPES {
            let prototype =
                ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(error_prototype.clone())));
            prototype.borrow_mut().define_hidden("name", (*name).into());
            error_prototypes.insert(name.to_string(), prototype);
        }
        error_prototypes.insert("Error".to_string(), error_prototype);

        Self {
            object_prototype,
            function_prototype,
            array_prototype,
            regexp_prototype,
            error_prototypes,
            object_create: None,
        }
    }

    /// Prototype of the named built-in error type, falling back to `Error.prototype`.
    pub fn error_prototype(&self, name: &str) -> ObjectRef {
        self.error_prototypes
            .get(name)
            .or_else(|| self.error_prototypes.get("Error"))
            .cloned()
            .unwrap_or_else(|| self.object_prototype.clone())
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn require_object(value: &Value, what: &str) -> Result<ObjectRef> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| RuntimeError::Type(format!("{what} called on non-object")))
}

/// Relative index as used by `slice`: negative counts from the end, clamped to `[0, len]`.
fn relative_index(value: f64, len: usize) -> usize {
    let len = len as f64;
    let index = if value < 0.0 { (len + value).max(0.0) } else { value.min(len) };
    index as usize
}

impl Interpreter {
    fn method(
        &self,
        target: &ObjectRef,
        name: &str,
        function: impl Fn(&mut Self, Value, Vec<Value>) -> Result<Value> + 'static,
    ) {
        let function = self.native_function(name, function);
        target.borrow_mut().define_hidden(name, function.into());
    }

    /// Define a global constructor and link it with its prototype object.
    fn constructor(
        &mut self,
        name: &str,
        prototype: &ObjectRef,
        function: impl Fn(&mut Self, Value, Vec<Value>) -> Result<Value> + 'static,
    ) -> ObjectRef {
        let constructor = self.native_function(name, function);
        constructor.borrow_mut().define_hidden("prototype", prototype.clone().into());
        prototype.borrow_mut().define_hidden("constructor", constructor.clone().into());
        self.define_global(name, constructor.clone().into());
        constructor
    }
}

pub(crate) fn install(interpreter: &mut Interpreter) {
    interpreter.define_global("undefined", Value::Undefined);
    interpreter.define_global("NaN", Value::Number(f64::NAN));
    interpreter.define_global("Infinity", Value::Number(f64::INFINITY));

    install_object(interpreter);
    install_function(interpreter);
    install_array(interpreter);
    install_errors(interpreter);
    install_regexp(interpreter);
    install_math(interpreter);

    interpreter.define_global_function("String", |interp, _, args| {
        if args.is_empty() {
            return Ok(Value::from(""));
        }
        Ok(Value::String(interp.coerce_string(&args[0])?))
    });
    interpreter.define_global_function("Number", |interp, _, args| {
        if args.is_empty() {
            return Ok(Value::Number(0.0));
        }
        Ok(Value::Number(interp.coerce_number(&args[0])?))
    });

    let print = |interp: &mut Interpreter, _: Value, args: Vec<Value>| -> Result<Value> {
        let parts = args.iter().map(|a| interp.coerce_string(a)).collect::<Result<Vec<_>>>()?;
        interp.print_line(&parts.join(" "));
        Ok(Value::Undefined)
    };
    interpreter.define_global_function("print", print);
    let console = interpreter.new_object();
    interpreter.method(&console, "log", print);
    interpreter.define_global("console", console.into());
}

fn install_object(interpreter: &mut Interpreter) {
    let prototype = interpreter.realm.object_prototype.clone();
    let object = interpreter.constructor("Object", &prototype, |interp, _, args| match arg(&args, 0) {
        value @ Value::Object(_) => Ok(value),
        _ => Ok(interp.new_object().into()),
    });

    interpreter.method(&object, "create", |_, _, args| {
        let prototype = match arg(&args, 0) {
            Value::Object(prototype) => Some(prototype),
            Value::Null => None,
            _ => {
                return Err(RuntimeError::Type(
                    "Object prototype may only be an Object or null".to_string(),
                ))
            }
        };
        Ok(ObjectRef::new(Object::new(ObjectKind::Ordinary, prototype)).into())
    });
    interpreter.realm.object_create = match object.get("create") {
        Some(Value::Object(create)) => Some(create),
        _ => None,
    };

    interpreter.method(&object, "keys", |interp, _, args| {
        let object = require_object(&arg(&args, 0), "Object.keys")?;
        let keys: Vec<Value> = object.borrow().own_keys().into_iter().map(Value::from).collect();
        Ok(interp.new_array(keys).into())
    });
    interpreter.method(&object, "getPrototypeOf", |_, _, args| {
        let object = require_object(&arg(&args, 0), "Object.getPrototypeOf")?;
        let prototype = object.borrow().prototype.clone();
        Ok(prototype.map(Value::from).unwrap_or(Value::Null))
    });

    interpreter.method(&prototype, "hasOwnProperty", |interp, this, args| {
        let key = interp.coerce_string(&arg(&args, 0))?;
        Ok(Value::Boolean(this.as_object().is_some_and(|o| o.borrow().has_own(&key))))
    });
    interpreter.method(&prototype, "toString", |_, this, _| {
        let class = match &this {
            Value::Undefined => "Undefined",
            Value::Null => "Null",
            Value::Object(object) => object.borrow().class_name(),
            _ => "Object",
        };
        Ok(Value::String(format!("[object {class}]")))
    });
}

fn install_function(interpreter: &mut Interpreter) {
    let prototype = interpreter.realm.function_prototype.clone();
    interpreter.constructor("Function", &prototype, |interp, _, args| {
        let mut parts = args.iter().map(|a| interp.coerce_string(a)).collect::<Result<Vec<_>>>()?;
        let body = parts.pop().unwrap_or_default();
        let source = format!("(function anonymous({}) {{\n{body}\n}})", parts.join(", "));
        let program = parse(&source, &ParseOptions::default())?;
        match program.body.into_iter().next() {
            Some(Statement::ExpressionStatement(statement)) => match statement.expression {
                Expression::FunctionExpression(node) => {
                    let scope = interp.global_scope.clone();
                    Ok(interp.make_function(Rc::new(node), scope).into())
                }
                _ => Err(RuntimeError::Type("invalid function source".to_string())),
            },
            _ => Err(RuntimeError::Type("invalid function source".to_string())),
        }
    });

    interpreter.method(&prototype, "call", |interp, this, mut args| {
        let receiver = if args.is_empty() { Value::Undefined } else { args.remove(0) };
        interp.call_function(&this, receiver, args)
    });
    interpreter.method(&prototype, "apply", |interp, this, args| {
        let list = match arg(&args, 1) {
            Value::Undefined | Value::Null => Vec::new(),
            Value::Object(object) => match object.borrow().elements() {
                Some(elements) => elements.to_vec()?,
                None => return Err(RuntimeError::Type("argument list must be an array".to_string())),
            },
            _ => return Err(RuntimeError::Type("argument list must be an array".to_string())),
        };
        interp.call_function(&this, arg(&args, 0), list)
    });
}

fn install_array(interpreter: &mut Interpreter) {
    let prototype = interpreter.realm.array_prototype.clone();
    let array = interpreter.constructor("Array", &prototype, |interp, _, args| {
        if let [length @ Value::Number(_)] = args.as_slice() {
            let Some(length) = array_length(length) else {
                return Err(RuntimeError::Range("Invalid array length".to_string()));
            };
            return Ok(interp.new_array(Elements::with_length(length)).into());
        }
        Ok(interp.new_array(args).into())
    });

    interpreter.method(&array, "isArray", |_, _, args| {
        Ok(Value::Boolean(
            arg(&args, 0)
                .as_object()
                .is_some_and(|o| matches!(o.borrow().kind, ObjectKind::Array(_))),
        ))
    });

    fn elements(this: &Value) -> Result<Vec<Value>> {
        let incompatible =
            || RuntimeError::Type("Array method called on incompatible receiver".to_string());
        let object = this.as_object().ok_or_else(incompatible)?.borrow();
        object.elements().ok_or_else(incompatible)?.to_vec()
    }

    interpreter.method(&prototype, "push", |_, this, args| {
        let object = require_object(&this, "Array.prototype.push")?;
        let mut object = object.borrow_mut();
        let ObjectKind::Array(elements) = &mut object.kind else {
            return Err(RuntimeError::Type("Array.prototype.push called on non-array".to_string()));
        };
        for value in args {
            elements.push(value);
        }
        Ok(Value::Number(elements.len() as f64))
    });
    interpreter.method(&prototype, "pop", |_, this, _| {
        let object = require_object(&this, "Array.prototype.pop")?;
        let mut object = object.borrow_mut();
        let ObjectKind::Array(elements) = &mut object.kind else {
            return Err(RuntimeError::Type("Array.prototype.pop called on non-array".to_string()));
        };
        Ok(elements.pop())
    });
    interpreter.method(&prototype, "join", |interp, this, args| {
        let separator = match arg(&args, 0) {
            Value::Undefined => ",".to_string(),
            separator => interp.coerce_string(&separator)?,
        };
        let mut parts = Vec::new();
        for element in elements(&this)? {
            parts.push(match element {
                Value::Undefined | Value::Null => String::new(),
                element => interp.coerce_string(&element)?,
            });
        }
        Ok(Value::String(parts.join(&separator)))
    });
    interpreter.method(&prototype, "slice", |interp, this, args| {
        let elements = elements(&this)?;
        let start = match arg(&args, 0) {
            Value::Undefined => 0,
            start => relative_index(interp.coerce_number(&start)?.trunc(), elements.len()),
        };
        let end = match arg(&args, 1) {
            Value::Undefined => elements.len(),
            end => relative_index(interp.coerce_number(&end)?.trunc(), elements.len()),
        };
        let slice = if start < end { elements[start..end].to_vec() } else { Vec::new() };
        Ok(interp.new_array(slice).into())
    });
    interpreter.method(&prototype, "indexOf", |_, this, args| {
        let needle = arg(&args, 0);
        let position = elements(&this)?.iter().position(|v| v.strict_equals(&needle));
        Ok(Value::Number(position.map_or(-1.0, |p| p as f64)))
    });
}

fn install_errors(interpreter: &mut Interpreter) {
    for name in std::iter::once("Error").chain(ERROR_TYPES.iter().copied()) {
        let prototype = interpreter.realm.error_prototype(name);
        let instance_prototype = prototype.clone();
        interpreter.constructor(name, &prototype, move |interp, _, args| {
            let error = ObjectRef::new(Object::new(ObjectKind::Error, Some(instance_prototype.clone())));
            match arg(&args, 0) {
                Value::Undefined => {}
                message => {
                    let message = interp.coerce_string(&message)?;
                    error.borrow_mut().define_hidden("message", message.into());
                }
            }
            Ok(error.into())
        });
    }
    let error_prototype = interpreter.realm.error_prototype("Error");
    interpreter.method(&error_prototype, "toString", |_, this, _| Ok(Value::String(this.to_string())));
}

/// The receiver of a `RegExp.prototype` method and its compiled pattern.
fn this_regexp(this: &Value) -> Result<(ObjectRef, RegExp)> {
    let object = require_object(this, "RegExp method")?;
    let regexp = match &object.borrow().kind {
        ObjectKind::RegExp(regexp) => regexp.clone(),
        _ => {
            return Err(RuntimeError::Type(
                "RegExp method called on incompatible receiver".to_string(),
            ))
        }
    };
    Ok((object, regexp))
}

/// Match `this` against the first argument, starting at `lastIndex` for global patterns.
///
/// Returns the match array, with `index` and `input` set, or `None`. Indices count characters.
fn regexp_exec(interp: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Option<Value>> {
    let (object, regexp) = this_regexp(this)?;
    let input = interp.coerce_string(&arg(args, 0))?;
    let start = if regexp.global {
        let last_index = object.get("lastIndex").unwrap_or_default();
        interp.coerce_number(&last_index)?.max(0.0)
    } else {
        0.0
    };

    let captures = if start > input.chars().count() as f64 {
        None
    } else {
        let offset = input.char_indices().nth(start as usize).map_or(input.len(), |(i, _)| i);
        regexp.regex.captures_at(&input, offset)
    };
    let Some(captures) = captures else {
        if regexp.global {
            object.borrow_mut().set("lastIndex", Value::Number(0.0));
        }
        return Ok(None);
    };

    let (begin, end) = captures.get(0).map_or((0, 0), |m| (m.start(), m.end()));
    let index = input[..begin].chars().count();
    if regexp.global {
        let last_index = index + input[begin..end].chars().count();
        object.borrow_mut().set("lastIndex", Value::Number(last_index as f64));
    }
    let groups: Vec<Value> = captures
        .iter()
        .map(|group| group.map_or(Value::Undefined, |m| Value::from(m.as_str())))
        .collect();
    let result = interp.new_array(groups);
    result.borrow_mut().set("index", Value::Number(index as f64));
    result.borrow_mut().set("input", Value::String(input));
    Ok(Some(result.into()))
}

fn install_regexp(interpreter: &mut Interpreter) {
    let prototype = interpreter.realm.regexp_prototype.clone();
    interpreter.constructor("RegExp", &prototype, |interp, _, args| {
        let pattern = arg(&args, 0);
        let existing = pattern.as_object().and_then(|object| match &object.borrow().kind {
            ObjectKind::RegExp(regexp) => Some((regexp.source.clone(), regexp.flags())),
            _ => None,
        });
        let flags = match arg(&args, 1) {
            Value::Undefined => None,
            flags => Some(interp.coerce_string(&flags)?),
        };
        let (source, flags) = match existing {
            Some((source, own_flags)) => (source, flags.unwrap_or(own_flags)),
            None => {
                let source = match pattern {
                    Value::Undefined => String::new(),
                    pattern => interp.coerce_string(&pattern)?,
                };
                (source, flags.unwrap_or_default())
            }
        };
        let source = if source.is_empty() { "(?:)".to_string() } else { source };
        interp.new_regexp(&source, &flags)
    });

    interpreter.method(&prototype, "exec", |interp, this, args| {
        Ok(regexp_exec(interp, &this, &args)?.unwrap_or(Value::Null))
    });
    interpreter.method(&prototype, "test", |interp, this, args| {
        Ok(Value::Boolean(regexp_exec(interp, &this, &args)?.is_some()))
    });
    interpreter.method(&prototype, "toString", |_, this, _| {
        let (object, _) = this_regexp(&this)?;
        Ok(Value::String(Value::from(object).to_string()))
    });
}

fn install_math(interpreter: &mut Interpreter) {
    let math = interpreter.new_object();
    math.borrow_mut().define_hidden("PI", Value::Number(std::f64::consts::PI));

    let unary: [(&str, fn(f64) -> f64); 4] =
        [("floor", f64::floor), ("ceil", f64::ceil), ("abs", f64::abs), ("sqrt", f64::sqrt)];
    for (name, op) in unary {
        interpreter.method(&math, name, move |interp, _, args| {
            Ok(Value::Number(op(interp.coerce_number(&arg(&args, 0))?)))
        });
    }

    interpreter.method(&math, "max", |interp, _, args| {
        let mut result = f64::NEG_INFINITY;
        for value in &args {
            let n = interp.coerce_number(value)?;
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            result = result.max(n);
        }
        Ok(Value::Number(result))
    });
    interpreter.method(&math, "min", |interp, _, args| {
        let mut result = f64::INFINITY;
        for value in &args {
            let n = interp.coerce_number(value)?;
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            result = result.min(n);
        }
        Ok(Value::Number(result))
    });

    interpreter.define_global("Math", math.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Value {
        Interpreter::new().run_source(source).unwrap()
    }

    #[test]
    fn test_object_builtins() {
        assert_eq!(run("Object.keys({a: 1, b: 2}).join()"), Value::from("a,b"));
        assert_eq!(run("var p = {}; Object.getPrototypeOf(Object.create(p)) === p"), Value::Boolean(true));
        assert_eq!(run("Object.getPrototypeOf(Object.create(null))"), Value::Null);
        assert_eq!(run("String({})"), Value::from("[object Object]"));
        assert_eq!(run("var o = {}; Object(o) === o"), Value::Boolean(true));
    }

    #[test]
    fn test_array_builtins() {
        assert_eq!(run("var a = [1, 2, 3]; a.push(4, 5); a.pop(); a.join('')"), Value::from("1234"));
        assert_eq!(run("[1, 2, 3, 4].slice(1, -1).join()"), Value::from("2,3"));
        assert_eq!(run("[1, 2, 3].slice(-2).join()"), Value::from("2,3"));
        assert_eq!(run("['a', 'b'].indexOf('b') + [].indexOf(1)"), Value::Number(0.0));
        assert_eq!(run("new Array(3).length"), Value::Number(3.0));
        assert_eq!(run("Array.isArray([]) && !Array.isArray({})"), Value::Boolean(true));
    }

    #[test]
    fn test_sparse_arrays() {
        assert_eq!(run("var a = []; a[4000000000] = 1; a.length"), Value::Number(4000000001.0));
        assert_eq!(run("var a = [1, 2]; a[4000000000] = 1; Object.keys(a).join()"), Value::from("0,1,4000000000"));
        assert_eq!(run("var b = new Array(4294967295); b[5] = 'x'; Object.keys(b).join() + b.length"), Value::from("54294967295"));
        assert_eq!(run("var c = []; c.length = 3; c.join('-')"), Value::from("--"));
        assert_eq!(run("var d = [1, 2, 3]; d.length = 1; d.push(4); d.join()"), Value::from("1,4"));

        for source in ["var a = []; a.length = 1e12;", "var a = []; a.length = -1;", "new Array(1e12)", "new Array(2.5)"] {
            let err = Interpreter::new().run_source(source).unwrap_err();
            assert!(matches!(err, RuntimeError::Range(message) if message == "Invalid array length"), "{source}");
        }
        let caught = run("var r; try { new Array(4294967295).join(); } catch (e) { r = e instanceof RangeError; } r");
        assert_eq!(caught, Value::Boolean(true));
    }

    #[test]
    fn test_regexp() {
        assert_eq!(run("/a+/g.test('caat')"), Value::Boolean(true));
        assert_eq!(run("String(/a+b/gi) + new RegExp('x', 'm').source"), Value::from("/a+b/gix"));
        assert_eq!(run("var m = /(\\d+)-(\\d+)?/.exec('ab12-x'); [m[0], m[1], m[2], m.index].join()"), Value::from("12-,12,,2"));
        assert_eq!(run("/z/.exec('abc')"), Value::Null);

        let source = "
            var re = /o/g, seen = [];
            while (re.test('foo boo')) seen.push(re.lastIndex);
            seen.join() + '|' + re.lastIndex";
        assert_eq!(run(source), Value::from("2,3,6,7|0"));

        let caught = run("var r; try { new RegExp('('); } catch (e) { r = e instanceof SyntaxError; } r");
        assert_eq!(caught, Value::Boolean(true));
    }

    #[test]
    fn test_function_builtins() {
        let source = "
            function who(greeting) { return greeting + ' ' + this.name; }
            var o = {name: 'o'};
            who.call(o, 'hi') + '/' + who.apply(o, ['yo'])";
        assert_eq!(run(source), Value::from("hi o/yo o"));
        assert_eq!(run("(function () { return arguments.length; }).apply(null, [1, 2])"), Value::Number(2.0));
    }

    #[test]
    fn test_errors() {
        assert_eq!(run("String(new RangeError('bad'))"), Value::from("RangeError: bad"));
        assert_eq!(run("new TypeError('x') instanceof Error"), Value::Boolean(true));
        assert_eq!(run("Error('plain').message"), Value::from("plain"));
    }

    #[test]
    fn test_math_and_conversions() {
        assert_eq!(run("Math.floor(2.7) + Math.ceil(0.2) + Math.abs(-3)"), Value::Number(6.0));
        assert_eq!(run("Math.max(1, 5, 3) - Math.min(4, 2)"), Value::Number(3.0));
        assert_eq!(run("Number('42') + Number(true)"), Value::Number(43.0));
        assert_eq!(run("String(1.5) + String(null)"), Value::from("1.5null"));
    }
}
