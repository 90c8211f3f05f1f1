//! Tree-walking execution environment.
//!
//! The interpreter runs programs of the subset accepted by `esprof-syntax` in sloppy-mode
//! semantics: a global object backs the global scope, `var` and function declarations are
//! hoisted to the enclosing function, and `this` defaults to the global object. It is the
//! environment into which the hook library is installed before an instrumented program
//! executes.

use std::rc::Rc;

use esprof_syntax::{parse, Function as FunctionNode, ParseOptions, Program, Statement};

use crate::{
    error::{Result, RuntimeError},
    value::{array_index, array_length, Callable, Elements, NativeFn, Object, ObjectKind, ObjectRef, RegExp, Value},
};

mod builtins;
mod eval;
mod ops;
mod scope;

pub use builtins::Realm;
pub use ops::{to_int32, to_uint32};
pub use scope::{Scope, ScopeRef};

/// Receives every line the script prints.
pub type Printer = Rc<dyn Fn(&str)>;

/// Default limit on nested calls before a `RangeError` is raised.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Native stack that must remain before evaluation recurses further.
const STACK_RED_ZONE: usize = 256 * 1024;
/// Size of each stack segment allocated once the red zone is reached.
const STACK_SEGMENT_SIZE: usize = 4 * 1024 * 1024;

/// Run `f`, moving to a fresh stack segment first if the current one is nearly exhausted.
///
/// Script recursion is bounded by the call depth limit alone, never by the host thread's
/// stack size.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT_SIZE, f)
}

/// Per-call evaluation context.
pub(crate) struct Frame {
    pub scope: ScopeRef,
    pub this: Value,
}

pub struct Interpreter {
    realm: Realm,
    global_object: ObjectRef,
    global_scope: ScopeRef,
    printer: Printer,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an interpreter with the built-in globals installed.
    pub fn new() -> Self {
        let realm = Realm::new();
        let global_object =
            ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(realm.object_prototype.clone())));
        let global_scope = Scope::global(global_object.clone());
        let mut interpreter = Self {
            realm,
            global_object,
            global_scope,
            printer: Rc::new(|line: &str| println!("{line}")),
            depth: 0,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        };
        builtins::install(&mut interpreter);
        interpreter
    }

    /// Set where `print` and `console.log` output goes. If not set, lines go to stdout.
    pub fn set_printer(&mut self, printer: Printer) {
        self.printer = printer;
    }

    /// Set the maximum call depth. If not set, [`DEFAULT_MAX_CALL_DEPTH`] is used.
    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    pub fn print_line(&self, line: &str) {
        (self.printer)(line);
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn global_object(&self) -> &ObjectRef {
        &self.global_object
    }

    /// Value of a global variable, `undefined` if it does not exist.
    pub fn global(&self, name: &str) -> Value {
        self.global_object.get(name).unwrap_or_default()
    }

    /// Define a global that scripts can use but `for-in` over the global object skips.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global_object.borrow_mut().define_hidden(name, value);
    }

    /// Define a global function implemented in Rust.
    pub fn define_global_function(
        &mut self,
        name: &str,
        function: impl Fn(&mut Self, Value, Vec<Value>) -> Result<Value> + 'static,
    ) {
        let function = self.native_function(name, function);
        self.define_global(name, function.into());
    }

    /// Create a function object implemented in Rust.
    pub fn native_function(
        &self,
        name: &str,
        function: impl Fn(&mut Self, Value, Vec<Value>) -> Result<Value> + 'static,
    ) -> ObjectRef {
        let call: NativeFn = Rc::new(function);
        ObjectRef::new(Object::new(
            ObjectKind::Function(Callable::Native { name: name.to_string(), call }),
            Some(self.realm.function_prototype.clone()),
        ))
    }

    /// Create a script function closing over `scope`, with a fresh `prototype` object.
    pub(crate) fn make_function(&self, node: Rc<FunctionNode>, scope: ScopeRef) -> ObjectRef {
        let function = ObjectRef::new(Object::new(
            ObjectKind::Function(Callable::Script { node, scope }),
            Some(self.realm.function_prototype.clone()),
        ));
        let prototype = self.new_object();
        prototype.borrow_mut().define_hidden("constructor", function.clone().into());
        function.borrow_mut().define_hidden("prototype", prototype.into());
        function
    }

    pub fn new_object(&self) -> ObjectRef {
        ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(self.realm.object_prototype.clone())))
    }

    pub fn new_array(&self, elements: impl Into<Elements>) -> ObjectRef {
        ObjectRef::new(Object::new(
            ObjectKind::Array(elements.into()),
            Some(self.realm.array_prototype.clone()),
        ))
    }

    /// Compile a regular expression object, throwing a `SyntaxError` for a bad pattern or
    /// flags.
    pub fn new_regexp(&self, source: &str, flags: &str) -> Result<Value> {
        let regexp = RegExp::new(source, flags)
            .map_err(|message| RuntimeError::Thrown(self.new_error("SyntaxError", message)))?;
        let object = ObjectRef::new(Object::new(
            ObjectKind::RegExp(regexp),
            Some(self.realm.regexp_prototype.clone()),
        ));
        object.borrow_mut().define_hidden("lastIndex", Value::Number(0.0));
        Ok(object.into())
    }

    /// Create an error object of the given built-in error type.
    pub fn new_error(&self, name: &str, message: impl Into<String>) -> Value {
        let prototype = self.realm.error_prototype(name);
        let error = ObjectRef::new(Object::new(ObjectKind::Error, Some(prototype)));
        error.borrow_mut().define_hidden("message", Value::String(message.into()));
        error.into()
    }

    /// Parse and run `source` in the global scope.
    pub fn run_source(&mut self, source: &str) -> Result<Value> {
        let program = parse(source, &ParseOptions::default())?;
        self.run(&program)
    }

    /// Run a program in the global scope, returning the value of its last top-level
    /// expression statement.
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        debug!(statements = program.body.len(), "running program");
        let frame = Frame { scope: self.global_scope.clone(), this: self.global_object.clone().into() };
        self.hoist(&program.body, &frame.scope);

        let mut completion = Value::Undefined;
        for statement in &program.body {
            if let Statement::ExpressionStatement(node) = statement {
                completion = self.evaluate(&node.expression, &frame)?;
                continue;
            }
            if let eval::Completion::Return(_) = self.exec(statement, &frame)? {
                break;
            }
        }
        Ok(completion)
    }

    /// Call `callee` with the given receiver and arguments.
    pub fn call_function(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> Result<Value> {
        let Some(callable) = callee.as_object().and_then(ObjectRef::callable) else {
            return Err(RuntimeError::Type(format!("{} is not a function", callee.type_of())));
        };
        if self.depth >= self.max_depth {
            return Err(RuntimeError::Range("Maximum call stack size exceeded".to_string()));
        }
        self.depth += 1;
        let result = with_stack(|| match callable {
            Callable::Native { call, .. } => call(self, this, args),
            Callable::Script { node, scope } => self.call_script(&node, &scope, this, args),
        });
        self.depth -= 1;
        result
    }

    fn call_script(
        &mut self,
        node: &FunctionNode,
        closure: &ScopeRef,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value> {
        let this = match this {
            Value::Undefined | Value::Null => self.global_object.clone().into(),
            this => this,
        };
        let scope = Scope::child(closure);
        {
            let arguments = ObjectRef::new(Object::new(
                ObjectKind::Arguments(args.clone().into()),
                Some(self.realm.object_prototype.clone()),
            ));
            let mut scope = scope.borrow_mut();
            scope.define("arguments", arguments.into());
            for (i, param) in node.params.iter().enumerate() {
                scope.define(&param.name, args.get(i).cloned().unwrap_or_default());
            }
        }
        self.hoist(&node.body.body, &scope);

        let frame = Frame { scope, this };
        match self.exec_block(&node.body.body, &frame)? {
            eval::Completion::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    /// `new callee(...args)`
    pub fn construct(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        let Some(constructor) = callee.as_object().filter(|c| c.is_callable()) else {
            return Err(RuntimeError::Type(format!("{} is not a constructor", callee.type_of())));
        };
        let prototype = match constructor.get("prototype") {
            Some(Value::Object(prototype)) => prototype,
            _ => self.realm.object_prototype.clone(),
        };
        let object = ObjectRef::new(Object::new(ObjectKind::Ordinary, Some(prototype)));
        match self.call_function(callee, object.clone().into(), args)? {
            result @ Value::Object(_) => Ok(result),
            _ => Ok(object.into()),
        }
    }

    pub fn get_property(&mut self, target: &Value, key: &str) -> Result<Value> {
        match target {
            Value::Undefined | Value::Null => {
                Err(RuntimeError::Type(format!("Cannot read property '{key}' of {target}")))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                Ok(array_index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default())
            }
            Value::Boolean(_) | Value::Number(_) => Ok(Value::Undefined),
            Value::Object(object) => Ok(object.get(key).unwrap_or_default()),
        }
    }

    pub fn put_property(&mut self, target: &Value, key: &str, value: Value) -> Result<()> {
        match target {
            Value::Undefined | Value::Null => {
                Err(RuntimeError::Type(format!("Cannot set property '{key}' of {target}")))
            }
            Value::Object(object) => {
                let mut object = object.borrow_mut();
                if key == "length"
                    && matches!(object.kind, ObjectKind::Array(_))
                    && array_length(&value).is_none()
                {
                    return Err(RuntimeError::Range("Invalid array length".to_string()));
                }
                object.set(key, value);
                Ok(())
            }
            // Writes to primitives are dropped.
            _ => Ok(()),
        }
    }

    pub fn delete_property(&mut self, target: &Value, key: &str) -> Result<bool> {
        match target {
            Value::Undefined | Value::Null => {
                Err(RuntimeError::Type(format!("Cannot delete property '{key}' of {target}")))
            }
            Value::Object(object) => Ok(object.borrow_mut().delete(key)),
            _ => Ok(true),
        }
    }

    /// Convert an object to a primitive, preferring script-defined `valueOf` and `toString`.
    pub fn to_primitive(&mut self, value: &Value) -> Result<Value> {
        let Value::Object(object) = value else {
            return Ok(value.clone());
        };
        for method in ["valueOf", "toString"] {
            let Some(function) = object.get(method) else {
                continue;
            };
            let is_script = function
                .as_object()
                .and_then(ObjectRef::callable)
                .is_some_and(|callable| callable.is_script());
            if is_script {
                let result = self.call_function(&function, value.clone(), Vec::new())?;
                if result.as_object().is_none() {
                    return Ok(result);
                }
            }
        }
        Ok(Value::String(value.to_string()))
    }

    pub fn coerce_string(&mut self, value: &Value) -> Result<String> {
        Ok(self.to_primitive(value)?.to_string())
    }

    pub fn coerce_number(&mut self, value: &Value) -> Result<f64> {
        Ok(self.to_primitive(value)?.to_number_primitive())
    }

    /// Turn a caught error into the value a script `catch` clause binds. Errors that scripts
    /// may not catch are handed back.
    pub fn catch_value(&mut self, error: RuntimeError) -> Result<Value> {
        if !error.is_catchable() {
            return Err(error);
        }
        Ok(match error {
            RuntimeError::Thrown(value) => value,
            RuntimeError::Type(message) => self.new_error("TypeError", message),
            RuntimeError::Reference(name) => {
                self.new_error("ReferenceError", format!("{name} is not defined"))
            }
            RuntimeError::Range(message) => self.new_error("RangeError", message),
            RuntimeError::Syntax(error) => self.new_error("SyntaxError", error.to_string()),
            error => return Err(error),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn run(source: &str) -> Value {
        Interpreter::new().run_source(source).unwrap()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(run("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(run("'a' + 1 + 2"), Value::from("a12"));
        assert_eq!(run("1 + 2 + 'a'"), Value::from("3a"));
        assert_eq!(run("7 % 3 - -1"), Value::Number(2.0));
        assert_eq!(run("typeof undeclared"), Value::from("undefined"));
        assert_eq!(run("null == undefined && 1 == '1' && !(1 === '1')"), Value::Boolean(true));
    }

    #[test]
    fn test_closures_and_hoisting() {
        let source = "
            var counter = make();
            counter(); counter();
            function make() {
                var n = 0;
                return function () { n += 1; return n; };
            }
            counter()";
        assert_eq!(run(source), Value::Number(3.0));
    }

    #[test]
    fn test_named_function_expression_sees_itself() {
        assert_eq!(
            run("var f = function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); }; f(5)"),
            Value::Number(120.0)
        );
    }

    #[test]
    fn test_prototypes_and_new() {
        let source = "
            function Point(x) { this.x = x; }
            Point.prototype.double = function () { return this.x * 2; };
            var p = new Point(21);
            p instanceof Point && p.double() === 42 && !p.hasOwnProperty('double')";
        assert_eq!(run(source), Value::Boolean(true));
    }

    #[test]
    fn test_control_flow() {
        let source = "
            var out = [];
            for (var i = 0; i < 10; i++) {
                if (i % 2) continue;
                if (i > 6) break;
                out.push(i);
            }
            var j = 0;
            do { j++; } while (j < 3);
            while (false) {}
            out.join('-') + ':' + j";
        assert_eq!(run(source), Value::from("0-2-4-6:3"));
    }

    #[test]
    fn test_switch() {
        let source = "
            function name(n) {
                var out = '';
                switch (n) {
                    case 1: out += 'one';
                    case 2: out += 'two'; break;
                    default: out += 'many';
                    case '3': out += 'text';
                }
                return out;
            }
            [name(1), name(2), name(3), name('3'), name(4)].join()";
        assert_eq!(run(source), Value::from("onetwo,two,manytext,text,manytext"));
        assert_eq!(run("var x = 0; switch (5) { case 1: x = 1; } x"), Value::Number(0.0));
        // Declarations in case clauses are hoisted.
        assert_eq!(run("switch (0) { case 1: var v = 2; function h() { return 3; } } typeof v + h()"), Value::from("undefined3"));
    }

    #[test]
    fn test_labeled_jumps() {
        let source = "
            var out = [];
            outer: for (var i = 0; i < 3; i++) {
                for (var j = 0; j < 3; j++) {
                    if (j == 1) continue outer;
                    if (i == 2) break outer;
                    out.push(i + '' + j);
                }
            }
            block: { out.push('in'); break block; out.push('never'); }
            var k = 0;
            loop: while (true) { switch (k++) { case 3: break loop; default: continue loop; } }
            out.join() + ':' + k";
        assert_eq!(run(source), Value::from("00,10,in:4"));
    }

    #[test]
    fn test_unsupported_syntax_is_a_syntax_error() {
        let json = r#"{"type":"Program","body":[
            {"type":"ExpressionStatement","expression":{"type":"Literal","value":1}},
            {"type":"WithStatement","object":{"type":"Identifier","name":"o"},"body":{"type":"EmptyStatement"},
             "loc":{"start":{"line":2,"column":4},"end":{"line":2,"column":9}}}
        ]}"#;
        let program = esprof_syntax::from_estree_json(json).unwrap();
        let err = Interpreter::new().run(&program).unwrap_err();
        let RuntimeError::Syntax(err) = err else {
            panic!("expected a syntax error, got {err:?}");
        };
        assert_eq!(err.message, "unsupported syntax: WithStatement");
        assert_eq!((err.line, err.column), (2, 4));
    }

    #[test]
    fn test_for_in_skips_builtins() {
        let source = "
            var o = {a: 1, b: 2}, keys = [];
            for (var k in o) keys.push(k);
            keys.join()";
        assert_eq!(run(source), Value::from("a,b"));
    }

    #[test]
    fn test_exceptions() {
        let source = "
            var log = [];
            try {
                try { null.x; } finally { log.push('finally'); }
            } catch (e) {
                log.push(e instanceof TypeError, e.message);
            }
            try { throw 'plain'; } catch (e) { log.push(e); }
            log.join('|')";
        assert_eq!(run(source), Value::from("finally|true|Cannot read property 'x' of null|plain"));

        let err = Interpreter::new().run_source("throw new Error('boom');").unwrap_err();
        assert_eq!(err.to_string(), "uncaught exception: Error: boom");
        assert!(matches!(
            Interpreter::new().run_source("missing + 1").unwrap_err(),
            RuntimeError::Reference(name) if name == "missing"
        ));
    }

    #[test]
    fn test_fatal_error_survives_finally() {
        let mut interpreter = Interpreter::new();
        interpreter.define_global_function("fail", |_, _, _| {
            Err(RuntimeError::UnknownEvent("nope".to_string()))
        });
        let source = "
            var cleaned = false;
            function f() {
                try { fail(); } catch (e) { return 'caught'; } finally { cleaned = true; return 'swallowed'; }
            }
            f();";
        let err = interpreter.run_source(source).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownEvent(name) if name == "nope"));
        assert_eq!(interpreter.global("cleaned"), Value::Boolean(true));

        // Catchable errors are still replaced by an abrupt `finally`.
        let value = interpreter
            .run_source("function g() { try { null.x; } finally { return 'replaced'; } } g()")
            .unwrap();
        assert_eq!(value, Value::from("replaced"));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut interpreter = Interpreter::new();
        interpreter.set_max_call_depth(20);
        let err = interpreter.run_source("function f() { return f(); } f();").unwrap_err();
        assert!(matches!(err, RuntimeError::Range(_)));

        let caught = interpreter
            .run_source("var r; try { f(); } catch (e) { r = e instanceof RangeError; } r")
            .unwrap();
        assert_eq!(caught, Value::Boolean(true));
    }

    #[test]
    fn test_printer() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let mut interpreter = Interpreter::new();
        interpreter.set_printer(Rc::new(move |line| sink.borrow_mut().push(line.to_string())));
        interpreter.run_source("print('a', 1, [2, 3]); console.log({});").unwrap();
        assert_eq!(*lines.borrow(), vec!["a 1 2,3", "[object Object]"]);
    }

    #[test]
    fn test_function_constructor() {
        assert_eq!(run("var add = new Function('a', 'b', 'return a + b;'); add(2, 3)"), Value::Number(5.0));
        let err = Interpreter::new().run_source("Function('return +;')").unwrap_err();
        assert!(matches!(err, RuntimeError::Syntax(_)));
    }
}
