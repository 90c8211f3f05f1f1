//! The instrumentation pass.

use esprof_syntax::*;

use crate::{
    config::{Category, InstrumentConfig},
    error::InstrumentError,
    hooks,
    roles::{Role, RoleTable},
    scope::{FunctionInfo, ScopeFrame, ScopeStack},
    visitor::{NodeId, Rewriter, Walk},
};

const ANONYMOUS: &str = "<anonymous>";

/// Rewrite `program` so every enabled construct goes through its hook.
pub fn instrument_program(mut program: Program, config: &InstrumentConfig) -> Program {
    let mut instrumenter = Instrumenter::new(config);
    program.walk(&mut instrumenter);
    debug_assert!(instrumenter.roles.is_empty(), "unconsumed role flags");
    debug!(
        script = %config.script_name,
        temps = instrumenter.next_temp,
        "instrumented program"
    );
    program
}

/// Parse `source`, instrument it and print the result.
pub fn instrument_source(source: &str, config: &InstrumentConfig) -> Result<String, InstrumentError> {
    let program = parse(source, &ParseOptions::default())?;
    Ok(print(&instrument_program(program, config)))
}

/// Same as [`instrument_source`] for a program in ESTree JSON form, producing ESTree JSON.
pub fn instrument_estree(json: &str, config: &InstrumentConfig) -> Result<String, InstrumentError> {
    let program = from_estree_json(json)?;
    Ok(to_estree_json(&instrument_program(program, config))?)
}

struct Instrumenter<'a> {
    config: &'a InstrumentConfig,
    roles: RoleTable,
    scopes: ScopeStack,
    next_temp: usize,
}

impl<'a> Instrumenter<'a> {
    fn new(config: &'a InstrumentConfig) -> Self {
        Self { config, roles: RoleTable::default(), scopes: ScopeStack::default(), next_temp: 0 }
    }

    fn enabled(&self, category: Category) -> bool {
        self.config.is_enabled(category)
    }

    fn location(&self, loc: Option<SourceLocation>) -> String {
        loc.unwrap_or_default().describe(&self.config.script_name)
    }

    fn location_literal(&self, loc: Option<SourceLocation>) -> Expression {
        Expression::string(self.location(loc))
    }

    /// Reserve a fresh temporary in the innermost scope.
    fn temp(&mut self) -> Expression {
        let name = format!("{}{}", hooks::TEMP_PREFIX, self.next_temp);
        self.next_temp += 1;
        if let Some(frame) = self.scopes.current_mut() {
            frame.temps.push(name.clone());
        }
        Expression::identifier(name)
    }

    /// Returns the expression to use at the first evaluation and the one to use at the second.
    /// Anything that could have side effects is stored in a temporary on first use.
    fn evaluate_once(&mut self, expression: Expression) -> (Expression, Expression) {
        match expression {
            Expression::Identifier(_) | Expression::ThisExpression(_) | Expression::Literal(_) => {
                (expression.clone(), expression)
            }
            expression => {
                let temp = self.temp();
                (Expression::assign(temp.clone(), expression), temp)
            }
        }
    }

    fn alloc(&self, node: Expression, tag: &str, loc: Option<SourceLocation>) -> Expression {
        hooks::call(hooks::OBJECT_ALLOC, vec![node, Expression::string(tag), self.location_literal(loc)])
    }
}

/// The key argument passed to property hooks: a string literal for `o.name`, the original
/// key expression for `o[key]`.
fn property_key(member: MemberExpression) -> (Expression, Expression) {
    let MemberExpression { object, property, computed, .. } = member;
    let key = match *property {
        Expression::Identifier(ident) if !computed => Expression::string(ident.name),
        property => property,
    };
    (*object, key)
}

fn update_tag(node: &UpdateExpression) -> String {
    if node.prefix {
        format!("{}x", node.operator)
    } else {
        format!("x{}", node.operator)
    }
}

impl Rewriter for Instrumenter<'_> {
    fn enter_program(&mut self, _program: &mut Program) {
        self.scopes.push(ScopeFrame::new(None));
    }

    fn leave_program(&mut self, program: &mut Program) {
        if let Some(frame) = self.scopes.pop() {
            let mut body = frame.into_prologue();
            body.append(&mut program.body);
            program.body = body;
        }
    }

    fn enter_function(&mut self, function: &mut Function) {
        let info = FunctionInfo {
            name: function.name().unwrap_or(ANONYMOUS).to_string(),
            location: self.location(function.loc),
        };
        trace!(name = %info.name, depth = self.scopes.depth(), "entering function scope");
        self.scopes.push(ScopeFrame::new(Some(info)));
    }

    fn leave_function(&mut self, function: &mut Function) {
        let Some(mut frame) = self.scopes.pop() else {
            return;
        };
        let Some(info) = frame.function.take() else {
            return;
        };
        let name = Expression::string(info.name.as_str());
        let location = Expression::string(info.location.as_str());

        let mut body = Vec::with_capacity(function.body.body.len() + 4);
        if self.enabled(Category::MethodEntry) {
            body.push(Statement::expression(hooks::call(
                hooks::METHOD_ENTRY,
                vec![name.clone(), Expression::identifier("arguments"), location.clone()],
            )));
        }
        body.extend(frame.into_prologue());
        body.append(&mut function.body.body);
        if self.enabled(Category::MethodExit) {
            body.push(Statement::expression(hooks::call(
                hooks::METHOD_EXIT,
                vec![name, Expression::void_zero(), location],
            )));
        }
        function.body.body = body;
    }

    fn leave_function_declaration(&mut self, node: Function) -> Statement {
        if self.enabled(Category::FunctionDefined) {
            if let Some(id) = &node.id {
                let definition = Statement::expression(hooks::call(
                    hooks::FUNCTION_DEFINED,
                    vec![Expression::identifier(id.name.as_str()), self.location_literal(node.loc)],
                ));
                // The function's own frame is already closed; this is the enclosing scope.
                if let Some(frame) = self.scopes.current_mut() {
                    frame.deferred.push(definition);
                }
            }
        }
        Statement::FunctionDeclaration(node)
    }

    fn leave_return_statement(&mut self, mut node: ReturnStatement) -> Statement {
        if !self.enabled(Category::MethodExit) {
            return Statement::ReturnStatement(node);
        }
        if let Some(function) = self.scopes.current_function() {
            let value = node.argument.take().unwrap_or_else(Expression::void_zero);
            node.argument = Some(hooks::call(
                hooks::METHOD_EXIT,
                vec![
                    Expression::string(function.name.as_str()),
                    value,
                    Expression::string(function.location.as_str()),
                ],
            ));
        }
        Statement::ReturnStatement(node)
    }

    fn enter_assignment_expression(&mut self, node: &mut AssignmentExpression) {
        self.roles.mark(&node.left, Role::WriteTarget);
    }

    fn enter_update_expression(&mut self, node: &mut UpdateExpression) {
        self.roles.mark(&node.argument, Role::UpdateTarget);
    }

    fn enter_call_expression(&mut self, node: &mut CallExpression) {
        self.roles.mark(&node.callee, Role::MethodCallee);
    }

    fn enter_unary_expression(&mut self, node: &mut UnaryExpression) {
        if node.operator == UnaryOperator::Delete {
            self.roles.mark(&node.argument, Role::WriteTarget);
        }
    }

    fn enter_for_in_statement(&mut self, node: &mut ForInStatement) {
        if let ForInit::Expression(target) = &node.left {
            self.roles.mark(target, Role::WriteTarget);
        }
    }

    fn leave_array_expression(&mut self, _id: NodeId, node: ArrayExpression) -> Expression {
        let loc = node.loc;
        let node = Expression::ArrayExpression(node);
        if self.enabled(Category::Alloc) {
            self.alloc(node, "[]", loc)
        } else {
            node
        }
    }

    fn leave_object_expression(&mut self, _id: NodeId, node: ObjectExpression) -> Expression {
        let loc = node.loc;
        let node = Expression::ObjectExpression(node);
        if self.enabled(Category::Alloc) {
            self.alloc(node, "{}", loc)
        } else {
            node
        }
    }

    fn leave_new_expression(&mut self, _id: NodeId, node: CallExpression) -> Expression {
        let loc = node.loc;
        let node = Expression::NewExpression(node);
        if self.enabled(Category::Alloc) {
            self.alloc(node, "new", loc)
        } else {
            node
        }
    }

    fn leave_function_expression(&mut self, _id: NodeId, node: Function) -> Expression {
        let loc = node.loc;
        let mut expression = Expression::FunctionExpression(node);
        if self.enabled(Category::FunctionDefined) {
            expression =
                hooks::call(hooks::FUNCTION_DEFINED, vec![expression, self.location_literal(loc)]);
        }
        if self.enabled(Category::Alloc) {
            expression = self.alloc(expression, "function", loc);
        }
        expression
    }

    fn leave_member_expression(&mut self, id: NodeId, node: MemberExpression) -> Expression {
        // The flag must be consumed even when reads are not instrumented.
        if self.roles.take(id).is_some() || !self.enabled(Category::PropRead) {
            return Expression::MemberExpression(node);
        }
        let loc = self.location_literal(node.loc);
        let (object, key) = property_key(node);
        hooks::call(hooks::PROP_READ, vec![object, key, loc])
    }

    fn leave_assignment_expression(&mut self, _id: NodeId, node: AssignmentExpression) -> Expression {
        if !self.enabled(Category::PropWrite) {
            return Expression::AssignmentExpression(node);
        }
        let AssignmentExpression { operator, left, right, loc } = node;
        let member = match *left {
            Expression::MemberExpression(member) => member,
            left => {
                return Expression::AssignmentExpression(AssignmentExpression {
                    operator,
                    left: Box::new(left),
                    right,
                    loc,
                })
            }
        };
        let location = self.location_literal(loc);
        let (object, key) = property_key(member);

        let Some(binary) = operator.binary() else {
            return hooks::call(hooks::PROP_WRITE, vec![object, key, *right, location]);
        };
        let (object, object_again) = self.evaluate_once(object);
        let (key, key_again) = self.evaluate_once(key);
        let current = hooks::call(hooks::PROP_READ, vec![object_again, key_again, location.clone()]);
        hooks::call(
            hooks::PROP_OP_WRITE,
            vec![object, key, current, *right, Expression::string(binary.as_ref()), location],
        )
    }

    fn leave_update_expression(&mut self, _id: NodeId, node: UpdateExpression) -> Expression {
        if !self.enabled(Category::PropWrite) {
            return Expression::UpdateExpression(node);
        }
        let tag = Expression::string(update_tag(&node));
        let UpdateExpression { operator, prefix, argument, loc } = node;
        match *argument {
            Expression::MemberExpression(member) => {
                let (object, key) = property_key(member);
                hooks::call(hooks::PROP_UPDATE, vec![object, key, tag, self.location_literal(loc)])
            }
            argument => Expression::UpdateExpression(UpdateExpression {
                operator,
                prefix,
                argument: Box::new(argument),
                loc,
            }),
        }
    }

    fn leave_call_expression(&mut self, _id: NodeId, node: CallExpression) -> Expression {
        if !self.enabled(Category::Call) {
            return Expression::CallExpression(node);
        }
        let CallExpression { callee, arguments, loc } = node;
        let location = self.location_literal(loc);
        match *callee {
            Expression::MemberExpression(member) => {
                let (object, key) = property_key(member);
                hooks::call(hooks::PROP_CALL, vec![object, key, Expression::array(arguments), location])
            }
            callee => hooks::call(
                hooks::DIRECT_CALL,
                vec![Expression::this(), callee, Expression::array(arguments), location],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(source: &str) -> String {
        instrument_source(source, &InstrumentConfig::default().with_script_name("t.js")).unwrap()
    }

    fn instrument_with(source: &str, config: InstrumentConfig) -> String {
        instrument_source(source, &config.with_script_name("t.js")).unwrap()
    }

    #[test]
    fn test_allocations() {
        assert_eq!(
            instrument("var x = {};"),
            "var x = esprof$onObjectAlloc({}, \"{}\", \"t.js@1.8-1.10\");\n"
        );
        assert_eq!(
            instrument("[];"),
            "esprof$onObjectAlloc([], \"[]\", \"t.js@1.0-1.2\");\n"
        );
        assert_eq!(
            instrument("new F;"),
            "esprof$onObjectAlloc(new F(), \"new\", \"t.js@1.0-1.5\");\n"
        );
    }

    #[test]
    fn test_function_expression_alloc_is_outermost() {
        assert_eq!(
            instrument_with("var f = function () {};", InstrumentConfig::none().enable(Category::Alloc).enable(Category::FunctionDefined)),
            "var f = esprof$onObjectAlloc(esprof$onFunctionDefined(function () {}, \"t.js@1.8-1.22\"), \"function\", \"t.js@1.8-1.22\");\n"
        );
    }

    #[test]
    fn test_property_access() {
        assert_eq!(instrument("x.p;"), "esprof$onPropRead(x, \"p\", \"t.js@1.0-1.3\");\n");
        assert_eq!(instrument("x[k];"), "esprof$onPropRead(x, k, \"t.js@1.0-1.4\");\n");
        assert_eq!(instrument("x.p = 1;"), "esprof$onPropWrite(x, \"p\", 1, \"t.js@1.0-1.7\");\n");
        assert_eq!(
            instrument("x.n += 4;"),
            "esprof$onPropOpWrite(x, \"n\", esprof$onPropRead(x, \"n\", \"t.js@1.0-1.8\"), 4, \"+\", \"t.js@1.0-1.8\");\n"
        );
        assert_eq!(instrument("o.n++;"), "esprof$onPropUpdate(o, \"n\", \"x++\", \"t.js@1.0-1.5\");\n");
        assert_eq!(instrument("--o[i];"), "esprof$onPropUpdate(o, i, \"--x\", \"t.js@1.0-1.6\");\n");
    }

    #[test]
    fn test_nested_reads_are_wrapped_inside_out() {
        assert_eq!(
            instrument("a.b.c;"),
            "esprof$onPropRead(esprof$onPropRead(a, \"b\", \"t.js@1.0-1.3\"), \"c\", \"t.js@1.0-1.5\");\n"
        );
    }

    #[test]
    fn test_calls() {
        assert_eq!(instrument("f(1);"), "esprof$onDirectCall(this, f, [1], \"t.js@1.0-1.4\");\n");
        assert_eq!(instrument("o.m(a);"), "esprof$onPropCall(o, \"m\", [a], \"t.js@1.0-1.6\");\n");
    }

    #[test]
    fn test_roles_survive_disabled_categories() {
        let config = InstrumentConfig::none().enable(Category::PropRead);
        assert_eq!(instrument_with("x.f();", config.clone()), "x.f();\n");
        assert_eq!(instrument_with("x.f = 1;", config.clone()), "x.f = 1;\n");
        assert_eq!(instrument_with("x.f++;", config.clone()), "x.f++;\n");
        assert_eq!(instrument_with("delete x.f;", config.clone()), "delete x.f;\n");
        assert_eq!(instrument_with("for (x.f in o) {}", config), "for (x.f in o) {}\n");
    }

    #[test]
    fn test_compound_write_evaluates_object_once() {
        assert_eq!(
            instrument("f().n += 1;"),
            "var esprof$tmp0;\nesprof$onPropOpWrite(esprof$tmp0 = esprof$onDirectCall(this, f, [], \"t.js@1.0-1.3\"), \"n\", esprof$onPropRead(esprof$tmp0, \"n\", \"t.js@1.0-1.10\"), 1, \"+\", \"t.js@1.0-1.10\");\n"
        );
    }

    #[test]
    fn test_function_body() {
        assert_eq!(
            instrument("function f(a) {\n    return a;\n}"),
            "esprof$onFunctionDefined(f, \"t.js@1.0-3.1\");\n\
             function f(a) {\n    \
             esprof$onMethodEntry(\"f\", arguments, \"t.js@1.0-3.1\");\n    \
             return esprof$onMethodExit(\"f\", a, \"t.js@1.0-3.1\");\n    \
             esprof$onMethodExit(\"f\", void 0, \"t.js@1.0-3.1\");\n\
             }\n"
        );
    }

    #[test]
    fn test_nested_declaration_defers_to_enclosing_scope() {
        let config = InstrumentConfig::none().enable(Category::FunctionDefined);
        assert_eq!(
            instrument_with("var g = function () { return 1; function h() {} };", config),
            "var g = esprof$onFunctionDefined(function () {\n    \
             esprof$onFunctionDefined(h, \"t.js@1.32-1.47\");\n    \
             return 1;\n    \
             function h() {}\n\
             }, \"t.js@1.8-1.49\");\n"
        );
    }

    #[test]
    fn test_empty_return_uses_void() {
        let config = InstrumentConfig::none().enable(Category::MethodExit);
        assert_eq!(
            instrument_with("function f() { return; }", config),
            "function f() {\n    \
             return esprof$onMethodExit(\"f\", void 0, \"t.js@1.0-1.24\");\n    \
             esprof$onMethodExit(\"f\", void 0, \"t.js@1.0-1.24\");\n\
             }\n"
        );
    }

    #[test]
    fn test_anonymous_function_name() {
        let config = InstrumentConfig::none().enable(Category::MethodEntry);
        let output = instrument_with("(function () {})();", config);
        assert!(output.contains("esprof$onMethodEntry(\"<anonymous>\", arguments,"));
    }

    #[test]
    fn test_everything_disabled_is_identity() {
        let source = "var o = {n: [1, 2]};\nfunction f(x) { return x.n.length; }\no.n[0] += f(o);\nnew F(o.m(), delete o.n);";
        let program = parse(source, &ParseOptions::default()).unwrap();
        assert_eq!(instrument_with(source, InstrumentConfig::none()), print(&program));
    }

    #[test]
    fn test_parse_errors_surface_unmodified() {
        let err = instrument_source("var = 1;", &InstrumentConfig::default()).unwrap_err();
        let InstrumentError::Parse(err) = err else {
            panic!("expected a parse error");
        };
        assert_eq!((err.line, err.column), (1, 4));
    }

    #[test]
    fn test_estree_in_and_out() {
        let json = to_estree_json(&parse("x.p;", &ParseOptions::default()).unwrap()).unwrap();
        let output = instrument_estree(&json, &InstrumentConfig::default()).unwrap();
        let program = from_estree_json(&output).unwrap();
        assert_eq!(print(&program), "esprof$onPropRead(x, \"p\", \"<anonymous>@1.0-1.3\");\n");
        assert!(matches!(
            instrument_estree("{\"type\": \"Nope\"}", &InstrumentConfig::default()),
            Err(InstrumentError::Json(_))
        ));
    }

    #[test]
    fn test_switch_labels_and_regex() {
        assert_eq!(
            instrument("switch (o.p) { case 1: o.p = 2; }"),
            "switch (esprof$onPropRead(o, \"p\", \"t.js@1.8-1.11\")) {\n    case 1:\n        esprof$onPropWrite(o, \"p\", 2, \"t.js@1.23-1.30\");\n}\n"
        );
        assert_eq!(instrument("a: for (;;) { break a; }"), "a: for (;;) {\n    break a;\n}\n");
        assert_eq!(instrument("var r = /a+/g;"), "var r = /a+/g;\n");
    }

    #[test]
    fn test_estree_unsupported_nodes_pass_through() {
        let json = r#"{"type": "Program", "body": [
            {"type": "DebuggerStatement", "loc": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 9}}},
            {"type": "ExpressionStatement", "expression": {"type": "MemberExpression", "computed": false,
             "object": {"type": "Identifier", "name": "x"}, "property": {"type": "Identifier", "name": "p"}}}
        ]}"#;
        let config = InstrumentConfig::default().with_script_name("t.js");
        let output = instrument_estree(json, &config).unwrap();

        let input: serde_json::Value = serde_json::from_str(json).unwrap();
        let output: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(output["body"][0], input["body"][0]);
        assert_eq!(output["body"][1]["expression"]["callee"]["name"], "esprof$onPropRead");

        let switch = to_estree_json(&parse("switch (o.p) { case 1: o.p = 2; }", &ParseOptions::default()).unwrap()).unwrap();
        let output = from_estree_json(&instrument_estree(&switch, &config).unwrap()).unwrap();
        assert_eq!(
            print(&output),
            "switch (esprof$onPropRead(o, \"p\", \"t.js@1.8-1.11\")) {\n    case 1:\n        esprof$onPropWrite(o, \"p\", 2, \"t.js@1.23-1.30\");\n}\n"
        );
    }
}
