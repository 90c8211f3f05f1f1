//! Turns a tree back into source text.
//!
//! The output is meant to be re-parsed rather than read: parentheses are inserted purely from
//! operator precedence, string literals are always double-quoted, and blocks use four-space
//! indentation.

use std::fmt::Write;

use crate::ast::*;

const INDENT: &str = "    ";

mod prec {
    pub const SEQUENCE: u8 = 0;
    pub const ASSIGNMENT: u8 = 1;
    pub const CONDITIONAL: u8 = 2;
    pub const LOGICAL_OR: u8 = 3;
    pub const UNARY: u8 = 13;
    pub const POSTFIX: u8 = 14;
    pub const CALL: u8 = 15;
    pub const MEMBER: u8 = 16;
    pub const PRIMARY: u8 = 17;
}

/// Print a whole program.
pub fn print(program: &Program) -> String {
    let mut printer = Printer::default();
    for statement in &program.body {
        printer.statement(statement);
    }
    printer.out
}

/// Print a single expression, as it would appear on the right of an assignment.
pub fn print_expression(expression: &Expression) -> String {
    let mut printer = Printer::default();
    printer.expression(expression, prec::ASSIGNMENT);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

fn binary_precedence(operator: BinaryOperator) -> u8 {
    use BinaryOperator::*;
    match operator {
        BitOr => 5,
        BitXor => 6,
        BitAnd => 7,
        Eq | NotEq | StrictEq | StrictNotEq => 8,
        Lt | LtEq | Gt | GtEq | In | Instanceof => 9,
        Shl | Shr | UShr => 10,
        Add | Sub => 11,
        Mul | Div | Rem => 12,
    }
}

fn precedence(expression: &Expression) -> u8 {
    match expression {
        Expression::SequenceExpression(_) => prec::SEQUENCE,
        Expression::AssignmentExpression(_) => prec::ASSIGNMENT,
        Expression::ConditionalExpression(_) => prec::CONDITIONAL,
        Expression::LogicalExpression(node) => match node.operator {
            LogicalOperator::Or => prec::LOGICAL_OR,
            LogicalOperator::And => prec::LOGICAL_OR + 1,
        },
        Expression::BinaryExpression(node) => binary_precedence(node.operator),
        Expression::UnaryExpression(_) | Expression::Raw(_) => prec::UNARY,
        Expression::UpdateExpression(node) if node.prefix => prec::UNARY,
        Expression::UpdateExpression(_) => prec::POSTFIX,
        Expression::CallExpression(_) => prec::CALL,
        Expression::NewExpression(_) | Expression::MemberExpression(_) => prec::MEMBER,
        Expression::Literal(Literal { value: LiteralValue::Number(n), .. })
            if n.is_sign_negative() && *n != 0.0 =>
        {
            prec::UNARY
        }
        _ => prec::PRIMARY,
    }
}

/// Whether a call appears in the member chain of `expression`, which would let a `new`
/// callee capture the wrong argument list.
fn has_call(expression: &Expression) -> bool {
    match expression {
        Expression::CallExpression(_) => true,
        Expression::MemberExpression(node) => has_call(&node.object),
        _ => false,
    }
}

/// Whether the printed expression would begin with `{` or `function`, which an expression
/// statement cannot.
fn starts_ambiguously(expression: &Expression) -> bool {
    match expression {
        Expression::ObjectExpression(_) | Expression::FunctionExpression(_) => true,
        Expression::CallExpression(node) => {
            precedence(&node.callee) >= prec::CALL && starts_ambiguously(&node.callee)
        }
        Expression::MemberExpression(node) => {
            precedence(&node.object) >= prec::CALL && starts_ambiguously(&node.object)
        }
        Expression::BinaryExpression(BinaryExpression { left, .. })
        | Expression::LogicalExpression(LogicalExpression { left, .. })
        | Expression::AssignmentExpression(AssignmentExpression { left, .. }) => {
            starts_ambiguously(left)
        }
        Expression::ConditionalExpression(node) => starts_ambiguously(&node.test),
        Expression::SequenceExpression(node) => node.expressions.first().is_some_and(starts_ambiguously),
        Expression::UpdateExpression(node) if !node.prefix => starts_ambiguously(&node.argument),
        _ => false,
    }
}

/// Whether an unparenthesized `in` operator occurs, which a `for` head would misread.
fn contains_in(expression: &Expression) -> bool {
    match expression {
        Expression::BinaryExpression(node) => {
            node.operator == BinaryOperator::In || contains_in(&node.left) || contains_in(&node.right)
        }
        Expression::LogicalExpression(LogicalExpression { left, right, .. })
        | Expression::AssignmentExpression(AssignmentExpression { left, right, .. }) => {
            contains_in(left) || contains_in(right)
        }
        Expression::ConditionalExpression(node) => contains_in(&node.test),
        Expression::SequenceExpression(node) => node.expressions.iter().any(contains_in),
        Expression::UnaryExpression(node) => contains_in(&node.argument),
        _ => false,
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\u{2028}' => quoted.push_str("\\u2028"),
            '\u{2029}' => quoted.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                let _ = write!(quoted, "\\x{:02x}", c as u32);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn statement(&mut self, statement: &Statement) {
        self.line_start();
        self.statement_inline(statement);
        self.out.push('\n');
    }

    /// Print a statement whose indentation has already been written, without a final newline.
    fn statement_inline(&mut self, statement: &Statement) {
        match statement {
            Statement::ExpressionStatement(node) => {
                if starts_ambiguously(&node.expression) {
                    self.out.push('(');
                    self.expression(&node.expression, prec::SEQUENCE);
                    self.out.push(')');
                } else {
                    self.expression(&node.expression, prec::SEQUENCE);
                }
                self.out.push(';');
            }
            Statement::VariableDeclaration(node) => {
                self.variable_declaration(node, false);
                self.out.push(';');
            }
            Statement::FunctionDeclaration(function) => self.function(function),
            Statement::ReturnStatement(node) => {
                self.out.push_str("return");
                if let Some(argument) = &node.argument {
                    self.out.push(' ');
                    self.expression(argument, prec::SEQUENCE);
                }
                self.out.push(';');
            }
            Statement::IfStatement(node) => {
                self.out.push_str("if (");
                self.expression(&node.test, prec::SEQUENCE);
                self.out.push(')');
                self.body(&node.consequent);
                if let Some(alternate) = &node.alternate {
                    if matches!(*node.consequent, Statement::BlockStatement(_)) {
                        self.out.push(' ');
                    } else {
                        self.out.push('\n');
                        self.line_start();
                    }
                    self.out.push_str("else");
                    if matches!(**alternate, Statement::IfStatement(_)) {
                        self.out.push(' ');
                        self.statement_inline(alternate);
                    } else {
                        self.body(alternate);
                    }
                }
            }
            Statement::BlockStatement(block) => self.block(block),
            Statement::ForStatement(node) => {
                self.out.push_str("for (");
                if let Some(init) = &node.init {
                    self.for_init(init);
                }
                self.out.push(';');
                if let Some(test) = &node.test {
                    self.out.push(' ');
                    self.expression(test, prec::SEQUENCE);
                }
                self.out.push(';');
                if let Some(update) = &node.update {
                    self.out.push(' ');
                    self.expression(update, prec::SEQUENCE);
                }
                self.out.push(')');
                self.body(&node.body);
            }
            Statement::ForInStatement(node) => {
                self.out.push_str("for (");
                self.for_init(&node.left);
                self.out.push_str(" in ");
                self.expression(&node.right, prec::SEQUENCE);
                self.out.push(')');
                self.body(&node.body);
            }
            Statement::WhileStatement(node) => {
                self.out.push_str("while (");
                self.expression(&node.test, prec::SEQUENCE);
                self.out.push(')');
                self.body(&node.body);
            }
            Statement::DoWhileStatement(node) => {
                self.out.push_str("do");
                self.body(&node.body);
                if matches!(*node.body, Statement::BlockStatement(_)) {
                    self.out.push(' ');
                } else {
                    self.out.push('\n');
                    self.line_start();
                }
                self.out.push_str("while (");
                self.expression(&node.test, prec::SEQUENCE);
                self.out.push_str(");");
            }
            Statement::BreakStatement(node) => self.jump("break", node),
            Statement::ContinueStatement(node) => self.jump("continue", node),
            Statement::ThrowStatement(node) => {
                self.out.push_str("throw ");
                self.expression(&node.argument, prec::SEQUENCE);
                self.out.push(';');
            }
            Statement::TryStatement(node) => {
                self.out.push_str("try ");
                self.block(&node.block);
                if let Some(handler) = &node.handler {
                    let _ = write!(self.out, " catch ({}) ", handler.param.name);
                    self.block(&handler.body);
                }
                if let Some(finalizer) = &node.finalizer {
                    self.out.push_str(" finally ");
                    self.block(finalizer);
                }
            }
            Statement::EmptyStatement(_) => self.out.push(';'),
            Statement::SwitchStatement(node) => {
                self.out.push_str("switch (");
                self.expression(&node.discriminant, prec::SEQUENCE);
                self.out.push_str(") {\n");
                self.indent += 1;
                for case in &node.cases {
                    self.line_start();
                    match &case.test {
                        Some(test) => {
                            self.out.push_str("case ");
                            self.expression(test, prec::SEQUENCE);
                            self.out.push_str(":\n");
                        }
                        None => self.out.push_str("default:\n"),
                    }
                    self.indent += 1;
                    for statement in &case.consequent {
                        self.statement(statement);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.line_start();
                self.out.push('}');
            }
            Statement::LabeledStatement(node) => {
                let _ = write!(self.out, "{}: ", node.label.name);
                self.statement_inline(&node.body);
            }
            Statement::Raw(node) => {
                let _ = write!(self.out, "/* {} */;", node.kind());
            }
        }
    }

    fn jump(&mut self, keyword: &str, node: &JumpStatement) {
        self.out.push_str(keyword);
        if let Some(label) = node.label() {
            self.out.push(' ');
            self.out.push_str(label);
        }
        self.out.push(';');
    }

    /// The body of a compound statement: blocks stay on the same line, anything else is
    /// indented on the next one.
    fn body(&mut self, statement: &Statement) {
        if let Statement::BlockStatement(block) = statement {
            self.out.push(' ');
            self.block(block);
        } else {
            self.out.push('\n');
            self.indent += 1;
            self.line_start();
            self.statement_inline(statement);
            self.indent -= 1;
        }
    }

    fn block(&mut self, block: &BlockStatement) {
        if block.body.is_empty() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.indent += 1;
        for statement in &block.body {
            self.statement(statement);
        }
        self.indent -= 1;
        self.line_start();
        self.out.push('}');
    }

    fn for_init(&mut self, init: &ForInit) {
        match init {
            ForInit::VariableDeclaration(declaration) => self.variable_declaration(declaration, true),
            ForInit::Expression(expression) => {
                if contains_in(expression) {
                    self.out.push('(');
                    self.expression(expression, prec::SEQUENCE);
                    self.out.push(')');
                } else {
                    self.expression(expression, prec::SEQUENCE);
                }
            }
        }
    }

    fn variable_declaration(&mut self, declaration: &VariableDeclaration, in_for_head: bool) {
        self.out.push_str(declaration.kind.as_ref());
        self.out.push(' ');
        for (i, declarator) in declaration.declarations.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&declarator.id.name);
            if let Some(init) = &declarator.init {
                self.out.push_str(" = ");
                if in_for_head && contains_in(init) {
                    self.out.push('(');
                    self.expression(init, prec::SEQUENCE);
                    self.out.push(')');
                } else {
                    self.expression(init, prec::ASSIGNMENT);
                }
            }
        }
    }

    fn function(&mut self, function: &Function) {
        self.out.push_str("function ");
        if let Some(id) = &function.id {
            self.out.push_str(&id.name);
        }
        self.out.push('(');
        for (i, param) in function.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&param.name);
        }
        self.out.push_str(") ");
        self.block(&function.body);
    }

    fn expression_list(&mut self, expressions: &[Expression]) {
        for (i, expression) in expressions.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expression(expression, prec::ASSIGNMENT);
        }
    }

    fn expression(&mut self, expression: &Expression, min_prec: u8) {
        let parenthesize = precedence(expression) < min_prec;
        if parenthesize {
            self.out.push('(');
        }
        self.expression_unparenthesized(expression);
        if parenthesize {
            self.out.push(')');
        }
    }

    fn expression_unparenthesized(&mut self, expression: &Expression) {
        match expression {
            Expression::Identifier(ident) => self.out.push_str(&ident.name),
            Expression::Literal(Literal { regex: Some(regex), .. }) => {
                let _ = write!(self.out, "/{}/{}", regex.pattern, regex.flags);
            }
            Expression::Raw(node) => {
                let _ = write!(self.out, "void 0 /* {} */", node.kind());
            }
            Expression::Literal(literal) => match &literal.value {
                LiteralValue::Null => self.out.push_str("null"),
                LiteralValue::Boolean(b) => {
                    let _ = write!(self.out, "{b}");
                }
                LiteralValue::Number(n) => self.out.push_str(&format_number(*n)),
                LiteralValue::String(s) => self.out.push_str(&quote(s)),
            },
            Expression::ThisExpression(_) => self.out.push_str("this"),
            Expression::ArrayExpression(node) => {
                self.out.push('[');
                for (i, element) in node.elements.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    if let Some(element) = element {
                        self.expression(element, prec::ASSIGNMENT);
                    }
                }
                // A trailing hole needs its own comma to survive.
                if matches!(node.elements.last(), Some(None)) {
                    self.out.push(',');
                }
                self.out.push(']');
            }
            Expression::ObjectExpression(node) => {
                self.out.push('{');
                for (i, property) in node.properties.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    match &property.key {
                        Expression::Identifier(ident) => self.out.push_str(&ident.name),
                        Expression::Literal(Literal { value: LiteralValue::String(s), .. }) => {
                            self.out.push_str(&quote(s))
                        }
                        key => match property.key_name() {
                            Some(name) => self.out.push_str(&quote(&name)),
                            None => self.expression(key, prec::ASSIGNMENT),
                        },
                    }
                    self.out.push_str(": ");
                    self.expression(&property.value, prec::ASSIGNMENT);
                }
                self.out.push('}');
            }
            Expression::FunctionExpression(function) => self.function(function),
            Expression::UnaryExpression(node) => {
                let operator = node.operator.as_ref();
                self.out.push_str(operator);
                let needs_space = match operator {
                    "-" | "+" => {
                        let mut argument = Printer::default();
                        argument.expression(&node.argument, prec::UNARY);
                        argument.out.starts_with(operator)
                    }
                    "!" | "~" => false,
                    _ => true,
                };
                if needs_space {
                    self.out.push(' ');
                }
                self.expression(&node.argument, prec::UNARY);
            }
            Expression::UpdateExpression(node) => {
                if node.prefix {
                    self.out.push_str(node.operator.as_ref());
                    self.expression(&node.argument, prec::UNARY);
                } else {
                    self.expression(&node.argument, prec::CALL);
                    self.out.push_str(node.operator.as_ref());
                }
            }
            Expression::BinaryExpression(node) => {
                let p = binary_precedence(node.operator);
                self.expression(&node.left, p);
                let _ = write!(self.out, " {} ", node.operator);
                self.expression(&node.right, p + 1);
            }
            Expression::LogicalExpression(node) => {
                let p = precedence(expression);
                self.expression(&node.left, p);
                let _ = write!(self.out, " {} ", node.operator);
                self.expression(&node.right, p + 1);
            }
            Expression::AssignmentExpression(node) => {
                self.expression(&node.left, prec::CALL);
                let _ = write!(self.out, " {} ", node.operator);
                self.expression(&node.right, prec::ASSIGNMENT);
            }
            Expression::ConditionalExpression(node) => {
                self.expression(&node.test, prec::LOGICAL_OR);
                self.out.push_str(" ? ");
                self.expression(&node.consequent, prec::ASSIGNMENT);
                self.out.push_str(" : ");
                self.expression(&node.alternate, prec::ASSIGNMENT);
            }
            Expression::CallExpression(node) => {
                self.expression(&node.callee, prec::CALL);
                self.out.push('(');
                self.expression_list(&node.arguments);
                self.out.push(')');
            }
            Expression::NewExpression(node) => {
                self.out.push_str("new ");
                if has_call(&node.callee) || precedence(&node.callee) < prec::MEMBER {
                    self.out.push('(');
                    self.expression_unparenthesized(&node.callee);
                    self.out.push(')');
                } else {
                    self.expression_unparenthesized(&node.callee);
                }
                self.out.push('(');
                self.expression_list(&node.arguments);
                self.out.push(')');
            }
            Expression::MemberExpression(node) => {
                let numeric_object =
                    matches!(*node.object, Expression::Literal(Literal { value: LiteralValue::Number(_), .. }));
                if numeric_object {
                    self.out.push('(');
                    self.expression_unparenthesized(&node.object);
                    self.out.push(')');
                } else {
                    self.expression(&node.object, prec::CALL);
                }
                if node.computed {
                    self.out.push('[');
                    self.expression(&node.property, prec::SEQUENCE);
                    self.out.push(']');
                } else if let Expression::Identifier(ident) = &*node.property {
                    self.out.push('.');
                    self.out.push_str(&ident.name);
                } else {
                    self.out.push('[');
                    self.expression(&node.property, prec::SEQUENCE);
                    self.out.push(']');
                }
            }
            Expression::SequenceExpression(node) => {
                for (i, expression) in node.expressions.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expression(expression, prec::ASSIGNMENT);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse, ParseOptions};

    fn reprint(source: &str) -> String {
        print(&parse(source, &ParseOptions::default()).unwrap())
    }

    #[test]
    fn test_print_statements() {
        let printed = reprint("function f(a,b){if(a){return b}else if(b)return;else{a=1}}");
        assert_eq!(
            printed,
            "function f(a, b) {\n    if (a) {\n        return b;\n    } else if (b)\n        return;\n    else {\n        a = 1;\n    }\n}\n"
        );
    }

    #[test]
    fn test_parenthesizes_by_precedence() {
        assert_eq!(reprint("(a + b) * c - (d - e);"), "(a + b) * c - (d - e);\n");
        assert_eq!(reprint("x = (1, 2);"), "x = (1, 2);\n");
        assert_eq!(reprint("f((a, b));"), "f((a, b));\n");
        assert_eq!(reprint("- -x; -(-1); +(+y);"), "- -x;\n- -1;\n+ +y;\n");
        assert_eq!(reprint("new (f())(); new (a.b().c)(); new a.b.C();"), "new (f())();\nnew (a.b().c)();\nnew a.b.C();\n");
        assert_eq!(reprint("(a ? b : c).d;"), "(a ? b : c).d;\n");
    }

    #[test]
    fn test_statement_level_parens() {
        assert_eq!(reprint("(function () {})();"), "(function () {}());\n");
        assert_eq!(reprint("({a: 1}).a;"), "({a: 1}.a);\n");
    }

    #[test]
    fn test_literals() {
        assert_eq!(reprint("['a\"\\n', , 1.5, null, true,];"), "[\"a\\\"\\n\", , 1.5, null, true];\n");
        assert_eq!(reprint("[1, ,];"), "[1, ,];\n");
        assert_eq!(reprint("x = {'a b': 1, 2: 3};"), "x = {\"a b\": 1, \"2\": 3};\n");
    }

    #[test]
    fn test_for_heads() {
        assert_eq!(reprint("for (var i = 0; i < 3; i++) x();"), "for (var i = 0; i < 3; i++)\n    x();\n");
        assert_eq!(reprint("for (k in o) {}"), "for (k in o) {}\n");
        assert_eq!(reprint("for (;;) {}"), "for (;;) {}\n");
        assert_eq!(reprint("for (x = (a in b); x;) {}"), "for ((x = a in b); x;) {}\n");
    }

    #[test]
    fn test_switch_labels_and_regex() {
        assert_eq!(
            reprint("a:while(1){switch(x){case 1:case 2:y=/[/]b/gi;break a;default:continue a}}"),
            "a: while (1) {\n    switch (x) {\n        case 1:\n        case 2:\n            y = /[/]b/gi;\n            break a;\n        default:\n            continue a;\n    }\n}\n"
        );
        assert_eq!(reprint("switch (x) {}"), "switch (x) {\n}\n");
    }

    #[test]
    fn test_unsupported_nodes_are_marked() {
        let json = r#"{"type":"Program","body":[
            {"type":"DebuggerStatement"},
            {"type":"ExpressionStatement","expression":{"type":"ArrowFunctionExpression","params":[],"body":{"type":"BlockStatement","body":[]}}}
        ]}"#;
        let program = crate::from_estree_json(json).unwrap();
        assert_eq!(print(&program), "/* DebuggerStatement */;\nvoid 0 /* ArrowFunctionExpression */;\n");
    }

    #[test]
    fn test_reparse_is_stable() {
        let source = "var o = {f: function (n) { return n <= 1 ? 1 : n * this.f(n - 1); }};\ntry { o.f(3); } catch (e) { throw e; } finally { o = null; }\ndo x++; while (x < 3);";
        let once = reprint(source);
        assert_eq!(reprint(&once), once);
    }
}
