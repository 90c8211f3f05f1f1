use std::rc::Rc;

use esprof_syntax::*;

use super::{
    scope::{self, Scope, ScopeRef},
    Frame, Interpreter,
};
use crate::{
    error::{Result, RuntimeError},
    value::Value,
};

/// How a statement finished. Jumps carry their target label, if any.
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

/// Whether a jump to `label` ends at a statement carrying `labels`.
fn targets(label: &Option<String>, labels: &[String]) -> bool {
    label.as_ref().map_or(true, |label| labels.contains(label))
}

/// After a loop body completed: `None` to run the next iteration, otherwise the completion
/// of the loop itself.
fn loop_exit(completion: Completion, labels: &[String]) -> Option<Completion> {
    match completion {
        Completion::Normal => None,
        Completion::Continue(label) if targets(&label, labels) => None,
        Completion::Break(label) if targets(&label, labels) => Some(Completion::Normal),
        abrupt => Some(abrupt),
    }
}

fn unsupported(kind: &str, loc: Option<SourceLocation>) -> RuntimeError {
    let start = loc.unwrap_or_default().start;
    ParseError::new(format!("unsupported syntax: {kind}"), start.line, start.column).into()
}

/// An assignable location.
enum Reference {
    Binding(String),
    Property(Value, String),
}

/// Collect `var` names and function declarations of a body, without entering nested
/// functions.
fn collect_declarations<'a>(
    body: &'a [Statement],
    vars: &mut Vec<&'a str>,
    functions: &mut Vec<&'a Function>,
) {
    for statement in body {
        collect_statement(statement, vars, functions);
    }
}

fn collect_statement<'a>(
    statement: &'a Statement,
    vars: &mut Vec<&'a str>,
    functions: &mut Vec<&'a Function>,
) {
    match statement {
        Statement::VariableDeclaration(node) => {
            vars.extend(node.declarations.iter().map(|d| d.id.name.as_str()));
        }
        Statement::FunctionDeclaration(node) => functions.push(node),
        Statement::IfStatement(node) => {
            collect_statement(&node.consequent, vars, functions);
            if let Some(alternate) = &node.alternate {
                collect_statement(alternate, vars, functions);
            }
        }
        Statement::BlockStatement(node) => collect_declarations(&node.body, vars, functions),
        Statement::ForStatement(node) => {
            if let Some(ForInit::VariableDeclaration(declaration)) = &node.init {
                vars.extend(declaration.declarations.iter().map(|d| d.id.name.as_str()));
            }
            collect_statement(&node.body, vars, functions);
        }
        Statement::ForInStatement(node) => {
            if let ForInit::VariableDeclaration(declaration) = &node.left {
                vars.extend(declaration.declarations.iter().map(|d| d.id.name.as_str()));
            }
            collect_statement(&node.body, vars, functions);
        }
        Statement::SwitchStatement(node) => {
            for case in &node.cases {
                collect_declarations(&case.consequent, vars, functions);
            }
        }
        Statement::LabeledStatement(node) => collect_statement(&node.body, vars, functions),
        Statement::WhileStatement(node) => collect_statement(&node.body, vars, functions),
        Statement::DoWhileStatement(node) => collect_statement(&node.body, vars, functions),
        Statement::TryStatement(node) => {
            collect_declarations(&node.block.body, vars, functions);
            if let Some(handler) = &node.handler {
                collect_declarations(&handler.body.body, vars, functions);
            }
            if let Some(finalizer) = &node.finalizer {
                collect_declarations(&finalizer.body, vars, functions);
            }
        }
        _ => {}
    }
}

impl Interpreter {
    /// Declare the variables and bind the functions a body declares.
    pub(crate) fn hoist(&self, body: &[Statement], scope: &ScopeRef) {
        let mut vars = Vec::new();
        let mut functions = Vec::new();
        collect_declarations(body, &mut vars, &mut functions);
        for name in vars {
            scope.borrow_mut().declare(name);
        }
        for function in functions {
            let Some(name) = function.name() else {
                continue;
            };
            let object = self.make_function(Rc::new(function.clone()), scope.clone());
            scope.borrow_mut().define(name, object.into());
        }
    }

    pub(crate) fn exec_block(&mut self, body: &[Statement], frame: &Frame) -> Result<Completion> {
        for statement in body {
            match self.exec(statement, frame)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    pub(crate) fn exec(&mut self, statement: &Statement, frame: &Frame) -> Result<Completion> {
        self.exec_labeled(statement, &[], frame)
    }

    /// Run `statement`, which carries `labels` when it is the body of labeled statements.
    fn exec_labeled(
        &mut self,
        statement: &Statement,
        labels: &[String],
        frame: &Frame,
    ) -> Result<Completion> {
        match statement {
            Statement::ExpressionStatement(node) => {
                self.evaluate(&node.expression, frame)?;
            }
            Statement::VariableDeclaration(node) => self.declare(node, frame)?,
            // Bound when the enclosing scope was entered.
            Statement::FunctionDeclaration(_) => {}
            Statement::ReturnStatement(node) => {
                let value = match &node.argument {
                    Some(argument) => self.evaluate(argument, frame)?,
                    None => Value::Undefined,
                };
                return Ok(Completion::Return(value));
            }
            Statement::IfStatement(node) => {
                if self.evaluate(&node.test, frame)?.truthy() {
                    return self.exec(&node.consequent, frame);
                }
                if let Some(alternate) = &node.alternate {
                    return self.exec(alternate, frame);
                }
            }
            Statement::BlockStatement(node) => return self.exec_block(&node.body, frame),
            Statement::ForStatement(node) => {
                match &node.init {
                    Some(ForInit::VariableDeclaration(declaration)) => self.declare(declaration, frame)?,
                    Some(ForInit::Expression(init)) => {
                        self.evaluate(init, frame)?;
                    }
                    None => {}
                }
                loop {
                    if let Some(test) = &node.test {
                        if !self.evaluate(test, frame)?.truthy() {
                            break;
                        }
                    }
                    if let Some(completion) = loop_exit(self.exec(&node.body, frame)?, labels) {
                        return Ok(completion);
                    }
                    if let Some(update) = &node.update {
                        self.evaluate(update, frame)?;
                    }
                }
            }
            Statement::ForInStatement(node) => return self.for_in(node, labels, frame),
            Statement::WhileStatement(node) => {
                while self.evaluate(&node.test, frame)?.truthy() {
                    if let Some(completion) = loop_exit(self.exec(&node.body, frame)?, labels) {
                        return Ok(completion);
                    }
                }
            }
            Statement::DoWhileStatement(node) => loop {
                if let Some(completion) = loop_exit(self.exec(&node.body, frame)?, labels) {
                    return Ok(completion);
                }
                if !self.evaluate(&node.test, frame)?.truthy() {
                    break;
                }
            },
            Statement::BreakStatement(node) => {
                return Ok(Completion::Break(node.label().map(str::to_string)))
            }
            Statement::ContinueStatement(node) => {
                return Ok(Completion::Continue(node.label().map(str::to_string)))
            }
            Statement::ThrowStatement(node) => {
                let value = self.evaluate(&node.argument, frame)?;
                return Err(RuntimeError::Thrown(value));
            }
            Statement::TryStatement(node) => return self.try_statement(node, frame),
            Statement::EmptyStatement(_) => {}
            Statement::SwitchStatement(node) => return self.switch_statement(node, frame),
            Statement::LabeledStatement(node) => {
                let mut labels = labels.to_vec();
                labels.push(node.label.name.clone());
                return match self.exec_labeled(&node.body, &labels, frame)? {
                    Completion::Break(Some(label)) if label == node.label.name => {
                        Ok(Completion::Normal)
                    }
                    completion => Ok(completion),
                };
            }
            Statement::Raw(node) => return Err(unsupported(node.kind(), node.loc())),
        }
        Ok(Completion::Normal)
    }

    /// Runs the clauses from the first `case` strictly equal to the discriminant, or from
    /// `default`, falling through until a `break`.
    fn switch_statement(&mut self, node: &SwitchStatement, frame: &Frame) -> Result<Completion> {
        let discriminant = self.evaluate(&node.discriminant, frame)?;
        let mut matched = None;
        for (i, case) in node.cases.iter().enumerate() {
            let Some(test) = &case.test else {
                continue;
            };
            if self.evaluate(test, frame)?.strict_equals(&discriminant) {
                matched = Some(i);
                break;
            }
        }
        let Some(first) = matched.or_else(|| node.cases.iter().position(|case| case.test.is_none()))
        else {
            return Ok(Completion::Normal);
        };
        for case in &node.cases[first..] {
            match self.exec_block(&case.consequent, frame)? {
                Completion::Normal => {}
                Completion::Break(None) => break,
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn declare(&mut self, declaration: &VariableDeclaration, frame: &Frame) -> Result<()> {
        for declarator in &declaration.declarations {
            if let Some(init) = &declarator.init {
                let value = self.evaluate(init, frame)?;
                scope::assign(&frame.scope, &declarator.id.name, value);
            }
        }
        Ok(())
    }

    fn for_in(
        &mut self,
        node: &ForInStatement,
        labels: &[String],
        frame: &Frame,
    ) -> Result<Completion> {
        let object = self.evaluate(&node.right, frame)?;
        let keys = match &object {
            Value::Object(object) => object.enumerable_keys(),
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        for key in keys {
            // Keys deleted by an earlier iteration are skipped.
            if object.as_object().is_some_and(|o| !o.has(&key)) {
                continue;
            }
            match &node.left {
                ForInit::VariableDeclaration(declaration) => {
                    if let Some(declarator) = declaration.declarations.first() {
                        scope::assign(&frame.scope, &declarator.id.name, key.into());
                    }
                }
                ForInit::Expression(target) => {
                    let reference = self.reference(target, frame)?;
                    self.put_reference(&reference, key.into(), frame)?;
                }
            }
            if let Some(completion) = loop_exit(self.exec(&node.body, frame)?, labels) {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal)
    }

    fn try_statement(&mut self, node: &TryStatement, frame: &Frame) -> Result<Completion> {
        let mut result = self.exec_block(&node.block.body, frame);
        if let Some(handler) = &node.handler {
            if let Err(error) = result {
                result = match self.catch_value(error) {
                    Ok(value) => {
                        let scope = Scope::child(&frame.scope);
                        scope.borrow_mut().define(&handler.param.name, value);
                        let inner = Frame { scope, this: frame.this.clone() };
                        self.exec_block(&handler.body.body, &inner)
                    }
                    Err(error) => Err(error),
                };
            }
        }
        if let Some(finalizer) = &node.finalizer {
            let completion = self.exec_block(&finalizer.body, frame)?;
            // Fatal errors outlive an abrupt `finally`.
            if let Err(error) = &result {
                if !error.is_catchable() {
                    return result;
                }
            }
            if !matches!(completion, Completion::Normal) {
                return Ok(completion);
            }
        }
        result
    }

    pub(crate) fn evaluate(&mut self, expression: &Expression, frame: &Frame) -> Result<Value> {
        super::with_stack(|| self.evaluate_expression(expression, frame))
    }

    fn evaluate_expression(&mut self, expression: &Expression, frame: &Frame) -> Result<Value> {
        match expression {
            Expression::Identifier(node) => scope::lookup(&frame.scope, &node.name)
                .ok_or_else(|| RuntimeError::Reference(node.name.clone())),
            Expression::Literal(Literal { regex: Some(regex), .. }) => {
                self.new_regexp(&regex.pattern, &regex.flags)
            }
            Expression::Literal(node) => Ok(match &node.value {
                LiteralValue::Null => Value::Null,
                LiteralValue::Boolean(b) => Value::Boolean(*b),
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::String(s) => Value::String(s.clone()),
            }),
            Expression::ThisExpression(_) => Ok(frame.this.clone()),
            Expression::ArrayExpression(node) => {
                let mut elements = Vec::with_capacity(node.elements.len());
                for element in &node.elements {
                    elements.push(match element {
                        Some(element) => self.evaluate(element, frame)?,
                        None => Value::Undefined,
                    });
                }
                Ok(self.new_array(elements).into())
            }
            Expression::ObjectExpression(node) => {
                let object = self.new_object();
                for property in &node.properties {
                    let key = match property.key_name() {
                        Some(key) if !property.computed => key,
                        _ => {
                            let key = self.evaluate(&property.key, frame)?;
                            self.coerce_string(&key)?
                        }
                    };
                    let value = self.evaluate(&property.value, frame)?;
                    object.borrow_mut().set(key, value);
                }
                Ok(object.into())
            }
            Expression::FunctionExpression(node) => {
                let Some(name) = node.name() else {
                    return Ok(self.make_function(Rc::new(node.clone()), frame.scope.clone()).into());
                };
                // A named function expression can refer to itself by name.
                let scope = Scope::child(&frame.scope);
                let function = self.make_function(Rc::new(node.clone()), scope.clone());
                scope.borrow_mut().define(name, function.clone().into());
                Ok(function.into())
            }
            Expression::UnaryExpression(node) => self.unary(node, frame),
            Expression::UpdateExpression(node) => {
                let reference = self.reference(&node.argument, frame)?;
                let current = self.get_reference(&reference, frame)?;
                let old = self.coerce_number(&current)?;
                let new = match node.operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.put_reference(&reference, Value::Number(new), frame)?;
                Ok(Value::Number(if node.prefix { new } else { old }))
            }
            Expression::BinaryExpression(node) => {
                let left = self.evaluate(&node.left, frame)?;
                let right = self.evaluate(&node.right, frame)?;
                self.binary(node.operator, left, right)
            }
            Expression::LogicalExpression(node) => {
                let left = self.evaluate(&node.left, frame)?;
                let short_circuit = match node.operator {
                    LogicalOperator::Or => left.truthy(),
                    LogicalOperator::And => !left.truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(&node.right, frame)
                }
            }
            Expression::AssignmentExpression(node) => {
                let reference = self.reference(&node.left, frame)?;
                let value = match node.operator.binary() {
                    None => self.evaluate(&node.right, frame)?,
                    Some(operator) => {
                        let current = self.get_reference(&reference, frame)?;
                        let operand = self.evaluate(&node.right, frame)?;
                        self.binary(operator, current, operand)?
                    }
                };
                self.put_reference(&reference, value.clone(), frame)?;
                Ok(value)
            }
            Expression::ConditionalExpression(node) => {
                if self.evaluate(&node.test, frame)?.truthy() {
                    self.evaluate(&node.consequent, frame)
                } else {
                    self.evaluate(&node.alternate, frame)
                }
            }
            Expression::CallExpression(node) => {
                let (callee, this) = match &*node.callee {
                    Expression::MemberExpression(member) => {
                        let object = self.evaluate(&member.object, frame)?;
                        let key = self.member_key(member, frame)?;
                        (self.get_property(&object, &key)?, object)
                    }
                    callee => (self.evaluate(callee, frame)?, Value::Undefined),
                };
                let args = self.arguments(&node.arguments, frame)?;
                if !callee.is_callable() {
                    return Err(RuntimeError::Type(format!(
                        "{} is not a function",
                        print_expression(&node.callee)
                    )));
                }
                self.call_function(&callee, this, args)
            }
            Expression::NewExpression(node) => {
                let callee = self.evaluate(&node.callee, frame)?;
                let args = self.arguments(&node.arguments, frame)?;
                if !callee.is_callable() {
                    return Err(RuntimeError::Type(format!(
                        "{} is not a constructor",
                        print_expression(&node.callee)
                    )));
                }
                self.construct(&callee, args)
            }
            Expression::MemberExpression(node) => {
                let object = self.evaluate(&node.object, frame)?;
                let key = self.member_key(node, frame)?;
                self.get_property(&object, &key)
            }
            Expression::SequenceExpression(node) => {
                let mut value = Value::Undefined;
                for expression in &node.expressions {
                    value = self.evaluate(expression, frame)?;
                }
                Ok(value)
            }
            Expression::Raw(node) => Err(unsupported(node.kind(), node.loc())),
        }
    }

    fn arguments(&mut self, arguments: &[Expression], frame: &Frame) -> Result<Vec<Value>> {
        arguments.iter().map(|argument| self.evaluate(argument, frame)).collect()
    }

    fn member_key(&mut self, node: &MemberExpression, frame: &Frame) -> Result<String> {
        match &*node.property {
            Expression::Identifier(ident) if !node.computed => Ok(ident.name.clone()),
            property => {
                let key = self.evaluate(property, frame)?;
                self.coerce_string(&key)
            }
        }
    }

    fn unary(&mut self, node: &UnaryExpression, frame: &Frame) -> Result<Value> {
        match node.operator {
            UnaryOperator::Typeof => {
                if let Expression::Identifier(ident) = &*node.argument {
                    if scope::lookup(&frame.scope, &ident.name).is_none() {
                        return Ok(Value::from("undefined"));
                    }
                }
                let value = self.evaluate(&node.argument, frame)?;
                Ok(Value::from(value.type_of()))
            }
            UnaryOperator::Delete => match &*node.argument {
                Expression::MemberExpression(member) => {
                    let object = self.evaluate(&member.object, frame)?;
                    let key = self.member_key(member, frame)?;
                    Ok(Value::Boolean(self.delete_property(&object, &key)?))
                }
                Expression::Identifier(_) => Ok(Value::Boolean(false)),
                argument => {
                    self.evaluate(argument, frame)?;
                    Ok(Value::Boolean(true))
                }
            },
            UnaryOperator::Void => {
                self.evaluate(&node.argument, frame)?;
                Ok(Value::Undefined)
            }
            UnaryOperator::Not => Ok(Value::Boolean(!self.evaluate(&node.argument, frame)?.truthy())),
            UnaryOperator::Minus | UnaryOperator::Plus | UnaryOperator::BitNot => {
                let value = self.evaluate(&node.argument, frame)?;
                let n = self.coerce_number(&value)?;
                Ok(Value::Number(match node.operator {
                    UnaryOperator::Minus => -n,
                    UnaryOperator::Plus => n,
                    _ => f64::from(!super::to_int32(n)),
                }))
            }
        }
    }

    fn reference(&mut self, target: &Expression, frame: &Frame) -> Result<Reference> {
        match target {
            Expression::Identifier(ident) => Ok(Reference::Binding(ident.name.clone())),
            Expression::MemberExpression(member) => {
                let object = self.evaluate(&member.object, frame)?;
                let key = self.member_key(member, frame)?;
                Ok(Reference::Property(object, key))
            }
            target => Err(RuntimeError::Type(format!(
                "invalid assignment target: {}",
                print_expression(target)
            ))),
        }
    }

    fn get_reference(&mut self, reference: &Reference, frame: &Frame) -> Result<Value> {
        match reference {
            Reference::Binding(name) => scope::lookup(&frame.scope, name)
                .ok_or_else(|| RuntimeError::Reference(name.clone())),
            Reference::Property(object, key) => self.get_property(object, key),
        }
    }

    fn put_reference(&mut self, reference: &Reference, value: Value, frame: &Frame) -> Result<()> {
        match reference {
            Reference::Binding(name) => {
                scope::assign(&frame.scope, name, value);
                Ok(())
            }
            Reference::Property(object, key) => self.put_property(object, key, value),
        }
    }
}
