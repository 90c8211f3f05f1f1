//! Recursive-descent parser producing [`Program`] trees with source locations.

use serde::{Deserialize, Serialize};

use crate::{
    ast::*,
    error::ParseError,
    lexer::{tokenize, Token, TokenKind},
};

/// Words that can never be used as identifiers.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "const", "continue", "debugger", "default", "delete", "do", "else",
    "false", "finally", "for", "function", "if", "in", "instanceof", "let", "new", "null",
    "return", "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
];

/// Options accepted by [`parse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseOptions {
    /// Attach a [`SourceLocation`] to every node. Enabled by default.
    pub locations: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { locations: true }
    }
}

impl ParseOptions {
    /// Set whether nodes carry source locations.
    pub fn with_locations(mut self, locations: bool) -> Self {
        self.locations = locations;
        self
    }
}

/// Parse a complete script.
pub fn parse(source: &str, options: &ParseOptions) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, no_in: false, locations: options.locations };
    let program = parser.program()?;
    debug!(statements = program.body.len(), "parsed program");
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Set while parsing the head of a `for` loop, where `in` starts a for-in.
    no_in: bool,
    locations: bool,
}

fn binary_precedence(token: &Token, no_in: bool) -> Option<u8> {
    let prec = match &token.kind {
        TokenKind::Punct(p) => match *p {
            "||" => 1,
            "&&" => 2,
            "|" => 3,
            "^" => 4,
            "&" => 5,
            "==" | "!=" | "===" | "!==" => 6,
            "<" | ">" | "<=" | ">=" => 7,
            "<<" | ">>" | ">>>" => 8,
            "+" | "-" => 9,
            "*" | "/" | "%" => 10,
            _ => return None,
        },
        TokenKind::Word(w) if w == "instanceof" => 7,
        TokenKind::Word(w) if w == "in" && !no_in => 7,
        _ => return None,
    };
    Some(prec)
}

impl Parser {
    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn start(&self) -> Position {
        self.peek().start
    }

    /// Location from `start` to the end of the last consumed token.
    fn finish(&self, start: Position) -> Option<SourceLocation> {
        if !self.locations {
            return None;
        }
        let end = if self.pos == 0 { start } else { self.tokens[self.pos - 1].end };
        Some(SourceLocation::new(start, end))
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::Eof => "unexpected end of input".to_string(),
            _ => format!("unexpected token `{}`", token.raw),
        };
        ParseError::new(message, token.start.line, token.start.column)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.peek().is_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.peek().is_word(w) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_word(&mut self, w: &str) -> Result<(), ParseError> {
        if self.eat_word(w) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Automatic semicolon insertion.
    fn semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let token = self.peek();
        if token.is_punct("}") || token.kind == TokenKind::Eof || token.newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Whether the next token cannot continue a restricted production on the same line.
    fn statement_ends_here(&self) -> bool {
        let token = self.peek();
        token.newline_before
            || token.is_punct(";")
            || token.is_punct("}")
            || token.kind == TokenKind::Eof
    }

    fn identifier(&mut self) -> Result<Identifier, ParseError> {
        let start = self.start();
        match &self.peek().kind {
            TokenKind::Word(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.bump();
                Ok(Identifier { name, loc: self.finish(start) })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn program(&mut self) -> Result<Program, ParseError> {
        let start = self.start();
        let mut body = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            body.push(self.statement()?);
        }
        Ok(Program { body, loc: self.finish(start) })
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        let token = self.peek();

        if token.is_punct("{") {
            return Ok(Statement::BlockStatement(self.block()?));
        }
        if token.is_punct(";") {
            self.bump();
            return Ok(Statement::EmptyStatement(EmptyStatement { loc: self.finish(start) }));
        }

        let TokenKind::Word(word) = token.kind.clone() else {
            return self.expression_statement();
        };
        if self.peek_nth(1).is_punct(":") && !RESERVED.contains(&word.as_str()) {
            let label = self.identifier()?;
            self.bump();
            let body = Box::new(self.statement()?);
            return Ok(Statement::LabeledStatement(LabeledStatement {
                label,
                body,
                loc: self.finish(start),
            }));
        }
        match word.as_str() {
            "var" | "let" | "const" => {
                let declaration = self.variable_declaration()?;
                self.semicolon()?;
                Ok(Statement::VariableDeclaration(VariableDeclaration {
                    loc: self.finish(start),
                    ..declaration
                }))
            }
            "function" => Ok(Statement::FunctionDeclaration(self.function(true)?)),
            "if" => {
                self.bump();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.statement()?);
                let alternate =
                    if self.eat_word("else") { Some(Box::new(self.statement()?)) } else { None };
                Ok(Statement::IfStatement(IfStatement {
                    test,
                    consequent,
                    alternate,
                    loc: self.finish(start),
                }))
            }
            "for" => self.for_statement(),
            "while" => {
                self.bump();
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                Ok(Statement::WhileStatement(WhileStatement { test, body, loc: self.finish(start) }))
            }
            "do" => {
                self.bump();
                let body = Box::new(self.statement()?);
                self.expect_word("while")?;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                // `do ... while (x)` may be followed directly by another statement.
                self.eat_punct(";");
                Ok(Statement::DoWhileStatement(DoWhileStatement {
                    body,
                    test,
                    loc: self.finish(start),
                }))
            }
            "return" => {
                self.bump();
                let argument = if self.statement_ends_here() { None } else { Some(self.expression()?) };
                self.semicolon()?;
                Ok(Statement::ReturnStatement(ReturnStatement { argument, loc: self.finish(start) }))
            }
            "break" | "continue" => {
                let is_break = word == "break";
                self.bump();
                let label = if self.peek().newline_before || !matches!(self.peek().kind, TokenKind::Word(_)) {
                    None
                } else {
                    Some(self.identifier()?)
                };
                self.semicolon()?;
                let jump = JumpStatement { label, loc: self.finish(start) };
                Ok(if is_break {
                    Statement::BreakStatement(jump)
                } else {
                    Statement::ContinueStatement(jump)
                })
            }
            "throw" => {
                self.bump();
                if self.peek().newline_before {
                    let token = self.peek();
                    return Err(ParseError::new(
                        "illegal newline after throw",
                        token.start.line,
                        token.start.column,
                    ));
                }
                let argument = self.expression()?;
                self.semicolon()?;
                Ok(Statement::ThrowStatement(ThrowStatement { argument, loc: self.finish(start) }))
            }
            "try" => self.try_statement(),
            "switch" => self.switch_statement(),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        let expression = self.expression()?;
        self.semicolon()?;
        Ok(Statement::ExpressionStatement(ExpressionStatement {
            expression,
            loc: self.finish(start),
        }))
    }

    fn block(&mut self) -> Result<BlockStatement, ParseError> {
        let start = self.start();
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.peek().is_punct("}") {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.bump();
        Ok(BlockStatement { body, loc: self.finish(start) })
    }

    /// Parses `var a = 1, b` without the trailing semicolon.
    fn variable_declaration(&mut self) -> Result<VariableDeclaration, ParseError> {
        let start = self.start();
        let kind = match &self.bump().kind {
            TokenKind::Word(w) => w.parse::<VariableKind>().map_err(|_| self.unexpected())?,
            _ => return Err(self.unexpected()),
        };
        let mut declarations = Vec::new();
        loop {
            let decl_start = self.start();
            let id = self.identifier()?;
            let init = if self.eat_punct("=") { Some(self.assignment()?) } else { None };
            declarations.push(VariableDeclarator { id, init, loc: self.finish(decl_start) });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(VariableDeclaration { declarations, kind, loc: self.finish(start) })
    }

    fn for_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        self.expect_word("for")?;
        self.expect_punct("(")?;

        let outer_no_in = std::mem::replace(&mut self.no_in, true);
        let init = if self.peek().is_punct(";") {
            None
        } else if matches!(&self.peek().kind, TokenKind::Word(w) if matches!(w.as_str(), "var" | "let" | "const"))
        {
            Some(ForInit::VariableDeclaration(self.variable_declaration()?))
        } else {
            Some(ForInit::Expression(self.expression()?))
        };
        self.no_in = outer_no_in;

        if let Some(left) = init.as_ref().filter(|_| self.peek().is_word("in")) {
            let valid = match left {
                ForInit::VariableDeclaration(decl) => decl.declarations.len() == 1,
                ForInit::Expression(expr) => is_assignment_target(expr),
            };
            if !valid {
                return Err(self.unexpected());
            }
            self.bump();
            let right = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            let left = init.ok_or_else(|| self.unexpected())?;
            return Ok(Statement::ForInStatement(ForInStatement {
                left,
                right,
                body,
                loc: self.finish(start),
            }));
        }

        self.expect_punct(";")?;
        let test = if self.peek().is_punct(";") { None } else { Some(self.expression()?) };
        self.expect_punct(";")?;
        let update = if self.peek().is_punct(")") { None } else { Some(self.expression()?) };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Statement::ForStatement(ForStatement { init, test, update, body, loc: self.finish(start) }))
    }

    fn switch_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        self.expect_word("switch")?;
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct("}") {
            let case_start = self.start();
            let test = if self.eat_word("case") {
                Some(self.expression()?)
            } else if !seen_default && self.eat_word("default") {
                seen_default = true;
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut consequent = Vec::new();
            while !(self.peek().is_word("case")
                || self.peek().is_word("default")
                || self.peek().is_punct("}"))
            {
                if self.peek().kind == TokenKind::Eof {
                    return Err(self.unexpected());
                }
                consequent.push(self.statement()?);
            }
            cases.push(SwitchCase { test, consequent, loc: self.finish(case_start) });
        }
        Ok(Statement::SwitchStatement(SwitchStatement {
            discriminant,
            cases,
            loc: self.finish(start),
        }))
    }

    fn try_statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.start();
        self.expect_word("try")?;
        let block = self.block()?;
        let handler = if self.peek().is_word("catch") {
            let catch_start = self.start();
            self.bump();
            self.expect_punct("(")?;
            let param = self.identifier()?;
            self.expect_punct(")")?;
            let body = self.block()?;
            Some(CatchClause { param, body, loc: self.finish(catch_start) })
        } else {
            None
        };
        let finalizer = if self.eat_word("finally") { Some(self.block()?) } else { None };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected());
        }
        Ok(Statement::TryStatement(TryStatement { block, handler, finalizer, loc: self.finish(start) }))
    }

    /// `function name(params) { body }`; the name is required for declarations.
    fn function(&mut self, declaration: bool) -> Result<Function, ParseError> {
        let start = self.start();
        self.expect_word("function")?;
        let id = if declaration || !self.peek().is_punct("(") { Some(self.identifier()?) } else { None };
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.peek().is_punct(")") {
            loop {
                params.push(self.identifier()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;

        // Function bodies reset the for-in restriction.
        let outer_no_in = std::mem::replace(&mut self.no_in, false);
        let body = self.block()?;
        self.no_in = outer_no_in;

        Ok(Function { id, params, body, loc: self.finish(start) })
    }

    fn expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let first = self.assignment()?;
        if !self.peek().is_punct(",") {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat_punct(",") {
            expressions.push(self.assignment()?);
        }
        Ok(Expression::SequenceExpression(SequenceExpression { expressions, loc: self.finish(start) }))
    }

    fn assignment(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let left = self.conditional()?;
        let operator = match &self.peek().kind {
            TokenKind::Punct(p) => p.parse::<AssignmentOperator>().ok(),
            _ => None,
        };
        let Some(operator) = operator else {
            return Ok(left);
        };
        if !is_assignment_target(&left) {
            let token = self.peek();
            return Err(ParseError::new(
                "invalid assignment target",
                token.start.line,
                token.start.column,
            ));
        }
        self.bump();
        let right = self.assignment()?;
        Ok(Expression::AssignmentExpression(AssignmentExpression {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            loc: self.finish(start),
        }))
    }

    fn conditional(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let test = self.binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let outer_no_in = std::mem::replace(&mut self.no_in, false);
        let consequent = self.assignment()?;
        self.no_in = outer_no_in;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expression::ConditionalExpression(ConditionalExpression {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            loc: self.finish(start),
        }))
    }

    /// Precedence climbing over binary and logical operators.
    fn binary(&mut self, min_prec: u8) -> Result<Expression, ParseError> {
        let start = self.start();
        let mut left = self.unary()?;
        while let Some(prec) = binary_precedence(self.peek(), self.no_in) {
            if prec < min_prec {
                break;
            }
            let text = self.bump().raw;
            let right = self.binary(prec + 1)?;
            let (left_box, right_box) = (Box::new(left), Box::new(right));
            left = match text.as_str() {
                "||" | "&&" => Expression::LogicalExpression(LogicalExpression {
                    operator: text.parse().map_err(|_| self.unexpected())?,
                    left: left_box,
                    right: right_box,
                    loc: self.finish(start),
                }),
                _ => Expression::BinaryExpression(BinaryExpression {
                    operator: text.parse().map_err(|_| self.unexpected())?,
                    left: left_box,
                    right: right_box,
                    loc: self.finish(start),
                }),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let token = self.peek();

        if token.is_punct("++") || token.is_punct("--") {
            let operator = if token.is_punct("++") {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            self.bump();
            let argument = self.unary()?;
            if !is_assignment_target(&argument) {
                return Err(ParseError::new(
                    "invalid update target",
                    start.line,
                    start.column,
                ));
            }
            return Ok(Expression::UpdateExpression(UpdateExpression {
                operator,
                prefix: true,
                argument: Box::new(argument),
                loc: self.finish(start),
            }));
        }

        let operator = match &token.kind {
            TokenKind::Punct(p @ ("-" | "+" | "!" | "~")) => p.parse::<UnaryOperator>().ok(),
            TokenKind::Word(w) if matches!(w.as_str(), "typeof" | "void" | "delete") => {
                w.parse::<UnaryOperator>().ok()
            }
            _ => None,
        };
        if let Some(operator) = operator {
            self.bump();
            let argument = self.unary()?;
            return Ok(Expression::UnaryExpression(UnaryExpression {
                operator,
                prefix: true,
                argument: Box::new(argument),
                loc: self.finish(start),
            }));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let expression = self.left_hand_side()?;
        let token = self.peek();
        if token.newline_before || !(token.is_punct("++") || token.is_punct("--")) {
            return Ok(expression);
        }
        let operator =
            if token.is_punct("++") { UpdateOperator::Increment } else { UpdateOperator::Decrement };
        if !is_assignment_target(&expression) {
            return Err(ParseError::new("invalid update target", token.start.line, token.start.column));
        }
        self.bump();
        Ok(Expression::UpdateExpression(UpdateExpression {
            operator,
            prefix: false,
            argument: Box::new(expression),
            loc: self.finish(start),
        }))
    }

    /// Member accesses, calls and `new` expressions.
    fn left_hand_side(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let mut expression =
            if self.peek().is_word("new") { self.new_expression()? } else { self.primary()? };
        loop {
            if self.peek().is_punct(".") || self.peek().is_punct("[") {
                expression = self.member(expression, start)?;
            } else if self.peek().is_punct("(") {
                let arguments = self.arguments()?;
                expression = Expression::CallExpression(CallExpression {
                    callee: Box::new(expression),
                    arguments,
                    loc: self.finish(start),
                });
            } else {
                return Ok(expression);
            }
        }
    }

    fn new_expression(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        self.expect_word("new")?;
        let mut callee =
            if self.peek().is_word("new") { self.new_expression()? } else { self.primary()? };
        while self.peek().is_punct(".") || self.peek().is_punct("[") {
            callee = self.member(callee, start)?;
        }
        let arguments = if self.peek().is_punct("(") { self.arguments()? } else { Vec::new() };
        Ok(Expression::NewExpression(CallExpression {
            callee: Box::new(callee),
            arguments,
            loc: self.finish(start),
        }))
    }

    fn member(&mut self, object: Expression, start: Position) -> Result<Expression, ParseError> {
        let (property, computed) = if self.eat_punct(".") {
            let prop_start = self.start();
            let TokenKind::Word(name) = self.peek().kind.clone() else {
                return Err(self.unexpected());
            };
            self.bump();
            (Expression::Identifier(Identifier { name, loc: self.finish(prop_start) }), false)
        } else {
            self.expect_punct("[")?;
            let outer_no_in = std::mem::replace(&mut self.no_in, false);
            let property = self.expression()?;
            self.no_in = outer_no_in;
            self.expect_punct("]")?;
            (property, true)
        };
        Ok(Expression::MemberExpression(MemberExpression {
            object: Box::new(object),
            property: Box::new(property),
            computed,
            loc: self.finish(start),
        }))
    }

    fn arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect_punct("(")?;
        let outer_no_in = std::mem::replace(&mut self.no_in, false);
        let mut arguments = Vec::new();
        if !self.peek().is_punct(")") {
            loop {
                arguments.push(self.assignment()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.no_in = outer_no_in;
        self.expect_punct(")")?;
        Ok(arguments)
    }

    fn primary(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.bump();
                Ok(self.literal(LiteralValue::Number(n), token.raw, start))
            }
            TokenKind::String(s) => {
                self.bump();
                Ok(self.literal(LiteralValue::String(s), token.raw, start))
            }
            TokenKind::Punct("(") => {
                self.bump();
                let outer_no_in = std::mem::replace(&mut self.no_in, false);
                let expression = self.expression()?;
                self.no_in = outer_no_in;
                self.expect_punct(")")?;
                Ok(expression)
            }
            TokenKind::Regex(pattern, flags) => {
                self.bump();
                Ok(Expression::Literal(Literal {
                    value: LiteralValue::Null,
                    regex: Some(RegexLiteral { pattern, flags }),
                    raw: Some(token.raw),
                    loc: self.finish(start),
                }))
            }
            TokenKind::Punct("[") => self.array_literal(),
            TokenKind::Punct("{") => self.object_literal(),
            TokenKind::Word(ref w) => match w.as_str() {
                "this" => {
                    self.bump();
                    Ok(Expression::ThisExpression(ThisExpression { loc: self.finish(start) }))
                }
                "null" => {
                    self.bump();
                    Ok(self.literal(LiteralValue::Null, token.raw, start))
                }
                "true" | "false" => {
                    self.bump();
                    Ok(self.literal(LiteralValue::Boolean(w == "true"), token.raw, start))
                }
                "function" => Ok(Expression::FunctionExpression(self.function(false)?)),
                _ => Ok(Expression::Identifier(self.identifier()?)),
            },
            _ => Err(self.unexpected()),
        }
    }

    fn literal(&self, value: LiteralValue, raw: String, start: Position) -> Expression {
        Expression::Literal(Literal { value, regex: None, raw: Some(raw), loc: self.finish(start) })
    }

    fn array_literal(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        self.expect_punct("[")?;
        let mut elements = Vec::new();
        loop {
            if self.eat_punct("]") {
                break;
            }
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            elements.push(Some(self.assignment()?));
            if !self.peek().is_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expression::ArrayExpression(ArrayExpression { elements, loc: self.finish(start) }))
    }

    fn object_literal(&mut self) -> Result<Expression, ParseError> {
        let start = self.start();
        self.expect_punct("{")?;
        let mut properties = Vec::new();
        while !self.eat_punct("}") {
            let prop_start = self.start();
            let token = self.peek().clone();
            if !matches!(token.kind, TokenKind::Word(_) | TokenKind::String(_) | TokenKind::Number(_)) {
                return Err(self.unexpected());
            }
            self.bump();
            let key = match token.kind {
                TokenKind::Word(name) => {
                    Expression::Identifier(Identifier { name, loc: self.finish(prop_start) })
                }
                TokenKind::String(s) => self.literal(LiteralValue::String(s), token.raw, prop_start),
                TokenKind::Number(n) => self.literal(LiteralValue::Number(n), token.raw, prop_start),
                _ => return Err(self.unexpected()),
            };
            self.expect_punct(":")?;
            let value = self.assignment()?;
            properties.push(Property { key, value, computed: false, loc: self.finish(prop_start) });
            if !self.peek().is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expression::ObjectExpression(ObjectExpression { properties, loc: self.finish(start) }))
    }
}

fn is_assignment_target(expression: &Expression) -> bool {
    matches!(expression, Expression::Identifier(_) | Expression::MemberExpression(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source, &ParseOptions::default()).unwrap()
    }

    fn first_expression(source: &str) -> Expression {
        match parse_ok(source).body.remove(0) {
            Statement::ExpressionStatement(stmt) => stmt.expression,
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_function_location() {
        let program = parse_ok("var a;\nfunction foo(x) {\n    return x;\n}");
        let Statement::FunctionDeclaration(function) = &program.body[1] else {
            panic!("expected a function declaration");
        };
        assert_eq!(function.name(), Some("foo"));
        assert_eq!(
            function.loc.unwrap(),
            SourceLocation::new(Position::new(2, 0), Position::new(4, 1))
        );
    }

    #[test]
    fn test_precedence() {
        let Expression::BinaryExpression(add) = first_expression("1 + 2 * 3") else {
            panic!("expected a binary expression");
        };
        assert_eq!(add.operator, BinaryOperator::Add);
        assert!(matches!(*add.right, Expression::BinaryExpression(ref mul) if mul.operator == BinaryOperator::Mul));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let Expression::AssignmentExpression(outer) = first_expression("x.n *= x.n *= 2") else {
            panic!("expected an assignment");
        };
        assert_eq!(outer.operator, AssignmentOperator::MulAssign);
        assert!(matches!(*outer.right, Expression::AssignmentExpression(_)));
    }

    #[test]
    fn test_new_member_call() {
        let Expression::NewExpression(new) = first_expression("new x.f()") else {
            panic!("expected a new expression");
        };
        assert!(matches!(*new.callee, Expression::MemberExpression(_)));
        assert!(new.arguments.is_empty());

        let Expression::CallExpression(call) = first_expression("new F().go(1)") else {
            panic!("expected a call expression");
        };
        assert_eq!(call.arguments.len(), 1);
    }

    #[test]
    fn test_automatic_semicolons() {
        let program = parse_ok("var a = 1\nvar b = a\na\n++b\nfunction f() { return\n1 }");
        assert_eq!(program.body.len(), 5);
        let Statement::ExpressionStatement(stmt) = &program.body[3] else {
            panic!("expected an expression statement");
        };
        assert!(matches!(stmt.expression, Expression::UpdateExpression(ref u) if u.prefix));
        let Statement::FunctionDeclaration(f) = &program.body[4] else {
            panic!("expected a function declaration");
        };
        assert!(matches!(f.body.body[0], Statement::ReturnStatement(ReturnStatement { argument: None, .. })));
    }

    #[test]
    fn test_for_in_and_for() {
        let program = parse_ok("for (var k in o) {} for (var i = 0; i < 3; i++) {} for (;;) break;");
        assert!(matches!(program.body[0], Statement::ForInStatement(_)));
        assert!(matches!(program.body[1], Statement::ForStatement(_)));
        assert!(matches!(program.body[2], Statement::ForStatement(ForStatement { init: None, .. })));
    }

    #[test]
    fn test_switch_and_labels() {
        let program = parse_ok(
            "outer: for (;;) { switch (x) { case 1: case 2: break outer; default: continue outer\n } }",
        );
        let Statement::LabeledStatement(labeled) = &program.body[0] else {
            panic!("expected a labeled statement");
        };
        assert_eq!(labeled.label.name, "outer");
        let Statement::ForStatement(ForStatement { body, .. }) = &*labeled.body else {
            panic!("expected a for statement");
        };
        let Statement::BlockStatement(block) = &**body else {
            panic!("expected a block");
        };
        let Statement::SwitchStatement(switch) = &block.body[0] else {
            panic!("expected a switch statement");
        };
        assert_eq!(switch.cases.len(), 3);
        assert!(switch.cases[0].consequent.is_empty());
        assert!(switch.cases[2].test.is_none());
        let Statement::BreakStatement(jump) = &switch.cases[1].consequent[0] else {
            panic!("expected a break");
        };
        assert_eq!(jump.label(), Some("outer"));
        assert!(matches!(
            &switch.cases[2].consequent[0],
            Statement::ContinueStatement(jump) if jump.label() == Some("outer")
        ));

        // A label on the next line is a new statement.
        let program = parse_ok("for (;;) { break\nx }");
        let Statement::ForStatement(ForStatement { body, .. }) = &program.body[0] else {
            panic!("expected a for statement");
        };
        assert!(matches!(&**body, Statement::BlockStatement(b) if b.body.len() == 2));

        assert!(parse("switch (x) { default: default: }", &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_regex_literal() {
        let Expression::CallExpression(call) = first_expression("/a+/g.test(s)") else {
            panic!("expected a call");
        };
        let Expression::MemberExpression(member) = &*call.callee else {
            panic!("expected a member expression");
        };
        let Expression::Literal(literal) = &*member.object else {
            panic!("expected a literal");
        };
        assert_eq!(literal.value, LiteralValue::Null);
        assert_eq!(
            literal.regex,
            Some(RegexLiteral { pattern: "a+".into(), flags: "g".into() })
        );
        assert_eq!(literal.raw.as_deref(), Some("/a+/g"));
    }

    #[test]
    fn test_without_locations() {
        let program = parse("a.b = 1;", &ParseOptions::default().with_locations(false)).unwrap();
        assert!(program.loc.is_none());
        assert!(program.body[0].loc().is_none());
    }

    #[test]
    fn test_errors() {
        let err = parse("var = 1;", &ParseOptions::default()).unwrap_err();
        assert_eq!((err.line, err.column), (1, 4));

        let err = parse("1 = 2;", &ParseOptions::default()).unwrap_err();
        assert_eq!(err.message, "invalid assignment target");

        let err = parse("f(", &ParseOptions::default()).unwrap_err();
        assert_eq!(err.message, "unexpected end of input");

        assert!(parse("a b", &ParseOptions::default()).is_err());
    }
}
