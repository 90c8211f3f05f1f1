//! Syntax tree for the supported ECMAScript subset.
//!
//! The node shapes and field names follow ESTree so that a tree produced by any ESTree parser
//! can be deserialized directly (see [`crate::from_estree_json`]). Every node kind that can
//! appear in more than one position is a variant of [`Statement`] or [`Expression`]; the
//! `"type"` tag of the JSON form is the variant name.
//!
//! Positions that hold exactly one node kind (a function body is always a block, a parameter
//! is always an identifier) keep the concrete struct and go through the [`tagged`] adapters,
//! which add and check the `"type"` field on the way in and out.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A line/column pair. Lines are 1-based, columns 0-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// The source range a node was parsed from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
}

impl SourceLocation {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Render the location as `<script>@<startLine>.<startColumn>-<endLine>.<endColumn>`.
    pub fn describe(&self, script: &str) -> String {
        format!(
            "{script}@{}.{}-{}.{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

macro_rules! operators {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:tt),* $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
            Display, EnumString, AsRefStr, EnumIter,
        )]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                #[strum(serialize = $text)]
                $variant,
            )*
        }
    };
}

operators! {
    /// Prefix operators that are not updates.
    UnaryOperator {
        Minus => "-",
        Plus => "+",
        Not => "!",
        BitNot => "~",
        Typeof => "typeof",
        Void => "void",
        Delete => "delete",
    }
}

operators! {
    UpdateOperator {
        Increment => "++",
        Decrement => "--",
    }
}

operators! {
    BinaryOperator {
        Eq => "==",
        NotEq => "!=",
        StrictEq => "===",
        StrictNotEq => "!==",
        Lt => "<",
        LtEq => "<=",
        Gt => ">",
        GtEq => ">=",
        Shl => "<<",
        Shr => ">>",
        UShr => ">>>",
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Rem => "%",
        BitOr => "|",
        BitXor => "^",
        BitAnd => "&",
        In => "in",
        Instanceof => "instanceof",
    }
}

operators! {
    LogicalOperator {
        Or => "||",
        And => "&&",
    }
}

operators! {
    AssignmentOperator {
        Assign => "=",
        AddAssign => "+=",
        SubAssign => "-=",
        MulAssign => "*=",
        DivAssign => "/=",
        RemAssign => "%=",
        ShlAssign => "<<=",
        ShrAssign => ">>=",
        UShrAssign => ">>>=",
        BitOrAssign => "|=",
        BitXorAssign => "^=",
        BitAndAssign => "&=",
    }
}

operators! {
    VariableKind {
        Var => "var",
        Let => "let",
        Const => "const",
    }
}

impl AssignmentOperator {
    /// The arithmetic or bitwise operator a compound assignment applies, `None` for `=`.
    pub fn binary(self) -> Option<BinaryOperator> {
        Some(match self {
            Self::Assign => return None,
            Self::AddAssign => BinaryOperator::Add,
            Self::SubAssign => BinaryOperator::Sub,
            Self::MulAssign => BinaryOperator::Mul,
            Self::DivAssign => BinaryOperator::Div,
            Self::RemAssign => BinaryOperator::Rem,
            Self::ShlAssign => BinaryOperator::Shl,
            Self::ShrAssign => BinaryOperator::Shr,
            Self::UShrAssign => BinaryOperator::UShr,
            Self::BitOrAssign => BinaryOperator::BitOr,
            Self::BitXorAssign => BinaryOperator::BitXor,
            Self::BitAndAssign => BinaryOperator::BitAnd,
        })
    }
}

/// The root of a parsed script.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Program")]
pub struct Program {
    pub body: Vec<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    ExpressionStatement(ExpressionStatement),
    VariableDeclaration(VariableDeclaration),
    FunctionDeclaration(Function),
    ReturnStatement(ReturnStatement),
    IfStatement(IfStatement),
    BlockStatement(BlockStatement),
    ForStatement(ForStatement),
    ForInStatement(ForInStatement),
    WhileStatement(WhileStatement),
    DoWhileStatement(DoWhileStatement),
    BreakStatement(JumpStatement),
    ContinueStatement(JumpStatement),
    ThrowStatement(ThrowStatement),
    TryStatement(TryStatement),
    EmptyStatement(EmptyStatement),
    SwitchStatement(SwitchStatement),
    LabeledStatement(LabeledStatement),
    /// Any other ESTree statement, kept as it was read.
    #[serde(untagged)]
    Raw(RawNode),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal),
    ThisExpression(ThisExpression),
    ArrayExpression(ArrayExpression),
    ObjectExpression(ObjectExpression),
    FunctionExpression(Function),
    UnaryExpression(UnaryExpression),
    UpdateExpression(UpdateExpression),
    BinaryExpression(BinaryExpression),
    LogicalExpression(LogicalExpression),
    AssignmentExpression(AssignmentExpression),
    ConditionalExpression(ConditionalExpression),
    CallExpression(CallExpression),
    NewExpression(CallExpression),
    MemberExpression(MemberExpression),
    SequenceExpression(SequenceExpression),
    /// Any other ESTree expression, kept as it was read.
    #[serde(untagged)]
    Raw(RawNode),
}

/// Node kinds that deserialize into a dedicated variant. A node of one of these kinds that
/// does not fit its variant is an error rather than a [`RawNode`].
const MODELED_KINDS: &[&str] = &[
    "ExpressionStatement",
    "VariableDeclaration",
    "FunctionDeclaration",
    "ReturnStatement",
    "IfStatement",
    "BlockStatement",
    "ForStatement",
    "ForInStatement",
    "WhileStatement",
    "DoWhileStatement",
    "BreakStatement",
    "ContinueStatement",
    "ThrowStatement",
    "TryStatement",
    "EmptyStatement",
    "SwitchStatement",
    "LabeledStatement",
    "Identifier",
    "Literal",
    "ThisExpression",
    "ArrayExpression",
    "ObjectExpression",
    "FunctionExpression",
    "UnaryExpression",
    "UpdateExpression",
    "BinaryExpression",
    "LogicalExpression",
    "AssignmentExpression",
    "ConditionalExpression",
    "CallExpression",
    "NewExpression",
    "MemberExpression",
    "SequenceExpression",
];

/// An ESTree node of a kind outside the supported subset, such as a `WithStatement` or an
/// `ArrowFunctionExpression`. It is carried through instrumentation untouched and written
/// back out exactly as it was read.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawNode(serde_json::Value);

impl RawNode {
    /// The node's `"type"`.
    pub fn kind(&self) -> &str {
        self.0.get("type").and_then(serde_json::Value::as_str).unwrap_or_default()
    }

    pub fn loc(&self) -> Option<SourceLocation> {
        self.0.get("loc").and_then(|loc| SourceLocation::deserialize(loc).ok())
    }

    pub fn json(&self) -> &serde_json::Value {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RawNode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let node = serde_json::Value::deserialize(d)?;
        let kind = node
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| D::Error::custom("node without a `type`"))?;
        if MODELED_KINDS.contains(&kind) {
            return Err(D::Error::custom(format_args!("malformed `{kind}` node")));
        }
        trace!(kind, "keeping unsupported node as is");
        Ok(Self(node))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

/// Values other than primitives, such as the `{}` some tools write for regular expressions,
/// read as `null`.
impl<'de> Deserialize<'de> for LiteralValue {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(match serde_json::Value::deserialize(d)? {
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            _ => Self::Null,
        })
    }
}

/// Pattern and flags of a regular expression literal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexLiteral {
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    /// `null` for regular expressions, whose pattern is in `regex`.
    #[serde(default)]
    pub value: LiteralValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexLiteral>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

impl Literal {
    pub fn new(value: LiteralValue) -> Self {
        Self { value, regex: None, raw: None, loc: None }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThisExpression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpression {
    /// `None` marks an elision (`[1, , 3]`).
    pub elements: Vec<Option<Expression>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpression {
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

/// An `init` property of an object literal. The key is an identifier or a literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Property")]
pub struct Property {
    pub key: Expression,
    pub value: Expression,
    #[serde(default)]
    pub computed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

impl Property {
    /// The property name as written, for identifier, string and number keys.
    pub fn key_name(&self) -> Option<String> {
        match &self.key {
            Expression::Identifier(ident) => Some(ident.name.clone()),
            Expression::Literal(Literal { value: LiteralValue::String(s), .. }) => Some(s.clone()),
            Expression::Literal(Literal { value: LiteralValue::Number(n), .. }) => {
                Some(format_number(*n))
            }
            _ => None,
        }
    }
}

/// Shared by function declarations and function expressions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Function {
    #[serde(default, with = "tagged::identifier::option")]
    pub id: Option<Identifier>,
    #[serde(with = "tagged::identifier::vec")]
    pub params: Vec<Identifier>,
    #[serde(with = "tagged::block")]
    pub body: BlockStatement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        self.id.as_ref().map(|id| id.name.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    #[serde(default = "default_true")]
    pub prefix: bool,
    pub argument: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateExpression {
    pub operator: UpdateOperator,
    pub prefix: bool,
    pub argument: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpression {
    pub operator: LogicalOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentExpression {
    pub operator: AssignmentOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpression {
    pub test: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

/// Used for both `CallExpression` and `NewExpression`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberExpression {
    pub object: Box<Expression>,
    pub property: Box<Expression>,
    pub computed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceExpression {
    pub expressions: Vec<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    pub expression: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub declarations: Vec<VariableDeclarator>,
    pub kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "VariableDeclarator")]
pub struct VariableDeclarator {
    #[serde(with = "tagged::identifier")]
    pub id: Identifier,
    #[serde(default)]
    pub init: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    #[serde(default)]
    pub argument: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    #[serde(default)]
    pub alternate: Option<Box<Statement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockStatement {
    pub body: Vec<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

/// The head of a `for` or `for-in` loop: a declaration or an expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForInit {
    #[serde(with = "tagged::variable_declaration")]
    VariableDeclaration(VariableDeclaration),
    Expression(Expression),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    #[serde(default)]
    pub init: Option<ForInit>,
    #[serde(default)]
    pub test: Option<Expression>,
    #[serde(default)]
    pub update: Option<Expression>,
    pub body: Box<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForInStatement {
    pub left: ForInit,
    pub right: Expression,
    pub body: Box<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoWhileStatement {
    pub body: Box<Statement>,
    pub test: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

/// `break` and `continue`, optionally naming the statement they leave.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JumpStatement {
    #[serde(default, with = "tagged::identifier::option")]
    pub label: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

impl JumpStatement {
    pub fn label(&self) -> Option<&str> {
        self.label.as_ref().map(|label| label.name.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

/// A `case` clause, or the `default` clause when `test` is `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "SwitchCase")]
pub struct SwitchCase {
    #[serde(default)]
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledStatement {
    #[serde(with = "tagged::identifier")]
    pub label: Identifier,
    pub body: Box<Statement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThrowStatement {
    pub argument: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TryStatement {
    #[serde(with = "tagged::block")]
    pub block: BlockStatement,
    #[serde(default)]
    pub handler: Option<CatchClause>,
    #[serde(default, with = "tagged::block::option")]
    pub finalizer: Option<BlockStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "CatchClause")]
pub struct CatchClause {
    #[serde(with = "tagged::identifier")]
    pub param: Identifier,
    #[serde(with = "tagged::block")]
    pub body: BlockStatement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLocation>,
}

fn default_true() -> bool {
    true
}

impl Expression {
    pub fn loc(&self) -> Option<SourceLocation> {
        match self {
            Self::Identifier(node) => node.loc,
            Self::Literal(node) => node.loc,
            Self::ThisExpression(node) => node.loc,
            Self::ArrayExpression(node) => node.loc,
            Self::ObjectExpression(node) => node.loc,
            Self::FunctionExpression(node) => node.loc,
            Self::UnaryExpression(node) => node.loc,
            Self::UpdateExpression(node) => node.loc,
            Self::BinaryExpression(node) => node.loc,
            Self::LogicalExpression(node) => node.loc,
            Self::AssignmentExpression(node) => node.loc,
            Self::ConditionalExpression(node) => node.loc,
            Self::CallExpression(node) | Self::NewExpression(node) => node.loc,
            Self::MemberExpression(node) => node.loc,
            Self::SequenceExpression(node) => node.loc,
            Self::Raw(node) => node.loc(),
        }
    }

    /// The ESTree type name of the node.
    pub fn kind(&self) -> &str {
        match self {
            Self::Identifier(_) => "Identifier",
            Self::Literal(_) => "Literal",
            Self::ThisExpression(_) => "ThisExpression",
            Self::ArrayExpression(_) => "ArrayExpression",
            Self::ObjectExpression(_) => "ObjectExpression",
            Self::FunctionExpression(_) => "FunctionExpression",
            Self::UnaryExpression(_) => "UnaryExpression",
            Self::UpdateExpression(_) => "UpdateExpression",
            Self::BinaryExpression(_) => "BinaryExpression",
            Self::LogicalExpression(_) => "LogicalExpression",
            Self::AssignmentExpression(_) => "AssignmentExpression",
            Self::ConditionalExpression(_) => "ConditionalExpression",
            Self::CallExpression(_) => "CallExpression",
            Self::NewExpression(_) => "NewExpression",
            Self::MemberExpression(_) => "MemberExpression",
            Self::SequenceExpression(_) => "SequenceExpression",
            Self::Raw(node) => node.kind(),
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(Identifier { name: name.into(), loc: None })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::new(LiteralValue::String(value.into())))
    }

    pub fn number(value: f64) -> Self {
        Self::Literal(Literal::new(LiteralValue::Number(value)))
    }

    pub fn this() -> Self {
        Self::ThisExpression(ThisExpression::default())
    }

    /// `void 0`, the canonical way to spell `undefined` without a binding lookup.
    pub fn void_zero() -> Self {
        Self::UnaryExpression(UnaryExpression {
            operator: UnaryOperator::Void,
            prefix: true,
            argument: Box::new(Self::number(0.0)),
            loc: None,
        })
    }

    pub fn call(callee: Self, arguments: Vec<Self>) -> Self {
        Self::CallExpression(CallExpression { callee: Box::new(callee), arguments, loc: None })
    }

    pub fn array(elements: Vec<Self>) -> Self {
        Self::ArrayExpression(ArrayExpression {
            elements: elements.into_iter().map(Some).collect(),
            loc: None,
        })
    }

    pub fn assign(left: Self, right: Self) -> Self {
        Self::AssignmentExpression(AssignmentExpression {
            operator: AssignmentOperator::Assign,
            left: Box::new(left),
            right: Box::new(right),
            loc: None,
        })
    }

    /// Leaves a cheap placeholder behind and returns the original node.
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Literal(Literal::new(LiteralValue::Null)))
    }
}

impl Statement {
    pub fn loc(&self) -> Option<SourceLocation> {
        match self {
            Self::ExpressionStatement(node) => node.loc,
            Self::VariableDeclaration(node) => node.loc,
            Self::FunctionDeclaration(node) => node.loc,
            Self::ReturnStatement(node) => node.loc,
            Self::IfStatement(node) => node.loc,
            Self::BlockStatement(node) => node.loc,
            Self::ForStatement(node) => node.loc,
            Self::ForInStatement(node) => node.loc,
            Self::WhileStatement(node) => node.loc,
            Self::DoWhileStatement(node) => node.loc,
            Self::BreakStatement(node) | Self::ContinueStatement(node) => node.loc,
            Self::ThrowStatement(node) => node.loc,
            Self::TryStatement(node) => node.loc,
            Self::EmptyStatement(node) => node.loc,
            Self::SwitchStatement(node) => node.loc,
            Self::LabeledStatement(node) => node.loc,
            Self::Raw(node) => node.loc(),
        }
    }

    pub fn expression(expression: Expression) -> Self {
        Self::ExpressionStatement(ExpressionStatement { expression, loc: None })
    }

    /// `var a, b, c;` with no initializers.
    pub fn declare(names: impl IntoIterator<Item = String>) -> Self {
        Self::VariableDeclaration(VariableDeclaration {
            declarations: names
                .into_iter()
                .map(|name| VariableDeclarator {
                    id: Identifier { name, loc: None },
                    init: None,
                    loc: None,
                })
                .collect(),
            kind: VariableKind::Var,
            loc: None,
        })
    }
}

/// Formats a number the way the scripting language prints it (`9`, `1.25`, `NaN`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// Serde adapters for positions that always hold one node kind.
pub(crate) mod tagged {
    macro_rules! tagged_node {
        (@option $ty:ty, $tag:ident) => {
            pub(crate) mod option {
                use super::*;

                pub(crate) fn serialize<S: Serializer>(
                    node: &Option<$ty>,
                    s: S,
                ) -> Result<S::Ok, S::Error> {
                    node.as_ref().map(Out::$tag).serialize(s)
                }

                pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
                    d: D,
                ) -> Result<Option<$ty>, D::Error> {
                    Ok(Option::<In>::deserialize(d)?.map(|In::$tag(node)| node))
                }
            }
        };
        (@vec $ty:ty, $tag:ident) => {
            pub(crate) mod vec {
                use super::*;

                pub(crate) fn serialize<S: Serializer>(
                    nodes: &[$ty],
                    s: S,
                ) -> Result<S::Ok, S::Error> {
                    s.collect_seq(nodes.iter().map(Out::$tag))
                }

                pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
                    d: D,
                ) -> Result<Vec<$ty>, D::Error> {
                    Ok(Vec::<In>::deserialize(d)?.into_iter().map(|In::$tag(node)| node).collect())
                }
            }
        };
        // The listed wrappers (`option`, `vec`) get a submodule each.
        ($module:ident, $ty:ty, $tag:ident $(; $($wrapper:ident),+)?) => {
            pub(crate) mod $module {
                use serde::{Deserialize, Deserializer, Serialize, Serializer};

                #[allow(unused_imports)]
                use crate::ast::*;

                #[derive(Serialize)]
                #[serde(tag = "type")]
                enum Out<'a> {
                    $tag(&'a $ty),
                }

                #[derive(Deserialize)]
                #[serde(tag = "type")]
                enum In {
                    $tag($ty),
                }

                pub(crate) fn serialize<S: Serializer>(node: &$ty, s: S) -> Result<S::Ok, S::Error> {
                    Out::$tag(node).serialize(s)
                }

                pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<$ty, D::Error> {
                    let In::$tag(node) = In::deserialize(d)?;
                    Ok(node)
                }

                $($(tagged_node!(@$wrapper $ty, $tag);)+)?
            }
        };
    }

    tagged_node!(identifier, Identifier, Identifier; option, vec);
    tagged_node!(block, BlockStatement, BlockStatement; option);
    tagged_node!(variable_declaration, VariableDeclaration, VariableDeclaration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_location() {
        let loc = SourceLocation::new(Position::new(1, 4), Position::new(2, 0));
        assert_eq!(loc.describe("main.js"), "main.js@1.4-2.0");
    }

    #[test]
    fn test_operator_text() {
        assert_eq!(AssignmentOperator::UShrAssign.as_ref(), ">>>=");
        assert_eq!("instanceof".parse::<BinaryOperator>().unwrap(), BinaryOperator::Instanceof);
        assert_eq!(AssignmentOperator::BitXorAssign.binary(), Some(BinaryOperator::BitXor));
        assert_eq!(AssignmentOperator::Assign.binary(), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(9.0), "9");
        assert_eq!(format_number(1.25), "1.25");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }
}
