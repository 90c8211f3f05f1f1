//! Names of the runtime hooks and helpers that build calls to them.

use esprof_syntax::Expression;

pub const OBJECT_ALLOC: &str = "esprof$onObjectAlloc";
pub const FUNCTION_DEFINED: &str = "esprof$onFunctionDefined";
pub const PROP_READ: &str = "esprof$onPropRead";
pub const PROP_WRITE: &str = "esprof$onPropWrite";
pub const PROP_OP_WRITE: &str = "esprof$onPropOpWrite";
pub const PROP_UPDATE: &str = "esprof$onPropUpdate";
pub const PROP_CALL: &str = "esprof$onPropCall";
pub const DIRECT_CALL: &str = "esprof$onDirectCall";
pub const METHOD_ENTRY: &str = "esprof$onMethodEntry";
pub const METHOD_EXIT: &str = "esprof$onMethodExit";

/// Prefix of the temporaries the engine introduces.
pub const TEMP_PREFIX: &str = "esprof$tmp";

/// Every hook an instrumented program may call.
pub const ALL: &[&str] = &[
    OBJECT_ALLOC,
    FUNCTION_DEFINED,
    PROP_READ,
    PROP_WRITE,
    PROP_OP_WRITE,
    PROP_UPDATE,
    PROP_CALL,
    DIRECT_CALL,
    METHOD_ENTRY,
    METHOD_EXIT,
];

/// `hook(arguments...)`
pub fn call(hook: &str, arguments: Vec<Expression>) -> Expression {
    Expression::call(Expression::identifier(hook), arguments)
}
