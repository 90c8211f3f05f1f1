use esprof_syntax::ParseError;
use thiserror::Error;

use crate::value::Value;

/// Abrupt completion of script execution or of a hook.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A value thrown by the script with `throw`.
    #[error("uncaught exception: {0}")]
    Thrown(Value),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),
    #[error("RangeError: {0}")]
    Range(String),
    #[error("SyntaxError: {0}")]
    Syntax(#[from] ParseError),
    /// A compound-write or update hook received an operator tag it does not know.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    /// A subscription named an event kind outside the catalogue.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}

impl RuntimeError {
    /// Whether a script `try` statement may catch this error.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Self::UnknownOperator(_) | Self::UnknownEvent(_))
    }
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
