use esprof_syntax::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstrumentError {
    /// The source text could not be parsed. The parser's error is kept as is.
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid ESTree document: {0}")]
    Json(#[from] serde_json::Error),
}
