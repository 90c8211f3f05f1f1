//! # esprof-syntax
//!
//! ESTree-shaped syntax tree for the scripting language esprof instruments, with a parser, a
//! printer and JSON conversion for trees produced by other ESTree tools.

#[macro_use]
extern crate tracing;

pub mod ast;
mod error;
mod lexer;
mod parser;
mod printer;

pub use ast::*;
pub use error::ParseError;
pub use parser::{parse, ParseOptions};
pub use printer::{print, print_expression};

/// Read a program from its ESTree JSON form.
pub fn from_estree_json(json: &str) -> Result<Program, serde_json::Error> {
    serde_json::from_str(json)
}

/// Write a program in ESTree JSON form.
pub fn to_estree_json(program: &Program) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(program)
}
