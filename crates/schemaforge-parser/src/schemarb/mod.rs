//! Rails `db/schema.rb` ingestion.
//!
//! The file is read as a tree of Ruby method calls; only the calls the
//! Rails schema dumper emits are interpreted.

pub mod ast;
pub mod converter;
pub mod lexer;
pub mod parser;

use schemaforge_core::{ProcessError, ProcessResult};
use tracing::warn;

pub use parser::{parse_program, RubySyntaxError};

/// Parse a Rails schema file
pub fn parse(source: &str) -> ProcessResult {
    let output = parse_program(source);
    let mut result = converter::convert(&output.calls);

    for error in output.errors {
        warn!(location = error.location, "schema.rb syntax error: {}", error.message);
        result.errors.push(ProcessError::syntax(error.message, error.location));
    }
    result
}
