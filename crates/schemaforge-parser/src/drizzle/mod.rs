//! Drizzle ORM schema ingestion for MySQL and PostgreSQL.
//!
//! The TypeScript module is parsed into a small expression tree, table
//! and enum builders are recognized per dialect, and the resulting
//! definitions are converted once every table is known.

pub mod ast;
pub mod converter;
pub mod lexer;
pub mod parser;
pub mod table;
pub mod types;

use schemaforge_core::{ProcessError, ProcessResult};
use tracing::warn;

pub use parser::{parse_expression, parse_module, JsSyntaxError};
pub use table::{extract, Dialect, DrizzleModule};

/// Parse a Drizzle schema module for `dialect`
pub fn parse(source: &str, dialect: Dialect) -> ProcessResult {
    let output = parse_module(source);
    let module = extract(&output.statements, dialect);
    let mut result = converter::convert(&module, dialect);

    for error in output.errors {
        warn!(location = error.location, "drizzle syntax error: {}", error.message);
        result.errors.push(ProcessError::syntax(error.message, error.location));
    }
    result
}

pub fn parse_mysql(source: &str) -> ProcessResult {
    parse(source, Dialect::MySql)
}

pub fn parse_postgres(source: &str) -> ProcessResult {
    parse(source, Dialect::Postgres)
}
