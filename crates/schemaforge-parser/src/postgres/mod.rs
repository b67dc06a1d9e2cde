//! PostgreSQL DDL: statement parsing, conversion and deparsing

pub mod check;
pub mod converter;
pub mod deparser;
pub mod operation_deparser;
pub mod statements;

use schemaforge_core::{ParserSettings, ProcessError, ProcessResult};
use tracing::warn;

pub use check::{check_detail, extract_check_body};
pub use deparser::{deparse, quote_identifier, Deparsed};
pub use operation_deparser::deparse_operations;
pub use statements::{parse_statements, ParseOutput, ParsedStatement, SqlSyntaxError};

/// Parse DDL text into a schema with default settings
pub fn parse(sql: &str) -> ProcessResult {
    parse_with(sql, &ParserSettings::default())
}

/// Parse DDL text into a schema.
///
/// Statements that fail to parse are reported as syntax errors and
/// skipped; with `chunk_statements` disabled everything after the first
/// failure is skipped as well.
pub fn parse_with(sql: &str, settings: &ParserSettings) -> ProcessResult {
    let output = parse_statements(sql, settings.chunk_statements);

    let mut result = converter::convert(sql, &output.statements);
    for error in output.errors {
        warn!(location = error.location, "{}", error.message);
        result
            .errors
            .push(ProcessError::syntax(error.message, error.location));
    }
    result
}
