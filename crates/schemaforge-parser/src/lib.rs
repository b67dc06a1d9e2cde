//! Schema ingestion and SQL generation
//!
//! This crate handles:
//! - Parsing PostgreSQL DDL into the unified schema, statement by statement
//! - Converting Prisma schemas (PSL or DMMF JSON)
//! - Converting tbls introspection documents
//! - Converting Drizzle ORM modules for MySQL and PostgreSQL
//! - Converting Rails `schema.rb` files
//! - Deparsing a schema, or patch operations on it, to PostgreSQL DDL

pub mod drizzle;
pub mod postgres;
pub mod prisma;
pub mod schemarb;
pub mod tbls;

pub use postgres::{deparse, deparse_operations, Deparsed};

use schemaforge_core::{ParserSettings, ProcessResult, SourceFormat};
use tracing::debug;

/// Parse `input` as `format` with default settings
pub fn parse(format: SourceFormat, input: &str) -> ProcessResult {
    parse_with(format, input, &ParserSettings::default())
}

/// Parse `input` as `format`
pub fn parse_with(format: SourceFormat, input: &str, settings: &ParserSettings) -> ProcessResult {
    debug!(format = %format, bytes = input.len(), "parsing schema source");
    match format {
        SourceFormat::Postgres => postgres::parse_with(input, settings),
        SourceFormat::Prisma => prisma::parse(input),
        SourceFormat::Tbls => tbls::parse(input),
        SourceFormat::DrizzleMysql => drizzle::parse_mysql(input),
        SourceFormat::DrizzlePostgres => drizzle::parse_postgres(input),
        SourceFormat::SchemaRb => schemarb::parse(input),
    }
}
