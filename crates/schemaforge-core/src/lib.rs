//! SchemaForge Core
//!
//! Unified, format-agnostic schema model shared by every converter,
//! the diff engine, the override merger and the version history.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod schema;
pub mod process;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use schema::{
    default_relationship_name, fingerprint_value, handle_one_to_one_relationships, Cardinality,
    Column, Columns, Constraint, Constraints, DefaultValue, Enum, Enums, Extension, Extensions,
    Index, Indexes, ReferenceOption, Relationship, Relationships, Schema, Table, TableGroup,
    TableGroups, Tables,
};
pub use process::{ProcessError, ProcessResult};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, HistorySettings, OverrideSettings, ParserSettings, SourceFormat};
