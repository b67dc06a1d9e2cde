//! Prisma schema ingestion.
//!
//! PSL source is parsed into a DMMF-shaped [`dmmf::Datamodel`], which is
//! then converted. A DMMF JSON document can be converted directly with
//! [`parse_dmmf`].

pub mod converter;
pub mod dmmf;
pub mod psl;

use schemaforge_core::{ProcessError, ProcessResult};
use tracing::warn;

pub use converter::convert;
pub use dmmf::Datamodel;
pub use psl::{parse_schema, PslError};

/// Parse Prisma schema source
pub fn parse(input: &str) -> ProcessResult {
    match psl::parse_schema(input) {
        Ok(schema) => convert(&Datamodel::from(&schema)),
        Err(err) => {
            warn!(line = err.line, "prisma schema failed to parse: {}", err.message);
            ProcessResult::failed(ProcessError::invalid_document(err.to_string()))
        }
    }
}

/// Convert a DMMF JSON document
pub fn parse_dmmf(input: &str) -> ProcessResult {
    match serde_json::from_str::<Datamodel>(input) {
        Ok(datamodel) => convert(&datamodel),
        Err(err) => ProcessResult::failed(ProcessError::invalid_document(format!(
            "Invalid schema format: {}",
            err
        ))),
    }
}
