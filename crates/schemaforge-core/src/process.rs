//! Converter output: a best-effort schema plus accumulated errors

use serde::Serialize;

use crate::diagnostic::{Diagnostic, DiagnosticCode, Location, Severity};
use crate::schema::Schema;

/// A problem found while converting one construct of an input document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProcessError {
    #[error("Unexpected token: {message}")]
    UnexpectedToken { message: String },

    #[error("Unsupported token: {message}")]
    UnsupportedToken { message: String },

    #[error("Syntax error at offset {location}: {message}")]
    Syntax { message: String, location: usize },

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },
}

impl ProcessError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedToken {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedToken {
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>, location: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            location,
        }
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Convert to a diagnostic; `source` resolves byte offsets to lines
    pub fn to_diagnostic(&self, file: &str, source: Option<&str>) -> Diagnostic {
        let (code, severity) = match self {
            Self::UnexpectedToken { .. } => (DiagnosticCode::ParseUnexpectedToken, Severity::Warn),
            Self::UnsupportedToken { .. } => (DiagnosticCode::ParseUnsupportedToken, Severity::Warn),
            Self::Syntax { .. } => (DiagnosticCode::ParseSyntaxError, Severity::Error),
            Self::InvalidDocument { .. } => (DiagnosticCode::ParseInvalidDocument, Severity::Error),
        };

        let location = match (self, source) {
            (Self::Syntax { location, .. }, Some(src)) => Location::from_offset(file, src, *location),
            _ => Location::new(file),
        };

        Diagnostic::new(code, severity, self.to_string()).with_location(location)
    }
}

/// Result of running a converter over one input document
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProcessResult {
    pub value: Schema,
    pub errors: Vec<ProcessError>,
}

impl ProcessResult {
    pub fn new(value: Schema, errors: Vec<ProcessError>) -> Self {
        Self { value, errors }
    }

    /// A result with no tables and a single error
    pub fn failed(error: ProcessError) -> Self {
        Self {
            value: Schema::default(),
            errors: vec![error],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn diagnostics(&self, file: &str, source: Option<&str>) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|e| e.to_diagnostic(file, source))
            .collect()
    }
}
