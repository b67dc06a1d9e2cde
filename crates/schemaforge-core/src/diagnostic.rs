//! Diagnostic codes and error reporting
//!
//! Diagnostic codes are stable identifiers.
//! Never rename or remove a code; add new ones instead.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Parsing (1xxx)
    /// A construct was recognized but could not be converted
    ParseUnexpectedToken,

    /// A construct is valid in the source language but not supported
    ParseUnsupportedToken,

    /// A statement failed to parse
    ParseSyntaxError,

    /// The input document does not have the expected shape
    ParseInvalidDocument,

    // Schema validation (2xxx)
    /// A relationship or foreign key references a missing table or column
    SchemaDanglingReference,

    // Overrides (3xxx)
    /// An implementation request item was skipped because it already exists
    OverrideRequestSkipped,

    // History (4xxx)
    /// A reconstructed version does not match its recorded fingerprint
    HistoryFingerprintMismatch,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseUnexpectedToken => "PARSE_UNEXPECTED_TOKEN",
            Self::ParseUnsupportedToken => "PARSE_UNSUPPORTED_TOKEN",
            Self::ParseSyntaxError => "PARSE_SYNTAX_ERROR",
            Self::ParseInvalidDocument => "PARSE_INVALID_DOCUMENT",
            Self::SchemaDanglingReference => "SCHEMA_DANGLING_REFERENCE",
            Self::OverrideRequestSkipped => "OVERRIDE_REQUEST_SKIPPED",
            Self::HistoryFingerprintMismatch => "HISTORY_FINGERPRINT_MISMATCH",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location in an input document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path, or a label for in-memory input
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,

    /// Optional column number (1-indexed)
    pub column: Option<usize>,

    /// Optional byte offset into the input
    pub offset: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
            offset: None,
        }
    }

    /// Create a location with file, line, and column
    pub fn with_position(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
            offset: None,
        }
    }

    /// Resolve a byte offset in `source` into line and column
    pub fn from_offset(file: impl Into<String>, source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let prefix = source.get(..offset).unwrap_or(source);
        let line = prefix.matches('\n').count() + 1;
        let column = prefix
            .rfind('\n')
            .map(|nl| prefix[nl + 1..].chars().count() + 1)
            .unwrap_or_else(|| prefix.chars().count() + 1);

        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
            offset: Some(offset),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Expected value (for comparison diagnostics)
    pub expected: Option<String>,

    /// Actual value (for comparison diagnostics)
    pub actual: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.severity, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({}", location.file)?;
            if let (Some(line), Some(column)) = (location.line, location.column) {
                write!(f, ":{}:{}", line, column)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::ParseSyntaxError.as_str(), "PARSE_SYNTAX_ERROR");
        assert_eq!(DiagnosticCode::OverrideRequestSkipped.as_str(), "OVERRIDE_REQUEST_SKIPPED");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            DiagnosticCode::ParseSyntaxError,
            Severity::Error,
            "unexpected token",
        )
        .with_location(Location::with_position("schema.sql", 3, 7));

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("PARSE_SYNTAX_ERROR"));
        assert!(json.contains("error"));
    }

    #[test]
    fn location_from_offset() {
        let source = "CREATE TABLE a (\n  id int\n);";
        let offset = source.find("id").unwrap();
        let location = Location::from_offset("<input>", source, offset);

        assert_eq!(location.line, Some(2));
        assert_eq!(location.column, Some(3));
        assert_eq!(location.offset, Some(offset));
    }
}
