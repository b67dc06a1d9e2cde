//! Persistence contract for version history

use schemaforge_engine::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One committed version: the forward patch from the previous version
/// and the reverse patch back to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub number: u64,
    pub patch: Vec<Operation>,
    pub reverse_patch: Vec<Operation>,

    /// Fingerprint of the content this version produces
    pub content_fingerprint: String,

    /// RFC 3339 timestamp
    pub created_at: String,
}

/// Errors raised by a version store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document already exists: {0}")]
    DocumentExists(String),

    #[error("Expected latest version {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("Storage error: {0}")]
    Io(String),

    #[error("Corrupt history: {0}")]
    Corrupt(String),

    #[error("Invalid document name: {0}")]
    InvalidName(String),
}

/// Storage for schema documents and their version log.
///
/// Version numbers start at 1; a document with no versions is at
/// version 0, whose content is the base snapshot.
#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    /// Store name (e.g., "memory", "file")
    fn name(&self) -> &'static str;

    /// Register a document with its base snapshot
    async fn create_document(&self, document: &str, base: Value) -> Result<(), StoreError>;

    /// Highest committed version, `None` when nothing has been committed
    async fn latest_version_number(&self, document: &str) -> Result<Option<u64>, StoreError>;

    async fn base_snapshot(&self, document: &str) -> Result<Value, StoreError>;

    /// Versions `1..=number` in ascending order
    async fn versions_up_to(&self, document: &str, number: u64) -> Result<Vec<VersionRecord>, StoreError>;

    /// Persist a version and the full content it produces.
    ///
    /// Atomic: fails with [`StoreError::Conflict`] and writes nothing when
    /// the latest version is not `expected_latest`.
    async fn insert_version(
        &self,
        document: &str,
        expected_latest: u64,
        record: VersionRecord,
        content: Value,
    ) -> Result<(), StoreError>;

    /// Full content stored with the latest version, if any
    async fn latest_snapshot(&self, document: &str) -> Result<Option<Value>, StoreError>;
}

/// Stored state of one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredDocument {
    pub base: Value,
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl StoredDocument {
    pub fn new(base: Value) -> Self {
        Self {
            base,
            versions: Vec::new(),
            content: None,
        }
    }

    pub fn latest(&self) -> Option<u64> {
        self.versions.last().map(|v| v.number)
    }

    pub fn up_to(&self, number: u64) -> Vec<VersionRecord> {
        self.versions
            .iter()
            .filter(|v| v.number <= number)
            .cloned()
            .collect()
    }

    /// Append `record` if `expected_latest` still holds
    pub fn push(&mut self, expected_latest: u64, record: VersionRecord, content: Value) -> Result<(), StoreError> {
        let actual = self.latest().unwrap_or(0);
        if actual != expected_latest {
            return Err(StoreError::Conflict {
                expected: expected_latest,
                actual,
            });
        }
        if record.number != actual + 1 {
            return Err(StoreError::Corrupt(format!(
                "version {} does not follow version {}",
                record.number, actual
            )));
        }
        self.versions.push(record);
        self.content = Some(content);
        Ok(())
    }
}
