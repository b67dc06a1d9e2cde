//! Patch-based version history with optimistic concurrency.
//!
//! A document's history is its base snapshot (version 0) plus one forward
//! patch per committed version. The content of version K is always
//! obtained by replaying patches 1..=K over the base snapshot, never read
//! from a stored copy.

use std::sync::Arc;

use schemaforge_core::{fingerprint_value, Diagnostic, DiagnosticCode, Schema, Severity};
use schemaforge_engine::{apply_patch, compare, Operation, PatchError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::{StoreError, VersionRecord, VersionStore};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VersionError {
    #[error("Version conflict: The schema has been modified since you last loaded it")]
    Conflict { assumed: u64, actual: u64 },

    #[error("Version {version} of {document} does not exist")]
    VersionNotFound { document: String, version: u64 },

    #[error("Failed to apply patch for version {version}: {source}")]
    Patch { version: u64, source: PatchError },

    #[error("Content is not a valid schema: {0}")]
    InvalidSchema(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for VersionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { expected, actual } => Self::Conflict {
                assumed: expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

/// A successful commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub version: u64,
    pub content: Value,
    pub reverse_patch: Vec<Operation>,
    /// Dangling references in the committed schema
    pub warnings: Vec<Diagnostic>,
}

/// Reads and writes document history through a [`VersionStore`]
#[derive(Clone)]
pub struct VersionManager {
    store: Arc<dyn VersionStore>,
}

impl VersionManager {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    /// Register a document whose history starts at `base`
    pub async fn init(&self, document: &str, base: &Schema) -> Result<(), VersionError> {
        self.store.create_document(document, base.to_value()).await?;
        info!(document, store = self.store.name(), "initialized schema history");
        Ok(())
    }

    /// Latest committed version number, 0 when nothing has been committed
    pub async fn latest_version(&self, document: &str) -> Result<u64, VersionError> {
        Ok(self.store.latest_version_number(document).await?.unwrap_or(0))
    }

    /// Content of `version`, rebuilt from the base snapshot
    pub async fn content_at(&self, document: &str, version: u64) -> Result<Value, VersionError> {
        let latest = self.latest_version(document).await?;
        if version > latest {
            return Err(VersionError::VersionNotFound {
                document: document.to_string(),
                version,
            });
        }
        let base = self.store.base_snapshot(document).await?;
        let records = self.store.versions_up_to(document, version).await?;
        replay(base, &records)
    }

    /// Latest version number and its content
    pub async fn latest_content(&self, document: &str) -> Result<(u64, Value), VersionError> {
        let latest = self.latest_version(document).await?;
        Ok((latest, self.content_at(document, latest).await?))
    }

    /// Content of `version` as a schema
    pub async fn schema_at(&self, document: &str, version: u64) -> Result<Schema, VersionError> {
        let content = self.content_at(document, version).await?;
        Schema::from_value(content).map_err(|e| VersionError::InvalidSchema(e.to_string()))
    }

    /// Commit `patch` on top of `assumed_latest`.
    ///
    /// Rejected with [`VersionError::Conflict`] when another commit landed
    /// after `assumed_latest`; nothing is written in that case and the
    /// caller should reload and recompute its patch.
    pub async fn commit(
        &self,
        document: &str,
        patch: &[Operation],
        assumed_latest: u64,
    ) -> Result<CommitOutcome, VersionError> {
        let base = self.store.base_snapshot(document).await?;
        let records = self.store.versions_up_to(document, assumed_latest).await?;
        let current = replay(base, &records)?;

        let version = assumed_latest + 1;
        let content = apply_patch(&current, patch).map_err(|source| VersionError::Patch { version, source })?;
        let schema = Schema::from_value(content.clone()).map_err(|e| VersionError::InvalidSchema(e.to_string()))?;
        let reverse_patch = compare(&content, &current);

        let actual = self.latest_version(document).await?;
        if actual != assumed_latest {
            warn!(document, assumed_latest, actual, "rejected stale commit");
            return Err(VersionError::Conflict {
                assumed: assumed_latest,
                actual,
            });
        }

        let record = VersionRecord {
            number: version,
            patch: patch.to_vec(),
            reverse_patch: reverse_patch.clone(),
            content_fingerprint: fingerprint_value(&content),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store
            .insert_version(document, assumed_latest, record, content.clone())
            .await?;
        info!(document, version, operations = patch.len(), "committed schema version");

        Ok(CommitOutcome {
            version,
            content,
            reverse_patch,
            warnings: schema.validate_references(),
        })
    }

    /// Content of `version` obtained by undoing later versions from the
    /// latest content, newest first
    pub async fn undo_to(&self, document: &str, version: u64) -> Result<Value, VersionError> {
        let (latest, mut content) = self.latest_content(document).await?;
        if version > latest {
            return Err(VersionError::VersionNotFound {
                document: document.to_string(),
                version,
            });
        }

        let records = self.store.versions_up_to(document, latest).await?;
        for record in records.iter().rev().filter(|r| r.number > version) {
            debug!(document, version = record.number, "undoing version");
            content = apply_patch(&content, &record.reverse_patch).map_err(|source| VersionError::Patch {
                version: record.number,
                source,
            })?;
        }
        Ok(content)
    }

    /// Replay every version and check it against its recorded
    /// fingerprint, and that each reverse patch restores its predecessor
    pub async fn verify(&self, document: &str) -> Result<Vec<Diagnostic>, VersionError> {
        let latest = self.latest_version(document).await?;
        let mut content = self.store.base_snapshot(document).await?;
        let records = self.store.versions_up_to(document, latest).await?;
        let mut diagnostics = Vec::new();

        for record in &records {
            let next = apply_patch(&content, &record.patch).map_err(|source| VersionError::Patch {
                version: record.number,
                source,
            })?;

            let fingerprint = fingerprint_value(&next);
            if fingerprint != record.content_fingerprint {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::HistoryFingerprintMismatch,
                        Severity::Error,
                        format!("Version {} of {} does not reproduce its recorded content", record.number, document),
                    )
                    .with_comparison(&record.content_fingerprint, fingerprint),
                );
            }

            let restored = apply_patch(&next, &record.reverse_patch).ok();
            if restored.as_ref() != Some(&content) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::HistoryFingerprintMismatch,
                    Severity::Error,
                    format!("Reverse patch of version {} of {} does not restore version {}", record.number, document, record.number - 1),
                ));
            }
            content = next;
        }

        if let Some(snapshot) = self.store.latest_snapshot(document).await? {
            if snapshot != content {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::HistoryFingerprintMismatch,
                    Severity::Warn,
                    format!("Stored snapshot of {} differs from replayed version {}", document, latest),
                ));
            }
        }
        Ok(diagnostics)
    }
}

/// Apply `records`' forward patches to `base` in order
fn replay(base: Value, records: &[VersionRecord]) -> Result<Value, VersionError> {
    records.iter().try_fold(base, |content, record| {
        apply_patch(&content, &record.patch).map_err(|source| VersionError::Patch {
            version: record.number,
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryVersionStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn manager() -> VersionManager {
        let store = InMemoryVersionStore::with_document("main", json!({ "tables": {} })).await;
        VersionManager::new(Arc::new(store))
    }

    #[tokio::test]
    async fn commit_then_conflict() {
        let manager = manager().await;
        let patch = vec![Operation::add("/tables/users", json!({ "name": "users" }))];

        let outcome = manager.commit("main", &patch, 0).await.unwrap();
        assert_eq!(outcome.version, 1);
        assert_eq!(outcome.content, json!({ "tables": { "users": { "name": "users" } } }));
        assert_eq!(outcome.reverse_patch, vec![Operation::remove("/tables/users")]);

        let error = manager.commit("main", &patch, 0).await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Version conflict: The schema has been modified since you last loaded it"
        );
        assert_eq!(manager.latest_version("main").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_patch_writes_nothing() {
        let manager = manager().await;
        let patch = vec![Operation::replace("/tables/missing/comment", json!("x"))];
        assert!(matches!(
            manager.commit("main", &patch, 0).await,
            Err(VersionError::Patch { version: 1, .. })
        ));
        assert_eq!(manager.latest_version("main").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn content_at_unknown_version() {
        let manager = manager().await;
        assert_eq!(
            manager.content_at("main", 3).await,
            Err(VersionError::VersionNotFound {
                document: "main".into(),
                version: 3
            })
        );
    }
}
