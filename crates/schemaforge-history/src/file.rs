//! JSON file version store
//!
//! Each document lives in `<root>/<document>.json`. Writes go to a
//! temporary file that is renamed over the original. Read-check-write
//! cycles are serialized per store instance and its clones; separate
//! instances on the same root do not share the lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{StoreError, StoredDocument, VersionRecord, VersionStore};

#[derive(Debug, Clone)]
pub struct FileVersionStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileVersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File of a document; names that could leave `root` are rejected
    fn path(&self, document: &str) -> Result<PathBuf, StoreError> {
        let escapes = document.is_empty()
            || document == "."
            || document.contains("..")
            || document.contains(['/', '\\', '\0']);
        if escapes {
            return Err(StoreError::InvalidName(document.to_string()));
        }
        Ok(self.root.join(format!("{}.json", document)))
    }

    async fn read(&self, document: &str) -> Result<StoredDocument, StoreError> {
        let path = self.path(document)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::DocumentNotFound(document.to_string()))
            }
            Err(e) => return Err(StoreError::Io(format!("{}: {}", path.display(), e))),
        };
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
    }

    async fn write(&self, document: &str, stored: &StoredDocument) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let path = self.path(document)?;
        let staging = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(stored).map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", staging.display(), e)))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), versions = stored.versions.len(), "wrote history file");
        Ok(())
    }
}

#[async_trait::async_trait]
impl VersionStore for FileVersionStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn create_document(&self, document: &str, base: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(self.path(document)?).await.unwrap_or(false) {
            return Err(StoreError::DocumentExists(document.to_string()));
        }
        self.write(document, &StoredDocument::new(base)).await
    }

    async fn latest_version_number(&self, document: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.read(document).await?.latest())
    }

    async fn base_snapshot(&self, document: &str) -> Result<Value, StoreError> {
        Ok(self.read(document).await?.base)
    }

    async fn versions_up_to(&self, document: &str, number: u64) -> Result<Vec<VersionRecord>, StoreError> {
        Ok(self.read(document).await?.up_to(number))
    }

    async fn insert_version(
        &self,
        document: &str,
        expected_latest: u64,
        record: VersionRecord,
        content: Value,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut stored = self.read(document).await?;
        stored.push(expected_latest, record, content)?;
        self.write(document, &stored).await
    }

    async fn latest_snapshot(&self, document: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read(document).await?.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVersionStore::new(dir.path().join("history"));
        store.create_document("main", json!({ "tables": {} })).await.unwrap();

        let record = VersionRecord {
            number: 1,
            patch: Vec::new(),
            reverse_patch: Vec::new(),
            content_fingerprint: "abc".into(),
            created_at: "2024-01-01T00:00:00+00:00".into(),
        };
        store
            .insert_version("main", 0, record.clone(), json!({ "tables": { "a": {} } }))
            .await
            .unwrap();

        let reopened = FileVersionStore::new(dir.path().join("history"));
        assert_eq!(reopened.latest_version_number("main").await.unwrap(), Some(1));
        assert_eq!(reopened.versions_up_to("main", 5).await.unwrap(), vec![record]);
        assert_eq!(
            reopened.latest_snapshot("main").await.unwrap(),
            Some(json!({ "tables": { "a": {} } }))
        );
        assert!(matches!(
            reopened.insert_version("main", 0, VersionRecord { number: 1, ..Default::default() }, json!({})).await,
            Err(StoreError::Conflict { expected: 0, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn document_names_cannot_leave_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVersionStore::new(dir.path().join("history"));

        for name in ["../escape", "nested/doc", "..", "a\\b", ""] {
            assert_eq!(
                store.create_document(name, json!({})).await,
                Err(StoreError::InvalidName(name.to_string())),
                "{:?}",
                name
            );
        }
        assert!(!dir.path().join("escape.json").exists());

        store.create_document("main.v2", json!({})).await.unwrap();
        assert!(dir.path().join("history").join("main.v2.json").exists());
    }

    #[tokio::test]
    async fn clones_share_the_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVersionStore::new(dir.path());
        store.create_document("main", json!({})).await.unwrap();

        let other = store.clone();
        let record = VersionRecord { number: 1, ..Default::default() };
        let (first, second) = tokio::join!(
            store.insert_version("main", 0, record.clone(), json!({ "n": 1 })),
            other.insert_version("main", 0, record.clone(), json!({ "n": 2 })),
        );
        assert!(first.is_ok() != second.is_ok(), "{:?} {:?}", first, second);
        assert_eq!(store.latest_version_number("main").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVersionStore::new(dir.path());
        assert_eq!(
            store.latest_version_number("main").await,
            Err(StoreError::DocumentNotFound("main".into()))
        );
    }
}
