//! In-memory version store
//!
//! Keeps every document in a shared map. Clones share the same storage,
//! so several managers can race against one store in tests.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{StoreError, StoredDocument, VersionRecord, VersionStore};

#[derive(Debug, Clone, Default)]
pub struct InMemoryVersionStore {
    documents: Arc<RwLock<HashMap<String, StoredDocument>>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one document already registered
    pub async fn with_document(document: &str, base: Value) -> Self {
        let store = Self::new();
        store
            .documents
            .write()
            .await
            .insert(document.to_string(), StoredDocument::new(base));
        store
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Number of versions recorded for `document`
    pub async fn version_count(&self, document: &str) -> usize {
        self.documents
            .read()
            .await
            .get(document)
            .map(|d| d.versions.len())
            .unwrap_or(0)
    }
}

fn not_found(document: &str) -> StoreError {
    StoreError::DocumentNotFound(document.to_string())
}

#[async_trait::async_trait]
impl VersionStore for InMemoryVersionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_document(&self, document: &str, base: Value) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(document) {
            return Err(StoreError::DocumentExists(document.to_string()));
        }
        documents.insert(document.to_string(), StoredDocument::new(base));
        Ok(())
    }

    async fn latest_version_number(&self, document: &str) -> Result<Option<u64>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(document)
            .map(StoredDocument::latest)
            .ok_or_else(|| not_found(document))
    }

    async fn base_snapshot(&self, document: &str) -> Result<Value, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(document)
            .map(|d| d.base.clone())
            .ok_or_else(|| not_found(document))
    }

    async fn versions_up_to(&self, document: &str, number: u64) -> Result<Vec<VersionRecord>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(document)
            .map(|d| d.up_to(number))
            .ok_or_else(|| not_found(document))
    }

    async fn insert_version(
        &self,
        document: &str,
        expected_latest: u64,
        record: VersionRecord,
        content: Value,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        documents
            .get_mut(document)
            .ok_or_else(|| not_found(document))?
            .push(expected_latest, record, content)
    }

    async fn latest_snapshot(&self, document: &str) -> Result<Option<Value>, StoreError> {
        let documents = self.documents.read().await;
        documents
            .get(document)
            .map(|d| d.content.clone())
            .ok_or_else(|| not_found(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(number: u64) -> VersionRecord {
        VersionRecord {
            number,
            patch: Vec::new(),
            reverse_patch: Vec::new(),
            content_fingerprint: String::new(),
            created_at: String::new(),
        }
    }

    #[tokio::test]
    async fn insert_rechecks_expected_latest() {
        let store = InMemoryVersionStore::with_document("main", json!({ "tables": {} })).await;
        store.insert_version("main", 0, record(1), json!({})).await.unwrap();

        let error = store.insert_version("main", 0, record(1), json!({})).await.unwrap_err();
        assert_eq!(error, StoreError::Conflict { expected: 0, actual: 1 });
        assert_eq!(store.version_count("main").await, 1);
        assert_eq!(store.latest_version_number("main").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unknown_documents_are_errors() {
        let store = InMemoryVersionStore::new();
        assert_eq!(
            store.base_snapshot("nope").await,
            Err(StoreError::DocumentNotFound("nope".into()))
        );
        store.create_document("nope", json!({})).await.unwrap();
        assert!(matches!(
            store.create_document("nope", json!({})).await,
            Err(StoreError::DocumentExists(_))
        ));
        assert_eq!(store.document_count().await, 1);
    }
}
