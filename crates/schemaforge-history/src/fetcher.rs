//! Source text collaborators
//!
//! Converters never do I/O themselves; a [`SourceFetcher`] supplies the
//! text for a path at a given ref.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use schemaforge_core::{ProcessResult, SourceFormat};
use tokio::sync::RwLock;
use tracing::debug;

/// Errors that can occur when fetching source text
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Unsupported ref '{git_ref}' for {fetcher} fetcher")]
    UnsupportedRef { fetcher: &'static str, git_ref: String },

    #[error("Failed to read source: {0}")]
    Io(String),
}

/// Supplies schema source text
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetcher name (e.g., "filesystem")
    fn name(&self) -> &'static str;

    /// Fetch the text of `path` at `git_ref` (`None` means the current state)
    async fn fetch(&self, path: &str, git_ref: Option<&str>) -> Result<String, FetchError>;
}

/// Fetch `path` and parse it as `format`, or as the format implied by its
/// extension when `format` is `None`
pub async fn fetch_schema(
    fetcher: &dyn SourceFetcher,
    path: &str,
    git_ref: Option<&str>,
    format: Option<SourceFormat>,
) -> Result<ProcessResult, FetchError> {
    let text = fetcher.fetch(path, git_ref).await?;
    let format = format
        .or_else(|| SourceFormat::from_path(std::path::Path::new(path)))
        .unwrap_or_default();
    debug!(fetcher = fetcher.name(), path, format = %format, "fetched schema source");
    Ok(schemaforge_parser::parse(format, &text))
}

/// Reads sources from a local directory. Only the working tree is
/// available, so refs other than `HEAD` are rejected.
#[derive(Debug, Clone)]
pub struct FileSystemFetcher {
    root: PathBuf,
}

impl FileSystemFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for FileSystemFetcher {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn fetch(&self, path: &str, git_ref: Option<&str>) -> Result<String, FetchError> {
        if let Some(git_ref) = git_ref.filter(|r| *r != "HEAD") {
            return Err(FetchError::UnsupportedRef {
                fetcher: self.name(),
                git_ref: git_ref.to_string(),
            });
        }

        let full_path = self.root.join(path);
        tokio::fs::read_to_string(&full_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound(full_path.display().to_string()),
            _ => FetchError::Io(format!("{}: {}", full_path.display(), e)),
        })
    }
}

/// Serves predefined sources keyed by path and ref
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    sources: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` for `path` at `git_ref` (`None` registers `HEAD`)
    pub async fn add_source(&self, path: &str, git_ref: Option<&str>, text: impl Into<String>) {
        self.sources
            .write()
            .await
            .insert(Self::key(path, git_ref), text.into());
    }

    fn key(path: &str, git_ref: Option<&str>) -> (String, String) {
        (path.to_string(), git_ref.unwrap_or("HEAD").to_string())
    }
}

#[async_trait::async_trait]
impl SourceFetcher for StaticFetcher {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, path: &str, git_ref: Option<&str>) -> Result<String, FetchError> {
        self.sources
            .read()
            .await
            .get(&Self::key(path, git_ref))
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("{}@{}", path, git_ref.unwrap_or("HEAD"))))
    }
}
