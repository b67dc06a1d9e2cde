//! Schema version history and source collaborators
//!
//! History is stored as a base snapshot plus a forward JSON Patch per
//! version; commits are guarded by an optimistic version check.
//!
//! ## Example
//!
//! ```rust,ignore
//! use schemaforge_history::{InMemoryVersionStore, VersionManager};
//!
//! let manager = VersionManager::new(Arc::new(InMemoryVersionStore::new()));
//! manager.init("main", &schema).await?;
//! let (latest, _) = manager.latest_content("main").await?;
//! manager.commit("main", &patch, latest).await?;
//! ```

pub mod fetcher;
pub mod file;
pub mod manager;
pub mod memory;
pub mod store;

pub use fetcher::{fetch_schema, FetchError, FileSystemFetcher, SourceFetcher, StaticFetcher};
pub use file::FileVersionStore;
pub use manager::{CommitOutcome, VersionError, VersionManager};
pub use memory::InMemoryVersionStore;
pub use store::{StoreError, VersionRecord, VersionStore};
