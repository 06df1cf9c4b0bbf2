//! Clip persistence.
//!
//! Two interchangeable backends implement [`Store`]:
//!
//! - [`FsStore`] keeps one JSON file per clip plus an `index.json` ledger
//!   under a directory that must already exist.
//! - [`SqlStore`] keeps clips in a `clip` table and migrates its schema on
//!   open. `sqlite3://` and `postgres://` connection strings are accepted.
//!
//! The backend is picked once at startup via [`StoreConfig`] and shared as
//! `Arc<dyn Store>`.

mod fs;
mod hash;
mod migrations;
mod sql;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Span;

use crate::clip::Clip;

pub use fs::FsStore;
pub use hash::clip_hash;
pub use migrations::{Migration, Migrator, BUNDLED_MIGRATIONS};
pub use sql::SqlStore;
pub use types::StoreError;

/// The storage contract every backend satisfies.
#[async_trait]
pub trait Store: Send + Sync {
    /// When this store was first created. Backends that cannot tell return
    /// the zero timestamp (Unix epoch).
    async fn created_at(&self) -> DateTime<Utc>;

    /// Persist a whole clip, replacing any earlier clip with the same URL.
    async fn store(&self, clip: &Clip) -> Result<(), StoreError>;

    /// The `limit` most recent clips, newest first.
    ///
    /// Best effort: entries that cannot be read are logged and omitted.
    async fn load(&self, limit: usize) -> Vec<Clip>;
}

/// Which backend to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// File-system store rooted at an existing directory
    Local(PathBuf),
    /// Relational store behind a connection URI
    Sql(String),
}

/// Open the configured backend.
///
/// `log` becomes the parent span of every event the store emits.
pub async fn open_store(config: &StoreConfig, log: Span) -> Result<Arc<dyn Store>, StoreError> {
    match config {
        StoreConfig::Local(dir) => Ok(Arc::new(FsStore::open(log, dir).await?)),
        StoreConfig::Sql(connection_string) => {
            Ok(Arc::new(SqlStore::open(log, connection_string).await?))
        }
    }
}
