use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by store construction and `store()`.
///
/// `load()` never returns one of these: unreadable entries are logged and
/// skipped instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unsupported or missing connection scheme, bad store settings
    #[error("Store configuration error: {0}")]
    Configuration(String),

    /// The file-system store directory does not exist
    #[error("Store directory {} does not exist; it must be created before use", .0.display())]
    Unavailable(PathBuf),

    /// `index.json` exists but cannot be parsed
    #[error("Corrupt store index {}: {source}", path.display())]
    CorruptIndex {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A store file could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A clip or the index could not be serialized
    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bundled migration has a bad file name or version
    #[error("Malformed migration: {0}")]
    MalformedMigration(String),

    /// A migration failed to apply and was rolled back
    #[error("Failed to apply migration {version} ({name}): {source}")]
    MigrationApply {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },
}
