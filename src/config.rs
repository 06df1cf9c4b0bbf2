//! Startup configuration.
//!
//! Two layers: command-line flags (with `INFLUSS_*` environment fallbacks)
//! pick the store and the listen address, and an optional TOML file holds
//! feed metadata and extractor settings. Feed flags override the file.
//!
//! The config file is optional: a missing or empty file yields defaults.
//! Unknown keys are accepted but logged as warnings, since they are most
//! likely typos.
use chrono::{DateTime, Utc};
use clap::Parser;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::FeedConfig;
use crate::storage::StoreConfig;

/// Environment variable holding the reader API key. Takes precedence over
/// `[extractor] api_key` in the config file.
pub const API_KEY_ENV: &str = "JINA_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("either --use-local-store or --use-sql-store must be given")]
    NoStoreSelected,

    #[error("--use-local-store and --use-sql-store are mutually exclusive")]
    ConflictingStores,

    #[error("--sql-connection-string is required with --use-sql-store")]
    MissingConnectionString,

    #[error("--sql-connection-string cannot be used with --use-local-store")]
    UnexpectedConnectionString,
}

// ============================================================================
// Command Line
// ============================================================================

#[derive(Parser, Debug, Clone)]
#[command(
    name = "influss",
    about = "Clip articles from the web and read them in your RSS reader"
)]
pub struct Args {
    /// Optional TOML config file with feed and extractor settings
    #[arg(long, value_name = "FILE", env = "INFLUSS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address the HTTP API listens on
    #[arg(long, default_value = "0.0.0.0:8080", env = "INFLUSS_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Store clips as files in --local-store-dir
    #[arg(long, env = "INFLUSS_USE_LOCAL_STORE")]
    pub use_local_store: bool,

    /// Directory of the local store (must exist)
    #[arg(
        long,
        value_name = "DIR",
        default_value = "store",
        env = "INFLUSS_LOCAL_STORE_DIR"
    )]
    pub local_store_dir: PathBuf,

    /// Store clips in the database at --sql-connection-string
    #[arg(long, env = "INFLUSS_USE_SQL_STORE")]
    pub use_sql_store: bool,

    /// sqlite3://<path> or postgres://... connection string
    #[arg(
        long,
        value_name = "URI",
        env = "INFLUSS_SQL_CONNECTION_STRING",
        hide_env_values = true
    )]
    pub sql_connection_string: Option<String>,

    /// Feed title
    #[arg(long, env = "INFLUSS_FEED_TITLE")]
    pub feed_title: Option<String>,

    /// Feed link
    #[arg(long, env = "INFLUSS_FEED_LINK")]
    pub feed_link: Option<String>,

    /// Feed description
    #[arg(long, env = "INFLUSS_FEED_DESCRIPTION")]
    pub feed_description: Option<String>,

    /// Feed author name
    #[arg(long, env = "INFLUSS_FEED_AUTHOR_NAME")]
    pub feed_author_name: Option<String>,

    /// Feed author email
    #[arg(long, env = "INFLUSS_FEED_AUTHOR_EMAIL")]
    pub feed_author_email: Option<String>,

    /// Feed category
    #[arg(long, env = "INFLUSS_FEED_CATEGORY")]
    pub feed_category: Option<String>,

    /// Maximum number of clips in the feed
    #[arg(long, env = "INFLUSS_FEED_ITEMS_LIMIT")]
    pub feed_items_limit: Option<usize>,
}

impl Args {
    /// Validate the store flags.
    ///
    /// # Errors
    ///
    /// Exactly one store must be selected, and a connection string is
    /// required for (and only allowed with) the SQL store.
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        match (self.use_local_store, self.use_sql_store) {
            (false, false) => Err(ConfigError::NoStoreSelected),
            (true, true) => Err(ConfigError::ConflictingStores),
            (true, false) => {
                if self.sql_connection_string.is_some() {
                    return Err(ConfigError::UnexpectedConnectionString);
                }
                Ok(StoreConfig::Local(self.local_store_dir.clone()))
            }
            (false, true) => match self.sql_connection_string.as_deref() {
                Some(conn) if !conn.trim().is_empty() => Ok(StoreConfig::Sql(conn.to_string())),
                _ => Err(ConfigError::MissingConnectionString),
            },
        }
    }

    /// Apply the `--feed-*` overrides on top of file settings.
    pub fn feed_settings(&self, mut settings: FeedSettings) -> FeedSettings {
        let overrides = [
            (&self.feed_title, &mut settings.title),
            (&self.feed_link, &mut settings.link),
            (&self.feed_description, &mut settings.description),
            (&self.feed_author_name, &mut settings.author_name),
            (&self.feed_author_email, &mut settings.author_email),
            (&self.feed_category, &mut settings.category),
        ];
        for (flag, field) in overrides {
            if let Some(value) = flag {
                field.clone_from(value);
            }
        }
        if let Some(limit) = self.feed_items_limit {
            settings.items_limit = limit;
        }
        settings
    }
}

// ============================================================================
// Configuration File
// ============================================================================

/// Contents of the optional config file.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub feed: FeedSettings,
    pub extractor: ExtractorSettings,
}

/// Channel metadata of the generated feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub title: String,
    pub link: String,
    pub description: String,
    pub author_name: String,
    pub author_email: String,
    pub category: String,
    /// Maximum number of clips rendered per request.
    pub items_limit: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            title: "influss".to_string(),
            link: String::new(),
            description: "influss RSS feed".to_string(),
            author_name: String::new(),
            author_email: String::new(),
            category: "Read It Later".to_string(),
            items_limit: 20,
        }
    }
}

impl FeedSettings {
    /// Channel metadata for a store created at `created_at`.
    pub fn to_feed_config(&self, created_at: DateTime<Utc>) -> FeedConfig {
        FeedConfig {
            title: self.title.clone(),
            link: self.link.clone(),
            description: self.description.clone(),
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            category: self.category.clone(),
            created_at,
        }
    }
}

/// Reader endpoint settings.
///
/// SEC-015: Custom Debug impl masks `api_key`.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Override of the reader endpoint (HTTPS, or localhost for testing).
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ExtractorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ExtractorSettings {
    /// The API key from `JINA_API_KEY`, falling back to the config file.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
    }
}

const KNOWN_KEYS: &[(&str, &[&str])] = &[
    (
        "feed",
        &[
            "title",
            "link",
            "description",
            "author_name",
            "author_email",
            "category",
            "items_limit",
        ],
    ),
    ("extractor", &["base_url", "api_key"]),
];

impl FileConfig {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(FileConfig::default())`
    /// - Empty file → `Ok(FileConfig::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: FileConfig = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let Some((_, fields)) = KNOWN_KEYS.iter().find(|(table, _)| table == key) else {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        };
        if let Some(table) = value.as_table() {
            for field in table.keys() {
                if !fields.contains(&field.as_str()) {
                    tracing::warn!(
                        key = %format!("{key}.{field}"),
                        "Unknown key in config file, ignoring"
                    );
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
