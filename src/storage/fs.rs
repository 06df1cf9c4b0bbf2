use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::Span;

use super::hash::clip_hash;
use super::types::StoreError;
use super::Store;
use crate::clip::Clip;

const INDEX_FILE: &str = "index.json";

// ============================================================================
// On-disk Types
// ============================================================================

/// Contents of `index.json`.
///
/// `clips` is a `BTreeMap` so the file is written with sorted keys.
#[derive(Debug, Serialize, Deserialize)]
struct Index {
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    #[serde(default)]
    clips: BTreeMap<String, IndexEntry>,
}

impl Index {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_updated_at: now,
            clips: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    hash: String,
    path: PathBuf,
    timestamp: DateTime<Utc>,
}

/// Contents of `<hash>.json`. The plain text goes to `<hash>.txt` instead.
#[derive(Debug, Serialize, Deserialize)]
struct FsClip {
    url: String,
    title: String,
    published_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    author: String,
    excerpt: String,
    html_content: String,
}

impl From<&Clip> for FsClip {
    fn from(clip: &Clip) -> Self {
        Self {
            url: clip.url.clone(),
            title: clip.title.clone(),
            published_at: clip.published_at,
            modified_at: clip.modified_at,
            author: clip.author.clone(),
            excerpt: clip.excerpt.clone(),
            html_content: clip.html_content.clone(),
        }
    }
}

impl FsClip {
    fn into_clip(self) -> Clip {
        Clip {
            url: self.url,
            title: self.title,
            author: self.author,
            published_at: self.published_at,
            modified_at: self.modified_at,
            excerpt: self.excerpt,
            html_content: self.html_content,
            plain_text_content: String::new(),
        }
    }
}

// ============================================================================
// FsStore
// ============================================================================

/// File-system backed clip store.
///
/// One `RwLock` guards the in-memory index and, by convention, the files it
/// describes: `store()` holds it exclusively for the whole write sequence,
/// `load()` holds it shared while reading clip files.
///
/// The write sequence (clip file, text file, index file) is not atomic. A
/// crash part-way through can leave a clip file the index does not know
/// about; such orphans are tolerated and never cleaned up.
///
/// File names, key names and key order are fixed; the bytes are not. `<`, `>`
/// and `&` are written raw, not as `\u003c`-style escapes, and timestamps are
/// UTC with a `Z` suffix and 0, 3, 6 or 9 fractional digits. Files that use
/// escapes or a local offset with trimmed fractions read back the same.
pub struct FsStore {
    dir: PathBuf,
    created_at: DateTime<Utc>,
    index: RwLock<Index>,
    log: Span,
}

impl FsStore {
    /// Open the store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if `dir` is not an existing
    /// directory (it is never created here) and `StoreError::CorruptIndex`
    /// if `index.json` exists but cannot be parsed.
    pub async fn open(log: Span, dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(StoreError::Unavailable(dir)),
        }

        let index_path = dir.join(INDEX_FILE);
        let index = match tokio::fs::read(&index_path).await {
            Ok(bytes) => serde_json::from_slice::<Index>(&bytes).map_err(|source| {
                StoreError::CorruptIndex {
                    path: index_path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Persist right away so created_at survives a restart
                // that happens before the first clip is stored.
                let index = Index::new(Utc::now());
                write_json(&index, &index_path, "index").await?;
                tracing::debug!(
                    parent: &log,
                    dir = %dir.display(),
                    "Initialized empty store index"
                );
                index
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: index_path,
                    source,
                })
            }
        };

        tracing::debug!(
            parent: &log,
            dir = %dir.display(),
            clips = index.clips.len(),
            "Opened file-system store"
        );

        Ok(Self {
            dir,
            created_at: index.created_at,
            index: RwLock::new(index),
            log,
        })
    }

    fn clip_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }

    fn text_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.txt"))
    }
}

#[async_trait]
impl Store for FsStore {
    async fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    async fn store(&self, clip: &Clip) -> Result<(), StoreError> {
        let mut index = self.index.write().await;

        let hash = clip_hash(clip);
        let entry = IndexEntry {
            path: self.clip_path(&hash),
            hash: hash.clone(),
            timestamp: Utc::now(),
        };

        write_json(&FsClip::from(clip), &entry.path, "clip").await?;

        // Plain text sidecar for shell tooling; failing here fails the store.
        let text_path = self.text_path(&hash);
        tokio::fs::write(&text_path, clip.plain_text_content.as_bytes())
            .await
            .map_err(|source| StoreError::Io {
                path: text_path,
                source,
            })?;

        index.last_updated_at = entry.timestamp;
        index.clips.insert(hash, entry);

        write_json(&*index, &self.dir.join(INDEX_FILE), "index").await
    }

    async fn load(&self, limit: usize) -> Vec<Clip> {
        let index = self.index.read().await;

        let mut entries: Vec<&IndexEntry> = index.clips.values().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);

        let mut clips = Vec::with_capacity(entries.len());
        for entry in entries {
            let bytes = match tokio::fs::read(&entry.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(
                        parent: &self.log,
                        clip_hash = %entry.hash,
                        path = %entry.path.display(),
                        error = %e,
                        "Unable to load clip"
                    );
                    continue;
                }
            };
            match serde_json::from_slice::<FsClip>(&bytes) {
                Ok(fs_clip) => clips.push(fs_clip.into_clip()),
                Err(e) => {
                    tracing::warn!(
                        parent: &self.log,
                        clip_hash = %entry.hash,
                        error = %e,
                        "Unable to parse clip"
                    );
                }
            }
        }

        clips
    }
}

async fn write_json<T: Serialize + ?Sized>(
    value: &T,
    path: &Path,
    what: &'static str,
) -> Result<(), StoreError> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize { what, source })?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

// ============================================================================
// Tests
// ============================================================================
