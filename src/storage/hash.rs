use sha2::{Digest, Sha256};

use crate::clip::Clip;

/// Content-address of a clip: the hex-encoded SHA-256 of its URL.
///
/// Re-clipping a URL yields the same hash, so the file-system store
/// overwrites instead of duplicating.
pub fn clip_hash(clip: &Clip) -> String {
    url_hash(&clip.url)
}

pub(crate) fn url_hash(url: &str) -> String {
    let hash = Sha256::digest(url.as_bytes());
    format!("{:x}", hash)
}
