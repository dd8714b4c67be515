//! Hashing of study identifiers into backup file names.
//!
//! Study Instance UIDs are dotted numeric strings of up to 64 characters, but
//! the backup tier accepts any opaque identifier, so names are derived from a
//! hash rather than the identifier itself.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Directory under the backup root that holds per-study files.
pub const MEMO_DIR: &str = "memos";

/// Hash a study identifier to a file name component.
///
/// Returns a 16-character hex string.
///
/// # Example
/// ```
/// use memo_storage::key::uid_to_hash;
/// let hash = uid_to_hash("1.2.840.113619.2.55.3");
/// assert_eq!(hash.len(), 16);
/// ```
pub fn uid_to_hash(study_uid: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(study_uid.as_bytes());
    let hash = hasher.finalize();

    // First 8 bytes are plenty for a per-client backup directory
    hex::encode(&hash[..8])
}

/// Path of the backup file for a study.
///
/// The structure is `memos/a/b/ab12cd34ef56ab78.json` where `a` and `b` are
/// the first two hex characters of the hash.
pub fn memo_path(root: &Path, study_uid: &str) -> PathBuf {
    let hash = uid_to_hash(study_uid);

    root.join(MEMO_DIR)
        .join(&hash[0..1])
        .join(&hash[1..2])
        .join(format!("{}.json", hash))
}
