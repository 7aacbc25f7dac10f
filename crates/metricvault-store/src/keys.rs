//! Partition-key and metadata row-id derivation.
//!
//! Partition keys are built from caller-supplied project and branch names,
//! so every character the table service rejects in a key is substituted
//! with `_`. Substitution is lossy: `project/A` and `project_A` share a
//! partition key. Metadata rows therefore never reuse the sanitized form
//! and are addressed by a SHA-256 digest of the raw project key instead.

use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

/// Longest partition key the table service accepts, in characters.
pub const MAX_PARTITION_KEY_CHARS: usize = 1024;

/// Path-like separators and query-special characters.
const FORBIDDEN_CHARS: [char; 4] = ['/', '\\', '#', '?'];

fn is_forbidden(c: char) -> bool {
    FORBIDDEN_CHARS.contains(&c)
        || ('\u{0000}'..='\u{001F}').contains(&c)
        || ('\u{007F}'..='\u{009F}').contains(&c)
}

/// Replace every forbidden or control character with `_`.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect()
}

/// Build the partition key for a (project, branch) pair.
///
/// An absent or empty branch yields the bare project key.
pub fn derive_partition_key(project: &str, branch: Option<&str>) -> StoreResult<String> {
    let raw = match branch {
        Some(branch) if !branch.is_empty() => format!("{project}_{branch}"),
        _ => project.to_string(),
    };
    let key = sanitize_key(&raw);
    let len = key.chars().count();
    if len > MAX_PARTITION_KEY_CHARS {
        return Err(StoreError::KeyTooLong {
            len,
            max: MAX_PARTITION_KEY_CHARS,
        });
    }
    Ok(key)
}

/// Row id of a project's metadata entry: hex SHA-256 of the raw key.
pub fn derive_metadata_row_id(project: &str) -> String {
    hex::encode(Sha256::digest(project.as_bytes()))
}

/// Row id the metadata index used before hashed ids.
///
/// Only consulted when cleaning up entries written under the old scheme.
pub fn legacy_metadata_row_id(project: &str) -> StoreResult<String> {
    derive_partition_key(project, None)
}
