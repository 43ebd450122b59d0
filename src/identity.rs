//! Stable document identity and filename conventions.
//!
//! A document's id is a SHA-256 digest of its source path truncated to
//! 16 hex characters. The path — not the content — is the dedup key, so
//! moving or renaming a file makes it a new document and orphans the old
//! chunks until a cleanup pass.

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest. 64 bits of id space is comfortably
/// collision-resistant for a corpus of thousands of documents.
const ID_HEX_LEN: usize = 16;

/// Derive a stable, collision-resistant document id from a source path.
///
/// Pure and deterministic: the same path yields the same id within and
/// across runs.
pub fn stable_id(source_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..ID_HEX_LEN].to_string()
}

/// Extract an organization name from a filename.
///
/// Strips the configured suffix token (e.g. `_policy.md`), replaces
/// separators with spaces, and title-cases the result:
/// `goudse_policy.md` → `Goudse`. This is a naming convention and it is
/// fragile to filename drift: an unrecognized suffix leaves the
/// organization equal to the (titled) filename, a degraded but safe
/// outcome rather than a failure.
pub fn organization_from_filename(filename: &str, suffix: &str) -> String {
    let base = filename.strip_suffix(suffix).unwrap_or(filename);
    title_case(&base.replace(['_', '-'], " "))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
