//! Plain-text chunk dump for human inspection.
//!
//! Writes each chunk to `<dir>/<organization>/chunk_NNNN.txt` with a
//! small metadata header followed by the chunk text. The dump mirrors
//! exactly what gets indexed, so reviewing it answers "why did that
//! query hit this text" without touching the engine.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Write all chunks under `dir`, one subdirectory per organization.
///
/// Any previous dump at `dir` is removed first so the output always
/// reflects a single ingestion run.
pub fn dump_chunks(dir: &Path, chunks: &[Chunk]) -> Result<usize> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .map_err(|e| Error::config(format!("failed to clear dump dir {}: {e}", dir.display())))?;
    }
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::config(format!("failed to create dump dir {}: {e}", dir.display())))?;

    // Group by organization, preserving chunk order within each group.
    let mut by_org: BTreeMap<&str, Vec<&Chunk>> = BTreeMap::new();
    for chunk in chunks {
        by_org.entry(chunk.organization.as_str()).or_default().push(chunk);
    }

    let mut written = 0;
    for (organization, group) in by_org {
        let org_dir = dir.join(safe_dir_name(organization));
        std::fs::create_dir_all(&org_dir).map_err(|e| {
            Error::config(format!("failed to create {}: {e}", org_dir.display()))
        })?;

        for (i, chunk) in group.iter().enumerate() {
            let path = org_dir.join(format!("chunk_{:04}.txt", i + 1));
            std::fs::write(&path, render_chunk(chunk))
                .map_err(|e| Error::config(format!("failed to write {}: {e}", path.display())))?;
            written += 1;
        }
    }

    info!(dir = %dir.display(), written, "dumped chunks");
    Ok(written)
}

fn render_chunk(chunk: &Chunk) -> String {
    let mut out = String::new();
    out.push_str(&format!("organization: {}\n", chunk.organization));
    out.push_str(&format!("document: {}\n", chunk.document_name));
    out.push_str(&format!("document_id: {}\n", chunk.document_id));
    for (level, text) in &chunk.header_path {
        out.push_str(&format!("header_{level}: {text}\n"));
    }
    out.push_str("---\n");
    out.push_str(&chunk.text);
    out.push('\n');
    out
}

/// Organization names come from filenames but may still carry spaces;
/// keep directory names shell-friendly.
fn safe_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn chunk(org: &str, text: &str) -> Chunk {
        let mut header_path = BTreeMap::new();
        header_path.insert(1, "Coverage".to_string());
        Chunk {
            text: text.to_string(),
            document_id: "doc-1".to_string(),
            organization: org.to_string(),
            document_name: "acme_policy.md".to_string(),
            source_path: "/corpus/acme_policy.md".to_string(),
            ingested_at: Utc::now(),
            header_path,
        }
    }

    #[test]
    fn test_dump_writes_numbered_files_per_org() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dump");

        let chunks = vec![chunk("Acme", "a"), chunk("Acme", "b"), chunk("Globex", "c")];
        let written = dump_chunks(&dir, &chunks).unwrap();

        assert_eq!(written, 3);
        assert!(dir.join("Acme/chunk_0001.txt").exists());
        assert!(dir.join("Acme/chunk_0002.txt").exists());
        assert!(dir.join("Globex/chunk_0001.txt").exists());
    }

    #[test]
    fn test_dump_clears_previous_output() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dump");

        dump_chunks(&dir, &[chunk("Acme", "a"), chunk("Acme", "b")]).unwrap();
        dump_chunks(&dir, &[chunk("Acme", "only")]).unwrap();

        assert!(dir.join("Acme/chunk_0001.txt").exists());
        assert!(!dir.join("Acme/chunk_0002.txt").exists());
    }

    #[test]
    fn test_dump_file_contains_metadata_and_text() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("dump");

        dump_chunks(&dir, &[chunk("Acme", "# Coverage\nbody")]).unwrap();
        let content = std::fs::read_to_string(dir.join("Acme/chunk_0001.txt")).unwrap();
        assert!(content.contains("organization: Acme"));
        assert!(content.contains("header_1: Coverage"));
        assert!(content.contains("# Coverage\nbody"));
    }

    #[test]
    fn test_safe_dir_name_replaces_spaces() {
        assert_eq!(safe_dir_name("Goudse Terms"), "Goudse_Terms");
    }
}
