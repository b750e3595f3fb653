//! Hotfolder work queue
//!
//! Scans the watched input location for source documents. Regenerated
//! anchor documents carry the `.purge.json` suffix and are always picked
//! before ordinary files, ahead of newly arriving sources; everything
//! else is processed oldest first. File disposition after processing
//! lives here too: archive or delete on success, error location or
//! leave-in-place on failure.

use folio_common::Result;
use folio_core::AnchorDocument;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Suffix of high-priority anchor re-queue documents
pub const PURGE_SUFFIX: &str = ".purge.json";

/// Suffix of the success marker written for upstream workflow tooling
pub const SUCCESS_MARKER_SUFFIX: &str = ".indexed";

pub struct Hotfolder {
    dir: PathBuf,
    error_dir: PathBuf,
}

impl Hotfolder {
    pub fn new(dir: impl Into<PathBuf>, error_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            error_dir: error_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next file to process: purge documents first, then oldest first.
    /// Returns `None` when the queue is empty.
    pub fn next_file(&self) -> Result<Option<PathBuf>> {
        let mut candidates: Vec<(bool, SystemTime, PathBuf)> = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !is_source_file(&path) {
                continue;
            }
            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((is_purge_file(&path), modified, path));
        }

        // Priority files first, then by age
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(candidates.into_iter().next().map(|(_, _, path)| path))
    }

    /// Write a regenerated anchor document into the queue with elevated
    /// priority.
    pub fn requeue_anchor(&self, doc: &AnchorDocument) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}{PURGE_SUFFIX}", doc.anchor_pi));
        let json = serde_json::to_vec_pretty(doc)?;
        fs::write(&path, json)?;
        info!(anchor = %doc.anchor_pi, path = %path.display(), "anchor document re-queued");
        Ok(path)
    }

    /// Copy an archived source back into the queue for re-indexing.
    pub fn requeue_copy(&self, source: &Path) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "requeued.xml".into());
        let target = self.dir.join(file_name);
        fs::copy(source, &target)?;
        debug!(source = %source.display(), "archived source re-queued");
        Ok(target)
    }

    /// Move a failed source file to the error location.
    pub fn move_to_error(&self, path: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.error_dir)?;
        let target = self.error_dir.join(
            path.file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "unnamed".into()),
        );
        rename_or_copy(path, &target)?;
        warn!(path = %path.display(), target = %target.display(), "source moved to error location");
        Ok(target)
    }

    /// Write the success marker next to where the source file arrived.
    pub fn write_success_marker(&self, base: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{base}{SUCCESS_MARKER_SUFFIX}"));
        fs::write(&path, chrono::Utc::now().to_rfc3339())?;
        Ok(path)
    }
}

/// Files the daemon considers part of the queue
fn is_source_file(path: &Path) -> bool {
    if is_purge_file(path) {
        return true;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("xml") | Some("json")
    ) && !path
        .to_str()
        .is_some_and(|p| p.ends_with(SUCCESS_MARKER_SUFFIX))
}

pub fn is_purge_file(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(PURGE_SUFFIX))
}

/// Base name of a source file: stem without the purge suffix.
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if let Some(stripped) = name.strip_suffix(PURGE_SUFFIX) {
        return stripped.to_string();
    }
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Rename, falling back to copy+remove across filesystems.
pub fn rename_or_copy(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::AnchorDocument;
    use tempfile::TempDir;

    fn hotfolder() -> (TempDir, Hotfolder) {
        let dir = TempDir::new().unwrap();
        let hf = Hotfolder::new(dir.path(), dir.path().join("error"));
        (dir, hf)
    }

    #[test]
    fn test_purge_files_picked_before_older_sources() {
        let (dir, hf) = hotfolder();
        fs::write(dir.path().join("older.xml"), "<record/>").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("ANCHOR1.purge.json"), "{}").unwrap();

        let next = hf.next_file().unwrap().unwrap();
        assert!(is_purge_file(&next));
    }

    #[test]
    fn test_oldest_source_first() {
        let (dir, hf) = hotfolder();
        fs::write(dir.path().join("first.xml"), "<record/>").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("second.xml"), "<record/>").unwrap();

        let next = hf.next_file().unwrap().unwrap();
        assert_eq!(next.file_name().unwrap(), "first.xml");
    }

    #[test]
    fn test_markers_and_directories_ignored() {
        let (dir, hf) = hotfolder();
        fs::write(dir.path().join("PPN1.indexed"), "done").unwrap();
        fs::create_dir(dir.path().join("PPN1_media")).unwrap();

        assert!(hf.next_file().unwrap().is_none());
    }

    #[test]
    fn test_move_to_error() {
        let (dir, hf) = hotfolder();
        let source = dir.path().join("broken.xml");
        fs::write(&source, "not xml").unwrap();

        let target = hf.move_to_error(&source).unwrap();
        assert!(!source.exists());
        assert!(target.exists());
        assert_eq!(target.parent().unwrap(), dir.path().join("error"));
    }

    #[test]
    fn test_requeue_anchor_roundtrip() {
        let (dir, hf) = hotfolder();
        let doc = AnchorDocument {
            anchor_pi: "ANCHOR1".to_string(),
            volumes: Vec::new(),
            collections: Vec::new(),
        };

        let path = hf.requeue_anchor(&doc).unwrap();
        assert!(path.exists());
        assert_eq!(base_name(&path), "ANCHOR1");

        let parsed: AnchorDocument =
            serde_json::from_slice(&fs::read(dir.path().join("ANCHOR1.purge.json")).unwrap())
                .unwrap();
        assert_eq!(parsed.anchor_pi, "ANCHOR1");
    }

    #[test]
    fn test_base_name_strips_extension() {
        assert_eq!(base_name(Path::new("/in/PPN1.xml")), "PPN1");
        assert_eq!(base_name(Path::new("/in/ANCHOR1.purge.json")), "ANCHOR1");
    }
}
