//! Data repository selection and archiving
//!
//! Successfully indexed sources are archived into one of the configured
//! data repositories, together with their sibling data folders. A work
//! lives in exactly one repository; when re-indexing selects a different
//! target, the previous repository is reported so stale copies can be
//! cleaned up.

use folio_common::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::hotfolder::rename_or_copy;

/// Subdirectory of a repository holding archived source documents
pub const INDEXED_DIR: &str = "indexed";

pub struct RepositorySelector {
    root: PathBuf,
    names: Vec<String>,
}

impl RepositorySelector {
    pub fn new(root: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            root: root.into(),
            names,
        }
    }

    /// Pick the repository for a work: the repository already holding an
    /// archived copy wins, otherwise the least filled one. The second
    /// element is the previous holder when it differs from the target.
    pub fn select(&self, pi: &str) -> Result<(PathBuf, Option<PathBuf>)> {
        let holder = self.find_holder(pi)?;

        let target = match &holder {
            Some(path) => path.clone(),
            None => self.least_filled()?,
        };
        let previous = holder.filter(|h| *h != target);
        Ok((target, previous))
    }

    /// Repository directory currently holding an archived source for the
    /// given identifier.
    pub fn find_holder(&self, pi: &str) -> Result<Option<PathBuf>> {
        for name in &self.names {
            let repo = self.root.join(name);
            for extension in ["xml", "json"] {
                if repo.join(INDEXED_DIR).join(format!("{pi}.{extension}")).is_file() {
                    return Ok(Some(repo));
                }
            }
        }
        Ok(None)
    }

    /// Archived source file for the given identifier, if any.
    pub fn find_archived(&self, pi: &str) -> Result<Option<PathBuf>> {
        for name in &self.names {
            for extension in ["xml", "json"] {
                let candidate = self
                    .root
                    .join(name)
                    .join(INDEXED_DIR)
                    .join(format!("{pi}.{extension}"));
                if candidate.is_file() {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    /// Archive a source file and its sibling data folders into the
    /// repository. Removes any stale archived copy from the previous
    /// repository.
    pub fn archive(
        &self,
        source: &Path,
        data_folders: &[PathBuf],
        pi: &str,
        repository: &Path,
        previous: Option<&Path>,
    ) -> Result<PathBuf> {
        let indexed = repository.join(INDEXED_DIR);
        fs::create_dir_all(&indexed)?;

        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("xml");
        let target = indexed.join(format!("{pi}.{extension}"));
        rename_or_copy(source, &target)?;

        // Digest recorded alongside so later maintenance runs can detect
        // silent corruption of the archived copy
        let digest = folio_common::checksum::sha256_file(&target)?;
        fs::write(target.with_extension(format!("{extension}.sha256")), digest)?;

        let data_root = repository.join("data");
        for folder in data_folders {
            if let Some(name) = folder.file_name() {
                fs::create_dir_all(&data_root)?;
                let folder_target = data_root.join(name);
                if folder_target.exists() {
                    fs::remove_dir_all(&folder_target)?;
                }
                move_dir(folder, &folder_target)?;
            }
        }

        if let Some(previous) = previous {
            for extension in ["xml", "json", "xml.sha256", "json.sha256"] {
                let stale = previous.join(INDEXED_DIR).join(format!("{pi}.{extension}"));
                if stale.is_file() {
                    fs::remove_file(&stale)?;
                    debug!(path = %stale.display(), "removed stale archived copy");
                }
            }
        }

        info!(pi = %pi, repository = %repository.display(), "source archived");
        Ok(target)
    }

    fn least_filled(&self) -> Result<PathBuf> {
        let mut best: Option<(usize, PathBuf)> = None;
        for name in &self.names {
            let repo = self.root.join(name);
            let count = match fs::read_dir(repo.join(INDEXED_DIR)) {
                Ok(entries) => entries.count(),
                Err(_) => 0,
            };
            if best.as_ref().map_or(true, |(c, _)| count < *c) {
                best = Some((count, repo));
            }
        }
        // `names` is validated non-empty at startup
        Ok(best.map(|(_, path)| path).unwrap_or_else(|| self.root.clone()))
    }
}

fn move_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(from, to)?;
    fs::remove_dir_all(from)
}

fn copy_dir_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn selector(root: &TempDir) -> RepositorySelector {
        RepositorySelector::new(
            root.path(),
            vec!["repo_a".to_string(), "repo_b".to_string()],
        )
    }

    fn seed_archived(root: &TempDir, repo: &str, pi: &str) {
        let indexed = root.path().join(repo).join(INDEXED_DIR);
        fs::create_dir_all(&indexed).unwrap();
        fs::write(indexed.join(format!("{pi}.xml")), "<record/>").unwrap();
    }

    #[test]
    fn test_existing_holder_wins() {
        let root = TempDir::new().unwrap();
        seed_archived(&root, "repo_b", "PPN1");

        let (target, previous) = selector(&root).select("PPN1").unwrap();
        assert_eq!(target, root.path().join("repo_b"));
        assert!(previous.is_none());
    }

    #[test]
    fn test_new_work_goes_to_least_filled() {
        let root = TempDir::new().unwrap();
        seed_archived(&root, "repo_a", "PPN1");
        seed_archived(&root, "repo_a", "PPN2");

        let (target, previous) = selector(&root).select("PPN3").unwrap();
        assert_eq!(target, root.path().join("repo_b"));
        assert!(previous.is_none());
    }

    #[test]
    fn test_archive_moves_source_and_data_folders() {
        let root = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let source = inbox.path().join("PPN1.xml");
        fs::write(&source, "<record/>").unwrap();
        let media = inbox.path().join("PPN1_media");
        fs::create_dir(&media).unwrap();
        fs::write(media.join("00000001.tif"), "img").unwrap();

        let selector = selector(&root);
        let (target, previous) = selector.select("PPN1").unwrap();
        let archived = selector
            .archive(&source, &[media.clone()], "PPN1", &target, previous.as_deref())
            .unwrap();

        assert!(archived.is_file());
        assert!(target
            .join(INDEXED_DIR)
            .join("PPN1.xml.sha256")
            .is_file());
        assert!(!source.exists());
        assert!(!media.exists());
        assert!(target.join("data/PPN1_media/00000001.tif").is_file());
    }

    #[test]
    fn test_stale_copy_removed_from_previous_repository() {
        let root = TempDir::new().unwrap();
        seed_archived(&root, "repo_a", "PPN1");
        let inbox = TempDir::new().unwrap();
        let source = inbox.path().join("PPN1.xml");
        fs::write(&source, "<record/>").unwrap();

        let selector = selector(&root);
        let previous = root.path().join("repo_a");
        selector
            .archive(
                &source,
                &[],
                "PPN1",
                &root.path().join("repo_b"),
                Some(previous.as_path()),
            )
            .unwrap();

        assert!(!previous.join(INDEXED_DIR).join("PPN1.xml").exists());
        assert!(root
            .path()
            .join("repo_b")
            .join(INDEXED_DIR)
            .join("PPN1.xml")
            .is_file());
    }
}
