//! Parallel page-record construction
//!
//! Builds one index record per entry of the physical manifest. Each page
//! derives from a disjoint manifest entry and disjoint files, so
//! construction fans out across a bounded worker pool. Completion order
//! is non-deterministic; the collected records are re-sorted by declared
//! page order before they are handed to the structure mapper.

use async_trait::async_trait;
use folio_common::{IndexError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::model::{PageRecord, PhysicalPage, PhysicalManifest};

/// File inspection collaborator. Implementations probe the data folders
/// next to the source document; every probe is best-effort and returns
/// `None` for files that are missing or unreadable.
#[async_trait]
pub trait FileProbes: Send + Sync {
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Pixel dimensions of an image file as (width, height)
    async fn image_dimensions(&self, path: &Path) -> Option<(u32, u32)>;

    /// Full text for a page. `path` points at the plain-text candidate;
    /// implementations may fall back to an ALTO sibling, reported by the
    /// second tuple element.
    async fn full_text(&self, path: &Path) -> Option<(String, bool)>;
}

/// Sibling data folders of one source document, resolved by the
/// base-name + suffix convention.
#[derive(Debug, Clone, Default)]
pub struct DataFolders {
    pub media: Option<PathBuf>,
    pub fulltext: Option<PathBuf>,
    pub crowdsourcing: Option<PathBuf>,
    pub user_generated: Option<PathBuf>,
    pub technical: Option<PathBuf>,
    pub static_pages: Option<PathBuf>,
}

impl DataFolders {
    /// Discover the data folders for `base` inside `dir`. Folders that do
    /// not exist stay `None`.
    pub fn discover(dir: &Path, base: &str) -> Self {
        let probe = |suffix: &str| {
            let candidate = dir.join(format!("{base}{suffix}"));
            candidate.is_dir().then_some(candidate)
        };
        Self {
            media: probe("_media"),
            fulltext: probe("_txt"),
            crowdsourcing: probe("_crowd"),
            user_generated: probe("_ugc"),
            technical: probe("_tech"),
            static_pages: probe("_static"),
        }
    }

    /// Paths of the folders that exist
    pub fn existing(&self) -> Vec<PathBuf> {
        [
            &self.media,
            &self.fulltext,
            &self.crowdsourcing,
            &self.user_generated,
            &self.technical,
            &self.static_pages,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

pub struct PageDocumentBuilder {
    config: Arc<EngineConfig>,
    probes: Arc<dyn FileProbes>,
}

impl PageDocumentBuilder {
    pub fn new(config: Arc<EngineConfig>, probes: Arc<dyn FileProbes>) -> Self {
        Self { config, probes }
    }

    /// Build a record for every manifest entry.
    ///
    /// Exceeding the configured construction bound aborts only the
    /// current document: the error is recoverable and the source file is
    /// left for retry.
    #[instrument(skip(self, manifest, folders), fields(pages = manifest.pages.len()))]
    pub async fn build_all(
        &self,
        manifest: &PhysicalManifest,
        folders: &DataFolders,
    ) -> Result<Vec<PageRecord>> {
        let semaphore = Arc::new(Semaphore::new(self.config.page_workers));
        let mut handles = Vec::with_capacity(manifest.pages.len());

        for entry in manifest.pages.iter().cloned() {
            let semaphore = semaphore.clone();
            let probes = self.probes.clone();
            let folders = folders.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| IndexError::Fatal("page worker pool closed".to_string()))?;
                build_one(&entry, &folders, probes.as_ref()).await
            }));
        }

        let deadline = Duration::from_secs(self.config.page_timeout_secs);
        let mut records = tokio::time::timeout(deadline, async {
            let mut records = Vec::with_capacity(handles.len());
            for handle in handles {
                let record = handle
                    .await
                    .map_err(|e| IndexError::Parse(format!("page construction task failed: {e}")))??;
                records.push(record);
            }
            Ok::<_, IndexError>(records)
        })
        .await
        .map_err(|_| {
            IndexError::Timeout(format!(
                "page construction exceeded {}s",
                self.config.page_timeout_secs
            ))
        })??;

        // Canonical order, regardless of completion order
        records.sort_by_key(|r| r.order);

        debug!(records = records.len(), "page construction finished");
        Ok(records)
    }
}

async fn build_one(
    entry: &PhysicalPage,
    folders: &DataFolders,
    probes: &dyn FileProbes,
) -> Result<PageRecord> {
    let mut page = PageRecord::new(&entry.physical_id, entry.order, &entry.order_label);
    page.file_name = entry.file_name.clone();
    page.mime_type = entry.mime_type.clone();

    if let (Some(media), Some(file_name)) = (&folders.media, &entry.file_name) {
        let path = media.join(file_name);
        page.file_size = probes.file_size(&path).await;
        if let Some((width, height)) = probes.image_dimensions(&path).await {
            page.width = Some(width);
            page.height = Some(height);
        }
        page.has_image = page.file_size.is_some()
            && entry
                .mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with("image"));
    }

    // Crowdsourced transcriptions take precedence over OCR output
    let stem = entry
        .file_name
        .as_deref()
        .and_then(|f| Path::new(f).file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or(&entry.physical_id)
        .to_string();
    for folder in [&folders.crowdsourcing, &folders.fulltext]
        .into_iter()
        .flatten()
    {
        if let Some((text, from_alto)) = probes.full_text(&folder.join(format!("{stem}.txt"))).await
        {
            page.fulltext = Some(text);
            page.fulltext_from_alto = from_alto;
            page.has_fulltext = true;
            break;
        }
    }

    Ok(page)
}
