//! Indexing daemon
//!
//! Polls the hotfolder, hands each source file to the first adapter that
//! recognizes it, and runs the shared indexing pipeline. The loop
//! survives any single record's failure except the fatal category:
//! validation and parse failures route the source to the error location,
//! backend and timeout failures leave it in place for a later scan, and
//! fatal errors abort the process since continuing risks corrupting
//! further records.

use folio_common::{IndexError, Result};
use folio_core::{
    AnchorConsistencyManager, DataFolders, EngineConfig, FormatAdapter, HttpIndex,
    IndexOutcome, IndexingPipeline, SearchIndex,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::adapters;
use crate::config::DaemonConfig;
use crate::hotfolder::{base_name, is_purge_file, Hotfolder};
use crate::probes::BasicProbes;
use crate::repository::RepositorySelector;

pub struct Daemon {
    config: DaemonConfig,
    hotfolder: Hotfolder,
    repositories: RepositorySelector,
    adapters: Vec<Box<dyn FormatAdapter>>,
    pipeline: IndexingPipeline,
    anchors: AnchorConsistencyManager,
}

impl Daemon {
    /// Daemon against the configured HTTP search backend.
    pub fn new(config: DaemonConfig, engine: EngineConfig) -> Result<Self> {
        let index: Arc<dyn SearchIndex> = Arc::new(HttpIndex::new(&config.backend_url)?);
        Self::with_index(config, engine, index)
    }

    /// Daemon against an explicit backend; used by the test suites.
    pub fn with_index(
        config: DaemonConfig,
        engine: EngineConfig,
        index: Arc<dyn SearchIndex>,
    ) -> Result<Self> {
        engine.validate()?;
        config.validate()?;
        fs::create_dir_all(&config.hotfolder)?;

        let engine = Arc::new(engine);
        Ok(Self {
            hotfolder: Hotfolder::new(&config.hotfolder, &config.error_dir),
            repositories: RepositorySelector::new(
                &config.repositories_root,
                config.repositories.clone(),
            ),
            adapters: adapters::all(),
            pipeline: IndexingPipeline::new(
                engine.clone(),
                index.clone(),
                Arc::new(BasicProbes::new()),
            ),
            anchors: AnchorConsistencyManager::new(index, engine),
            config,
        })
    }

    /// Run the polling loop until a fatal error occurs.
    pub async fn run(&self) -> Result<()> {
        info!(
            hotfolder = %self.config.hotfolder.display(),
            backend = %self.config.backend_url,
            "indexing daemon started"
        );
        loop {
            match self.scan_once().await {
                Ok(0) => {},
                Ok(processed) => {
                    debug!(processed, "scan finished");
                    continue;
                },
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "fatal error, daemon shutting down");
                    return Err(e);
                },
                Err(e) => error!(error = %e, "scan failed"),
            }
            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
        }
    }

    /// Process everything currently queued. Returns the number of files
    /// handled; only fatal errors propagate.
    pub async fn scan_once(&self) -> Result<usize> {
        let mut processed = 0;
        while let Some(path) = self.hotfolder.next_file()? {
            match self.process_file(&path).await {
                Ok(outcome) => {
                    processed += 1;
                    info!(
                        pi = %outcome.pi,
                        records = outcome.stats.total_records,
                        "source processed"
                    );
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if e.is_retryable() => {
                    // Left in place for a later scan; stop so this scan
                    // does not spin on the same file
                    warn!(path = %path.display(), error = %e, "recoverable failure, source left for retry");
                    break;
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "source failed");
                    if self.config.move_failed_to_error {
                        self.hotfolder.move_to_error(&path)?;
                        processed += 1;
                    } else {
                        break;
                    }
                },
            }
        }
        Ok(processed)
    }

    async fn process_file(&self, path: &Path) -> Result<IndexOutcome> {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.supports(path))
            .ok_or_else(|| {
                IndexError::Validation(format!("no adapter recognizes {}", path.display()))
            })?;

        let base = base_name(path);
        let folders_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let folders = DataFolders::discover(folders_dir, &base);

        let outcome = self
            .pipeline
            .index_document(adapter.as_ref(), path, &folders)
            .await?;

        self.handle_anchors(path, &outcome).await?;
        self.dispose_success(path, &folders, &outcome)?;

        if self.config.write_success_marker {
            self.hotfolder.write_success_marker(&base)?;
        }
        Ok(outcome)
    }

    /// Anchor bookkeeping after a successful run. A volume triggers
    /// regeneration of its anchor unless the volume itself was re-queued
    /// because of an anchor change; an anchor document triggers
    /// re-indexing of volumes whose recorded parent identity went stale.
    async fn handle_anchors(&self, path: &Path, outcome: &IndexOutcome) -> Result<()> {
        let was_scheduled = self.anchors.is_pending(&outcome.pi);
        self.anchors.mark_reprocessed(&outcome.pi);

        if let Some(anchor_pi) = &outcome.anchor_pi {
            if was_scheduled {
                debug!(pi = %outcome.pi, "volume re-indexed after anchor change, not regenerating again");
            } else if let Some(doc) = self.anchors.regenerate(anchor_pi).await? {
                self.hotfolder.requeue_anchor(&doc)?;
            }
        }

        if is_purge_file(path) {
            let stale = self
                .anchors
                .schedule_stale_volumes(&outcome.pi, outcome.root_identity)
                .await?;
            for pi in stale {
                match self.repositories.find_archived(&pi)? {
                    Some(source) => {
                        self.hotfolder.requeue_copy(&source)?;
                    },
                    None => {
                        warn!(pi = %pi, "no archived source for stale volume, cannot re-queue");
                        self.anchors.mark_reprocessed(&pi);
                    },
                }
            }
        }
        Ok(())
    }

    fn dispose_success(
        &self,
        path: &Path,
        folders: &DataFolders,
        outcome: &IndexOutcome,
    ) -> Result<()> {
        if is_purge_file(path) {
            // Synthetic re-queue documents are never archived
            fs::remove_file(path)?;
        } else if self.config.archive_sources {
            let (target, previous) = self.repositories.select(&outcome.pi)?;
            self.repositories.archive(
                path,
                &folders.existing(),
                &outcome.pi,
                &target,
                previous.as_deref(),
            )?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
