//! Multi-volume anchor consistency
//!
//! An anchor is a synthetic parent record aggregating the volumes of a
//! multi-volume work. Whenever a volume is (re)indexed, the anchor's
//! volume list is regenerated from scratch out of a fresh index query,
//! never patched incrementally, and the regenerated anchor document is
//! re-queued ahead of newly arriving files. Volumes whose recorded
//! parent identity went stale after anchor reprocessing are scheduled
//! for re-indexing, tracked in a pending set so a file already in
//! flight is not scheduled twice.

use folio_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::index::{FieldQuery, SearchIndex};
use crate::model::{fields, Identity, RecordKind};

/// One volume as read back from the index
#[derive(Debug, Clone)]
struct VolumeView {
    identity: Identity,
    pi: String,
    label: String,
    node_type: String,
    volume_order: Option<i64>,
    parent_identity: Option<String>,
    collections: Vec<String>,
}

/// Regenerated anchor source document, serialized into the input queue
/// with elevated priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorDocument {
    pub anchor_pi: String,
    pub volumes: Vec<AnchorVolumeEntry>,
    /// Volume collections merged in, deduplicated and sorted
    pub collections: Vec<String>,
}

/// One entry of the anchor's regenerated child-volume list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorVolumeEntry {
    /// Synthetic internal position, renumbered sequentially from 1
    pub position: u32,
    pub pi: String,
    pub identity: Identity,
    pub label: String,
    pub node_type: String,
}

pub struct AnchorConsistencyManager {
    index: Arc<dyn SearchIndex>,
    config: Arc<EngineConfig>,
    /// Persistent identifiers scheduled for re-indexing and not yet done
    pending: Mutex<HashSet<String>>,
}

impl AnchorConsistencyManager {
    pub fn new(index: Arc<dyn SearchIndex>, config: Arc<EngineConfig>) -> Self {
        Self {
            index,
            config,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Regenerate the anchor's volume list from all currently indexed
    /// volumes. Returns `None` when no volumes exist; an anchor without
    /// volumes is never deleted here, that is a separate maintenance
    /// operation.
    #[instrument(skip(self))]
    pub async fn regenerate(&self, anchor_pi: &str) -> Result<Option<AnchorDocument>> {
        let mut volumes = self.query_volumes(anchor_pi).await?;
        if volumes.is_empty() {
            info!(anchor = %anchor_pi, "no volumes indexed for anchor, skipping regeneration");
            return Ok(None);
        }

        // All-or-nothing sort strategy: one volume without an explicit
        // order discards numeric ordering for the whole set.
        if volumes.iter().all(|v| v.volume_order.is_some()) {
            volumes.sort_by_key(|v| v.volume_order.unwrap_or_default());
        } else {
            warn!(
                anchor = %anchor_pi,
                "volume without explicit order, sorting the whole set by label"
            );
            volumes.sort_by(|a, b| a.label.cmp(&b.label));
        }

        let mut collections: Vec<String> = Vec::new();
        if self.config.merge_anchor_collections {
            collections = volumes
                .iter()
                .flat_map(|v| v.collections.iter().cloned())
                .collect();
            collections.sort();
            collections.dedup();
        }

        let entries = volumes
            .into_iter()
            .enumerate()
            .map(|(i, v)| AnchorVolumeEntry {
                position: (i + 1) as u32,
                pi: v.pi,
                identity: v.identity,
                label: v.label,
                node_type: v.node_type,
            })
            .collect::<Vec<_>>();

        debug!(anchor = %anchor_pi, volumes = entries.len(), "anchor volume list regenerated");
        Ok(Some(AnchorDocument {
            anchor_pi: anchor_pi.to_string(),
            volumes: entries,
            collections,
        }))
    }

    /// Find volumes whose recorded parent identity no longer matches the
    /// anchor's current identity and schedule them for re-indexing.
    /// Returns the persistent identifiers to re-queue; identifiers
    /// already in flight are not returned again.
    #[instrument(skip(self))]
    pub async fn schedule_stale_volumes(
        &self,
        anchor_pi: &str,
        anchor_identity: Identity,
    ) -> Result<Vec<String>> {
        let volumes = self.query_volumes(anchor_pi).await?;
        let current = anchor_identity.to_string();

        let mut scheduled = Vec::new();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for volume in volumes {
            if volume.parent_identity.as_deref() == Some(current.as_str()) {
                continue;
            }
            if pending.insert(volume.pi.clone()) {
                scheduled.push(volume.pi);
            }
        }
        drop(pending);

        if !scheduled.is_empty() {
            info!(
                anchor = %anchor_pi,
                volumes = scheduled.len(),
                "scheduling volumes with stale parent identity for re-indexing"
            );
        }
        Ok(scheduled)
    }

    /// Remove a successfully reprocessed volume from the pending set.
    pub fn mark_reprocessed(&self, pi: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(pi);
    }

    pub fn is_pending(&self, pi: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(pi)
    }

    async fn query_volumes(&self, anchor_pi: &str) -> Result<Vec<VolumeView>> {
        let records = self
            .index
            .query_by_field(&FieldQuery::new(fields::PI_ANCHOR, anchor_pi).with_kind(RecordKind::Work))
            .await?;

        Ok(records
            .into_iter()
            .map(|r| VolumeView {
                identity: r.identity,
                pi: r.first_value(fields::PI).unwrap_or_default().to_string(),
                label: r.first_value(fields::LABEL).unwrap_or_default().to_string(),
                node_type: r
                    .first_value(fields::DOCSTRCT)
                    .unwrap_or_default()
                    .to_string(),
                volume_order: r
                    .first_value(fields::CURRENTNO)
                    .and_then(|v| v.parse().ok()),
                parent_identity: r.first_value(fields::IDDOC_PARENT).map(|v| v.to_string()),
                collections: r
                    .values(fields::COLLECTION)
                    .into_iter()
                    .map(|v| v.to_string())
                    .collect(),
            })
            .collect())
    }
}
