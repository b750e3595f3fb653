//! Anchor re-queue documents
//!
//! After a volume is indexed, the anchor consistency manager writes the
//! regenerated anchor document back into the hotfolder as a high
//! priority `.purge.json` file. This adapter turns such a document into
//! a one-node tree carrying the complete, renumbered volume list; the
//! shared pipeline then replaces the anchor record in the index.

use async_trait::async_trait;
use folio_common::{IndexError, Result};
use folio_core::model::{fields, ANCHOR_TYPE};
use folio_core::{AnchorDocument, FormatAdapter, PhysicalManifest, StructureNode};
use std::path::Path;

use crate::hotfolder::is_purge_file;

#[derive(Default)]
pub struct AnchorQueueAdapter;

impl AnchorQueueAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FormatAdapter for AnchorQueueAdapter {
    fn name(&self) -> &'static str {
        "anchor-queue"
    }

    fn supports(&self, path: &Path) -> bool {
        is_purge_file(path)
    }

    async fn parse(&self, path: &Path) -> Result<(StructureNode, PhysicalManifest)> {
        let raw = tokio::fs::read(path).await?;
        let doc: AnchorDocument = serde_json::from_slice(&raw)?;
        if doc.anchor_pi.trim().is_empty() {
            return Err(IndexError::Validation(
                "anchor document without identifier".to_string(),
            ));
        }

        let label = doc
            .volumes
            .first()
            .map(|v| v.label.clone())
            .unwrap_or_else(|| doc.anchor_pi.clone());
        let mut root = StructureNode::new(ANCHOR_TYPE, label, doc.anchor_pi.clone());

        for volume in &doc.volumes {
            root.add_field_deduped(folio_core::MetadataField::new(
                fields::VOLUME_IDDOC,
                volume.identity.to_string(),
            ));
            root.add_field_deduped(folio_core::MetadataField::new(
                fields::VOLUME_NO,
                volume.position.to_string(),
            ));
        }
        for collection in &doc.collections {
            root.add_field_deduped(folio_core::MetadataField::new(
                fields::COLLECTION,
                collection,
            ));
        }

        Ok((root, PhysicalManifest::default()))
    }
}
