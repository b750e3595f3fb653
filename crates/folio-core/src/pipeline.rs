//! Per-document indexing pipeline
//!
//! Runs the full compilation of one source document: parse via the
//! format adapter, inheritance pass, parallel page construction,
//! identity assignment, ownership mapping, grouped-metadata
//! materialization, then one atomic write batch. Records of a previous
//! run for the same work are deleted in the same commit, so re-indexing
//! an unchanged source leaves no duplicate or orphaned records. On any
//! failure the backend is rolled back before the error propagates and
//! the source file is left in place for retry.

use folio_common::{IndexError, Result};
use futures::future::{BoxFuture, FutureExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::adapter::FormatAdapter;
use crate::batch::WriteBatch;
use crate::config::EngineConfig;
use crate::grouped::{GroupOwner, GroupedMetadataMaterializer};
use crate::index::{FieldQuery, SearchIndex};
use crate::inherit::InheritancePass;
use crate::mapper::StructureMapper;
use crate::model::{
    fields, Identity, IndexRecord, PageRecord, PhysicalManifest, RecordKind, StructureNode,
};
use crate::pages::{DataFolders, FileProbes, PageDocumentBuilder};
use crate::sequencer::IdentitySequencer;
use crate::stats::DocumentStats;

/// Result of one successful indexing run
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    /// Persistent identifier of the indexed work
    pub pi: String,
    pub root_identity: Identity,
    /// Anchor this work belongs to; the caller triggers anchor
    /// regeneration when set
    pub anchor_pi: Option<String>,
    pub stats: DocumentStats,
}

pub struct IndexingPipeline {
    config: Arc<EngineConfig>,
    index: Arc<dyn SearchIndex>,
    sequencer: Arc<IdentitySequencer>,
    builder: PageDocumentBuilder,
    mapper: StructureMapper,
    materializer: GroupedMetadataMaterializer,
}

impl IndexingPipeline {
    pub fn new(
        config: Arc<EngineConfig>,
        index: Arc<dyn SearchIndex>,
        probes: Arc<dyn FileProbes>,
    ) -> Self {
        let sequencer = Arc::new(IdentitySequencer::new(index.clone()));
        Self {
            builder: PageDocumentBuilder::new(config.clone(), probes),
            mapper: StructureMapper::new(config.clone()),
            materializer: GroupedMetadataMaterializer::new(),
            config,
            index,
            sequencer,
        }
    }

    pub fn sequencer(&self) -> Arc<IdentitySequencer> {
        self.sequencer.clone()
    }

    /// Index one source document end to end.
    #[instrument(skip(self, adapter, folders), fields(adapter = adapter.name(), path = %path.display()))]
    pub async fn index_document(
        &self,
        adapter: &dyn FormatAdapter,
        path: &Path,
        folders: &DataFolders,
    ) -> Result<IndexOutcome> {
        let (mut root, manifest) = adapter.parse(path).await?;
        if root.logical_id.trim().is_empty() {
            return Err(IndexError::Validation(
                "source document has no persistent identifier".to_string(),
            ));
        }

        match self.run(&mut root, &manifest, folders).await {
            Ok(outcome) => {
                info!(
                    pi = %outcome.pi,
                    records = outcome.stats.total_records,
                    superseded = outcome.stats.superseded_records,
                    duration_secs = outcome.stats.duration_secs,
                    "document indexed"
                );
                Ok(outcome)
            },
            Err(e) => {
                // Discard any partially applied state before propagating
                if let Err(rollback_err) = self.index.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed indexing run also failed");
                }
                Err(e)
            },
        }
    }

    async fn run(
        &self,
        root: &mut StructureNode,
        manifest: &PhysicalManifest,
        folders: &DataFolders,
    ) -> Result<IndexOutcome> {
        let mut stats = DocumentStats::new();

        InheritancePass::new(self.config.clone()).run(root);
        info!(
            pi = %root.logical_id,
            structure_nodes = root.subtree_size(),
            physical_pages = manifest.pages.len(),
            "compiling document"
        );

        let mut pages = self.builder.build_all(manifest, folders).await?;

        self.assign_identities(root).await?;
        let root_identity = root
            .identity
            .ok_or_else(|| IndexError::Validation("root node has no identity".to_string()))?;
        let pi = root.logical_id.clone();

        self.mapper.map_tree(root, &mut pages);

        // Stage deletion of the previous run's records; applied in the
        // same commit as the rewrite, so the swap is atomic.
        let prior = self
            .index
            .query_by_field(&FieldQuery::new(fields::PI_TOPSTRUCT, &pi))
            .await?;
        if !prior.is_empty() {
            let ids: Vec<Identity> = prior.iter().map(|r| r.identity).collect();
            self.index.delete_by_identity(&ids).await?;
            stats.superseded_records = ids.len() as i64;
        }

        // A volume records its anchor's current identity as parent, so
        // staleness after anchor reprocessing is detectable
        let mut anchor_parent = None;
        if let Some(anchor_pi) = &root.anchor_id {
            anchor_parent = self
                .index
                .query_by_field(
                    &FieldQuery::new(fields::PI, anchor_pi).with_kind(RecordKind::Anchor),
                )
                .await?
                .first()
                .map(|r| r.identity);
        }

        let mut batch = WriteBatch::new();
        self.flatten_node(root, None, anchor_parent, root_identity, &pi, &mut batch, &mut stats)
            .await?;
        for page in &mut pages {
            self.flatten_page(page, root_identity, root, &pi, &mut batch, &mut stats)
                .await?;
        }

        batch.commit(self.index.as_ref()).await?;
        batch.release();
        stats.complete();

        Ok(IndexOutcome {
            pi,
            root_identity,
            anchor_pi: root.anchor_id.clone(),
            stats,
        })
    }

    /// Assign a fresh identity to every node, depth-first.
    fn assign_identities<'a>(&'a self, node: &'a mut StructureNode) -> BoxFuture<'a, Result<()>> {
        async move {
            node.identity = Some(self.sequencer.next().await?);
            for child in &mut node.children {
                self.assign_identities(child).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn flatten_node<'a>(
        &'a self,
        node: &'a mut StructureNode,
        parent: Option<Identity>,
        anchor_parent: Option<Identity>,
        topstruct: Identity,
        pi: &'a str,
        batch: &'a mut WriteBatch,
        stats: &'a mut DocumentStats,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let identity = node
                .identity
                .ok_or_else(|| {
                    IndexError::Validation(format!("node {} has no identity", node.logical_id))
                })?;

            // Materialize grouped entities first so merged authority
            // fields land on the node's own record
            let collections: Vec<String> = node
                .field_values(fields::COLLECTION)
                .into_iter()
                .map(|v| v.to_string())
                .collect();
            {
                let node = &mut *node;
                let owner = GroupOwner {
                    identity,
                    structure_type: &node.node_type,
                    topstruct_identity: topstruct,
                    topstruct_pi: pi,
                    access_conditions: &node.access_conditions,
                    collections: &collections,
                };
                for record in self
                    .materializer
                    .materialize_all(&owner, &mut node.grouped, &mut node.fields, &self.sequencer)
                    .await?
                {
                    batch.add_auxiliary(record);
                    stats.add_group();
                }
            }

            let is_root = parent.is_none();
            let record = node_record(node, identity, parent, anchor_parent, topstruct, pi);
            if is_root {
                batch.set_root(record);
            } else {
                batch.add_auxiliary(record);
            }
            stats.add_structure();

            for child in &mut node.children {
                self.flatten_node(child, Some(identity), None, topstruct, pi, batch, stats)
                    .await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn flatten_page(
        &self,
        page: &mut PageRecord,
        topstruct: Identity,
        root: &StructureNode,
        pi: &str,
        batch: &mut WriteBatch,
        stats: &mut DocumentStats,
    ) -> Result<()> {
        let identity = self.sequencer.next().await?;

        // An unclaimed page belongs to the work itself
        let owner_identity = page.owner.map(|o| o.identity).unwrap_or(topstruct);
        let owner_type = page
            .structure_type
            .clone()
            .unwrap_or_else(|| root.node_type.clone());

        let collections: Vec<String> = page
            .inherited_fields
            .iter()
            .filter(|f| f.name == fields::COLLECTION)
            .map(|f| f.value.clone())
            .collect();
        let group_records;
        {
            let page = &mut *page;
            let owner = GroupOwner {
                identity,
                structure_type: &owner_type,
                topstruct_identity: topstruct,
                topstruct_pi: pi,
                access_conditions: &page.access_conditions,
                collections: &collections,
            };
            group_records = self
                .materializer
                .materialize_all(
                    &owner,
                    &mut page.grouped,
                    &mut page.inherited_fields,
                    &self.sequencer,
                )
                .await?;
        }

        let mut record = IndexRecord::new(identity, RecordKind::Page);
        record.add_field(fields::IDDOC, identity.to_string());
        record.add_field(fields::IDDOC_OWNER, owner_identity.to_string());
        record.add_field(fields::IDDOC_TOPSTRUCT, topstruct.to_string());
        record.add_field(fields::PI_TOPSTRUCT, pi);
        record.add_field(fields::DOCSTRCT_OWNER, &owner_type);
        record.add_field(fields::ORDER, page.order.to_string());
        record.add_field(fields::ORDERLABEL, &page.order_label);
        if let Some(file_name) = &page.file_name {
            record.add_field(fields::FILENAME, file_name);
        }
        if let Some(mime_type) = &page.mime_type {
            record.add_field(fields::MIMETYPE, mime_type);
        }
        if let Some(width) = page.width {
            record.add_field(fields::WIDTH, width.to_string());
        }
        if let Some(height) = page.height {
            record.add_field(fields::HEIGHT, height.to_string());
        }
        record.add_field(fields::BOOL_IMAGEAVAILABLE, page.has_image.to_string());
        record.add_field(fields::BOOL_FULLTEXT, page.has_fulltext.to_string());
        if let Some(fulltext) = &page.fulltext {
            record.add_field(fields::FULLTEXT, fulltext);
        }
        for condition in &page.access_conditions {
            record.add_field(fields::ACCESSCONDITION, condition);
        }
        for field in page.inherited_fields.iter().filter(|f| !f.skip) {
            record.push(field.clone());
        }

        batch.add_page(page.order, record);
        stats.add_page(page.has_image, page.has_fulltext);
        for group in group_records {
            batch.add_auxiliary(group);
            stats.add_group();
        }
        Ok(())
    }
}

fn node_record(
    node: &StructureNode,
    identity: Identity,
    parent: Option<Identity>,
    anchor_parent: Option<Identity>,
    topstruct: Identity,
    pi: &str,
) -> IndexRecord {
    let kind = if parent.is_some() {
        RecordKind::Structure
    } else if node.node_type == crate::model::ANCHOR_TYPE {
        RecordKind::Anchor
    } else {
        RecordKind::Work
    };
    let mut record = IndexRecord::new(identity, kind);

    record.add_field(fields::IDDOC, identity.to_string());
    if parent.is_none() {
        record.add_field(fields::PI, &node.logical_id);
        if let Some(anchor) = &node.anchor_id {
            record.add_field(fields::PI_ANCHOR, anchor);
        }
        if let Some(order) = node.volume_order {
            record.add_field(fields::CURRENTNO, order.to_string());
        }
    }
    record.add_field(fields::PI_TOPSTRUCT, pi);
    record.add_field(fields::IDDOC_TOPSTRUCT, topstruct.to_string());
    if let Some(parent) = parent.or(anchor_parent) {
        record.add_field(fields::IDDOC_PARENT, parent.to_string());
    }
    record.add_field(fields::DOCSTRCT, &node.node_type);
    record.add_field(fields::LABEL, &node.label);

    for field in node.fields.iter().filter(|f| !f.skip) {
        record.push(field.clone());
    }
    for condition in &node.access_conditions {
        record.add_field(fields::ACCESSCONDITION, condition);
    }

    if node.page_count > 0 {
        record.add_field(fields::NUMPAGES, node.page_count.to_string());
        if let (Some(first), Some(last)) = (&node.first_page_label, &node.last_page_label) {
            record.add_field(fields::PAGERANGE, format!("{first} - {last}"));
        }
    }
    if let Some(thumbnail) = &node.thumbnail {
        record.add_field(fields::THUMBNAIL, thumbnail);
    }
    if let Some(created) = node.date_created {
        record.add_field(fields::DATECREATED, created.to_rfc3339());
    }
    if let Some(updated) = node.date_updated {
        record.add_field(fields::DATEUPDATED, updated.to_rfc3339());
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::model::{PageOrder, PhysicalPage};
    use async_trait::async_trait;

    struct FixtureAdapter {
        root: StructureNode,
        manifest: PhysicalManifest,
    }

    #[async_trait]
    impl FormatAdapter for FixtureAdapter {
        fn name(&self) -> &'static str {
            "fixture"
        }
        fn supports(&self, _path: &Path) -> bool {
            true
        }
        async fn parse(&self, _path: &Path) -> Result<(StructureNode, PhysicalManifest)> {
            Ok((self.root.clone(), self.manifest.clone()))
        }
    }

    struct NoProbes;

    #[async_trait]
    impl FileProbes for NoProbes {
        async fn file_size(&self, _path: &Path) -> Option<u64> {
            None
        }
        async fn image_dimensions(&self, _path: &Path) -> Option<(u32, u32)> {
            None
        }
        async fn full_text(&self, _path: &Path) -> Option<(String, bool)> {
            None
        }
    }

    fn manifest(ids: &[&str]) -> PhysicalManifest {
        PhysicalManifest {
            pages: ids
                .iter()
                .enumerate()
                .map(|(i, id)| PhysicalPage {
                    physical_id: id.to_string(),
                    order: PageOrder::new(i as u32 + 1),
                    order_label: (i + 1).to_string(),
                    file_name: None,
                    mime_type: None,
                })
                .collect(),
        }
    }

    fn pipeline(index: Arc<MemoryIndex>) -> IndexingPipeline {
        IndexingPipeline::new(Arc::new(EngineConfig::default()), index, Arc::new(NoProbes))
    }

    #[tokio::test]
    async fn test_missing_persistent_identifier_is_validation_error() {
        let index = Arc::new(MemoryIndex::new());
        let adapter = FixtureAdapter {
            root: StructureNode::new("monograph", "Book", "  "),
            manifest: PhysicalManifest::default(),
        };

        let err = pipeline(index.clone())
            .index_document(&adapter, Path::new("book.xml"), &DataFolders::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert_eq!(index.committed_len().await, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_index_untouched() {
        let index = Arc::new(MemoryIndex::new());
        let mut root = StructureNode::new("monograph", "Book", "PPN1");
        root.linked_physical_ids = vec!["phys1".to_string()];
        let adapter = FixtureAdapter {
            root,
            manifest: manifest(&["phys1"]),
        };

        index.fail_commit(true);
        let err = pipeline(index.clone())
            .index_document(&adapter, Path::new("book.xml"), &DataFolders::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        index.fail_commit(false);
        // Rollback discarded the staged writes; nothing leaks through a
        // later commit either
        index.commit().await.unwrap();
        assert_eq!(index.committed_len().await, 0);
    }

    #[tokio::test]
    async fn test_outcome_reports_anchor() {
        let index = Arc::new(MemoryIndex::new());
        let mut root = StructureNode::new("volume", "Volume 1", "PPN1");
        root.anchor_id = Some("ANCHOR1".to_string());
        root.volume_order = Some(1);
        let adapter = FixtureAdapter {
            root,
            manifest: PhysicalManifest::default(),
        };

        let outcome = pipeline(index)
            .index_document(&adapter, Path::new("vol.xml"), &DataFolders::default())
            .await
            .unwrap();
        assert_eq!(outcome.anchor_pi.as_deref(), Some("ANCHOR1"));
        assert_eq!(outcome.stats.structure_records, 1);
    }
}
