//! Write batch
//!
//! Staging area for one source document's complete record set. Lives for
//! the duration of one indexing operation and is always released, on
//! success and on failure, to free the staging buffers. `commit` is the
//! single point of no return; the caller performs backend rollback before
//! propagating any error raised earlier in the operation.

use folio_common::{IndexError, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::index::SearchIndex;
use crate::model::{IndexRecord, PageOrder};

/// Staging area for the records produced from one source document
pub struct WriteBatch {
    id: Uuid,
    root: Option<IndexRecord>,
    // Keyed by page position for idempotent replace
    pages: BTreeMap<PageOrder, IndexRecord>,
    auxiliary: Vec<IndexRecord>,
    committed: bool,
    released: bool,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            root: None,
            pages: BTreeMap::new(),
            auxiliary: Vec::new(),
            committed: false,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_root(&mut self, record: IndexRecord) {
        self.root = Some(record);
    }

    /// Stage a page record at its position. Replaces any record already
    /// staged at that position.
    pub fn add_page(&mut self, order: PageOrder, record: IndexRecord) {
        if self.pages.insert(order, record).is_some() {
            warn!(batch = %self.id, order = %order, "replaced page already staged at this position");
        }
    }

    /// Idempotent replace by position
    pub fn update_page(&mut self, order: PageOrder, record: IndexRecord) {
        self.pages.insert(order, record);
    }

    /// Stage a non-root, non-page record (substructure or group)
    pub fn add_auxiliary(&mut self, record: IndexRecord) {
        self.auxiliary.push(record);
    }

    pub fn len(&self) -> usize {
        self.root.iter().count() + self.pages.len() + self.auxiliary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send the accumulated root, page, and auxiliary records to the
    /// index as one write operation and commit. After this returns
    /// successfully no further mutation of the batch is meaningful.
    pub async fn commit(&mut self, index: &dyn SearchIndex) -> Result<()> {
        if self.committed {
            return Err(IndexError::Validation(
                "write batch already committed".to_string(),
            ));
        }
        let root = self.root.take().ok_or_else(|| {
            IndexError::Validation("write batch has no root record".to_string())
        })?;

        let mut records = Vec::with_capacity(1 + self.pages.len() + self.auxiliary.len());
        records.push(root);
        records.extend(std::mem::take(&mut self.pages).into_values());
        records.append(&mut self.auxiliary);

        index.write(&records).await?;
        index.commit().await?;

        self.committed = true;
        debug!(batch = %self.id, records = records.len(), "batch committed");
        Ok(())
    }

    /// Free staging resources. Must run on every exit path; `Drop`
    /// backstops callers that unwind past it.
    pub fn release(&mut self) {
        self.root = None;
        self.pages.clear();
        self.auxiliary.clear();
        self.released = true;
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WriteBatch {
    fn drop(&mut self) {
        if !self.released && !self.committed {
            debug!(batch = %self.id, "releasing unreleased batch on drop");
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::model::{fields, Identity, RecordKind};

    fn record(id: i64, kind: RecordKind) -> IndexRecord {
        let mut r = IndexRecord::new(Identity::new(id), kind);
        r.add_field(fields::PI_TOPSTRUCT, "PPN1");
        r
    }

    #[tokio::test]
    async fn test_commit_writes_all_records() {
        let index = MemoryIndex::new();
        let mut batch = WriteBatch::new();
        batch.set_root(record(1, RecordKind::Work));
        batch.add_page(PageOrder::new(1), record(2, RecordKind::Page));
        batch.add_auxiliary(record(3, RecordKind::Group));

        batch.commit(&index).await.unwrap();
        assert_eq!(index.committed_len().await, 3);
    }

    #[tokio::test]
    async fn test_commit_without_root_is_error() {
        let index = MemoryIndex::new();
        let mut batch = WriteBatch::new();
        batch.add_page(PageOrder::new(1), record(2, RecordKind::Page));

        assert!(batch.commit(&index).await.is_err());
        assert_eq!(index.committed_len().await, 0);
    }

    #[tokio::test]
    async fn test_update_page_replaces_by_position() {
        let index = MemoryIndex::new();
        let mut batch = WriteBatch::new();
        batch.set_root(record(1, RecordKind::Work));
        batch.add_page(PageOrder::new(1), record(2, RecordKind::Page));
        batch.update_page(PageOrder::new(1), record(9, RecordKind::Page));

        batch.commit(&index).await.unwrap();
        assert_eq!(index.committed_len().await, 2);
        assert!(index
            .committed_record(Identity::new(9))
            .await
            .is_some());
        assert!(index.committed_record(Identity::new(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_double_commit_rejected() {
        let index = MemoryIndex::new();
        let mut batch = WriteBatch::new();
        batch.set_root(record(1, RecordKind::Work));
        batch.commit(&index).await.unwrap();
        assert!(batch.commit(&index).await.is_err());
    }

    #[tokio::test]
    async fn test_release_clears_staging() {
        let mut batch = WriteBatch::new();
        batch.set_root(record(1, RecordKind::Work));
        batch.add_page(PageOrder::new(1), record(2, RecordKind::Page));
        batch.release();
        assert!(batch.is_empty());
    }
}
