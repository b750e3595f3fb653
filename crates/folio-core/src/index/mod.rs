//! Search index contract
//!
//! The engine only requires six operations from the backend: write,
//! delete, existence-check, query-by-field, commit, and rollback. The
//! backend's own storage engine, schema, and query language are out of
//! scope. Writes and deletes are staged until `commit`; `rollback`
//! discards everything staged since the last commit.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use folio_common::Result;

use crate::model::{Identity, IndexRecord, RecordKind};

pub use http::HttpIndex;
pub use memory::MemoryIndex;

/// A single-field query against the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    pub field: String,
    pub value: String,
    /// Restrict matches to one record kind
    pub kind: Option<RecordKind>,
}

impl FieldQuery {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// The write/query contract the engine requires from a search backend
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Stage records for indexing
    async fn write(&self, records: &[IndexRecord]) -> Result<()>;

    /// Stage deletion of the records with the given identities
    async fn delete_by_identity(&self, ids: &[Identity]) -> Result<()>;

    /// Whether a record with this identity exists (staged or committed)
    async fn exists_by_identity(&self, id: Identity) -> Result<bool>;

    /// Committed records matching a single-field query
    async fn query_by_field(&self, query: &FieldQuery) -> Result<Vec<IndexRecord>>;

    /// Apply all staged writes and deletes atomically
    async fn commit(&self) -> Result<()>;

    /// Discard all staged writes and deletes
    async fn rollback(&self) -> Result<()>;
}
