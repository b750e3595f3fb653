//! In-memory search index
//!
//! Two-level store with real staging semantics: writes and deletes land
//! in a staging area and only reach the committed store on `commit`.
//! Used by the test suites and for dry runs. Failure injection toggles
//! let tests simulate a backend outage at any point of the protocol.

use async_trait::async_trait;
use folio_common::{IndexError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::model::{Identity, IndexRecord};

use super::{FieldQuery, SearchIndex};

#[derive(Default)]
struct Staging {
    writes: HashMap<i64, IndexRecord>,
    deletes: HashSet<i64>,
}

/// In-memory implementation of [`SearchIndex`]
#[derive(Default)]
pub struct MemoryIndex {
    committed: RwLock<HashMap<i64, IndexRecord>>,
    staging: RwLock<Staging>,
    fail_writes: AtomicBool,
    fail_commit: AtomicBool,
    fail_exists: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `write` calls fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `commit` calls fail
    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `exists_by_identity` calls fail
    pub fn fail_exists(&self, fail: bool) {
        self.fail_exists.store(fail, Ordering::SeqCst);
    }

    /// Number of committed records
    pub async fn committed_len(&self) -> usize {
        self.committed.read().await.len()
    }

    /// Committed record by identity
    pub async fn committed_record(&self, id: Identity) -> Option<IndexRecord> {
        self.committed.read().await.get(&id.value()).cloned()
    }

    /// All committed records
    pub async fn committed_records(&self) -> Vec<IndexRecord> {
        self.committed.read().await.values().cloned().collect()
    }

    /// Seed a committed record directly, bypassing staging
    pub async fn insert_committed(&self, record: IndexRecord) {
        self.committed
            .write()
            .await
            .insert(record.identity.value(), record);
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn write(&self, records: &[IndexRecord]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::Backend("simulated write failure".to_string()));
        }
        let mut staging = self.staging.write().await;
        for record in records {
            staging.writes.insert(record.identity.value(), record.clone());
        }
        Ok(())
    }

    async fn delete_by_identity(&self, ids: &[Identity]) -> Result<()> {
        let mut staging = self.staging.write().await;
        for id in ids {
            staging.deletes.insert(id.value());
            staging.writes.remove(&id.value());
        }
        Ok(())
    }

    async fn exists_by_identity(&self, id: Identity) -> Result<bool> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(IndexError::Backend(
                "simulated existence-check failure".to_string(),
            ));
        }
        if self.staging.read().await.writes.contains_key(&id.value()) {
            return Ok(true);
        }
        Ok(self.committed.read().await.contains_key(&id.value()))
    }

    async fn query_by_field(&self, query: &FieldQuery) -> Result<Vec<IndexRecord>> {
        let committed = self.committed.read().await;
        let mut matches: Vec<IndexRecord> = committed
            .values()
            .filter(|r| r.has_field(&query.field, &query.value))
            .filter(|r| query.kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.identity);
        Ok(matches)
    }

    async fn commit(&self) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(IndexError::Backend("simulated commit failure".to_string()));
        }
        let mut staging = self.staging.write().await;
        let mut committed = self.committed.write().await;
        for id in staging.deletes.drain() {
            committed.remove(&id);
        }
        for (id, record) in staging.writes.drain() {
            committed.insert(id, record);
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut staging = self.staging.write().await;
        staging.writes.clear();
        staging.deletes.clear();
        Ok(())
    }
}
