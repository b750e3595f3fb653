//! Global record-identity assignment
//!
//! Issues globally unique identities for every emitted record. The
//! counter is seeded from wall-clock time once per process as a coarse
//! defense against collisions across restarts, and every candidate is
//! confirmed against the index before being handed out. The whole
//! seed/increment/check sequence runs under one lock so concurrent
//! page-worker tasks never receive the same value.

use chrono::Utc;
use folio_common::{IndexError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::index::SearchIndex;
use crate::model::Identity;

/// Explicit sequencer service passed to all components; there is no
/// hidden global counter.
pub struct IdentitySequencer {
    index: Arc<dyn SearchIndex>,
    // 0 = not yet seeded
    next: Mutex<i64>,
}

impl IdentitySequencer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            next: Mutex::new(0),
        }
    }

    /// Issue the next identity.
    ///
    /// A failing existence check is fatal for the whole indexing run:
    /// identity integrity cannot be guaranteed without it.
    pub async fn next(&self) -> Result<Identity> {
        let mut next = self.next.lock().await;
        if *next == 0 {
            *next = Utc::now().timestamp_millis();
        }

        loop {
            let candidate = Identity::new(*next);
            *next += 1;

            match self.index.exists_by_identity(candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => {
                    warn!(identity = %candidate, "identity collision, reseeding from clock");
                    *next = Utc::now().timestamp_millis();
                },
                Err(e) => {
                    return Err(IndexError::Fatal(format!(
                        "identity existence check failed: {e}"
                    )));
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::model::{IndexRecord, RecordKind};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_identities_are_unique() {
        let index = Arc::new(MemoryIndex::new());
        let sequencer = IdentitySequencer::new(index);

        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(sequencer.next().await.unwrap()));
        }
    }

    #[tokio::test]
    async fn test_unique_under_concurrency() {
        let index = Arc::new(MemoryIndex::new());
        let sequencer = Arc::new(IdentitySequencer::new(index));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sequencer = sequencer.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..50 {
                    ids.push(sequencer.next().await.unwrap());
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate identity issued: {id}");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[tokio::test]
    async fn test_collision_reseeds_and_skips_existing() {
        let index = Arc::new(MemoryIndex::new());
        let sequencer = IdentitySequencer::new(index.clone());

        // Occupy the identity the sequencer would issue first.
        let first = Utc::now().timestamp_millis();
        for offset in 0..10 {
            index
                .insert_committed(IndexRecord::new(
                    Identity::new(first + offset),
                    RecordKind::Work,
                ))
                .await;
        }

        let issued = sequencer.next().await.unwrap();
        assert!(index.committed_record(issued).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_is_fatal() {
        let index = Arc::new(MemoryIndex::new());
        index.fail_exists(true);
        let sequencer = IdentitySequencer::new(index);

        let err = sequencer.next().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
