//! Per-document indexing statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for one document's indexing run, reported on completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Total records written, all kinds
    pub total_records: i64,
    /// Structural records (root + substructures)
    pub structure_records: i64,
    /// Page records
    pub page_records: i64,
    /// Grouped-metadata records
    pub group_records: i64,
    /// Pages with an image file
    pub pages_with_image: i64,
    /// Pages with full text
    pub pages_with_fulltext: i64,
    /// Records of a previous run deleted before the rewrite
    pub superseded_records: i64,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Start time
    pub started_at: Option<DateTime<Utc>>,
    /// End time
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark stats as completed
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }

    pub fn add_structure(&mut self) {
        self.structure_records += 1;
        self.total_records += 1;
    }

    pub fn add_page(&mut self, has_image: bool, has_fulltext: bool) {
        self.page_records += 1;
        self.total_records += 1;
        if has_image {
            self.pages_with_image += 1;
        }
        if has_fulltext {
            self.pages_with_fulltext += 1;
        }
    }

    pub fn add_group(&mut self) {
        self.group_records += 1;
        self.total_records += 1;
    }
}
