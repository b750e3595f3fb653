//! Format adapter contract
//!
//! One adapter exists per source dialect. An adapter's only job is to
//! parse a source file into the normalized structure tree plus physical
//! manifest; everything downstream (page construction, mapping,
//! inheritance, grouped metadata, the write protocol) is shared engine
//! code and never duplicated per dialect.

use async_trait::async_trait;
use folio_common::Result;
use std::path::Path;

use crate::model::{PhysicalManifest, StructureNode};

#[async_trait]
pub trait FormatAdapter: Send + Sync {
    /// Short dialect name used in logs
    fn name(&self) -> &'static str;

    /// Whether this adapter recognizes the given source file. The first
    /// adapter that claims a file processes it.
    fn supports(&self, path: &Path) -> bool;

    /// Parse the source file into the root structural node (with its
    /// owned descendants) and the physical page sequence.
    ///
    /// The returned tree is read-only for the rest of the engine run
    /// except for the mutations the engine itself applies (identity
    /// assignment, inheritance, aggregates).
    async fn parse(&self, path: &Path) -> Result<(StructureNode, PhysicalManifest)>;
}
