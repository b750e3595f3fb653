//! Generic structure-compilation engine
//!
//! Compiles hierarchical metadata documents (works, substructures, pages)
//! into a flat collection of interlinked records in a remote search index.
//! Format-specific drivers implement [`adapter::FormatAdapter`] and hand the
//! engine a normalized structure tree plus a physical page manifest; the
//! engine handles everything format-independent:
//!
//! - global record-identity assignment ([`sequencer`])
//! - page construction fan-out ([`pages`])
//! - page-to-structure ownership mapping with metadata inheritance
//!   ([`mapper`], [`inherit`])
//! - grouped-metadata materialization ([`grouped`])
//! - the transactional write/rollback protocol ([`batch`], [`pipeline`])
//! - multi-volume anchor consistency ([`anchor`])

pub mod adapter;
pub mod anchor;
pub mod batch;
pub mod config;
pub mod grouped;
pub mod index;
pub mod inherit;
pub mod mapper;
pub mod model;
pub mod pages;
pub mod pipeline;
pub mod sequencer;
pub mod stats;

// Re-export commonly used types
pub use adapter::FormatAdapter;
pub use anchor::{AnchorConsistencyManager, AnchorDocument, AnchorVolumeEntry};
pub use batch::WriteBatch;
pub use config::EngineConfig;
pub use index::{FieldQuery, HttpIndex, MemoryIndex, SearchIndex};
pub use pages::{DataFolders, FileProbes, PageDocumentBuilder};
pub use model::{
    GroupedMetadata, Identity, IndexRecord, MetadataField, PageOrder, PageRecord,
    PhysicalManifest, PhysicalPage, RecordKind, StructureNode,
};
pub use pipeline::{IndexOutcome, IndexingPipeline};
pub use sequencer::IdentitySequencer;
pub use stats::DocumentStats;
