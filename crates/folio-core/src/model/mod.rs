//! Core data model for the structure-compilation engine

pub mod field;
pub mod node;
pub mod page;
pub mod record;

pub use field::MetadataField;
pub use node::{GroupedMetadata, PhysicalManifest, PhysicalPage, StructureNode, ANCHOR_TYPE};
pub use page::{PageOrder, PageOwner, PageRecord};
pub use record::{fields, Identity, IndexRecord, RecordKind};
