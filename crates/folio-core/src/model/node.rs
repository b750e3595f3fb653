//! Structure tree and physical manifest
//!
//! A format adapter parses a source document into a tree of
//! [`StructureNode`]s (the logical hierarchy) plus a flat
//! [`PhysicalManifest`] (the physical page sequence). Nodes own their
//! children; upward inheritance is modeled as a return value of the
//! recursive inheritance pass, never as a back-pointer mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::field::MetadataField;
use super::page::PageOrder;
use super::record::Identity;

/// A repeatable metadata entity (person, place, region) attached to a
/// node or page, materialized at most once into its own linked record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedMetadata {
    /// Entity type: "person", "place", "region", ...
    pub group_type: String,
    /// Primary display value; entities with an empty primary value are
    /// skipped with a warning
    pub primary_value: String,
    pub fields: Vec<MetadataField>,
    /// Fields resolved from an authority record (GND, VIAF, ...)
    pub authority_fields: Vec<MetadataField>,
    /// Merge authority fields into the owner instead of materializing a
    /// standalone record
    pub merge_into_owner: bool,
    /// Set once the entity has been materialized
    pub skip: bool,
}

impl GroupedMetadata {
    pub fn new(group_type: impl Into<String>, primary_value: impl Into<String>) -> Self {
        Self {
            group_type: group_type.into(),
            primary_value: primary_value.into(),
            fields: Vec::new(),
            authority_fields: Vec::new(),
            merge_into_owner: false,
            skip: false,
        }
    }
}

/// Node type of synthetic anchor documents re-queued after volume
/// indexing.
pub const ANCHOR_TYPE: &str = "anchor";

/// One level of a work's logical hierarchy.
///
/// Created when a format adapter walks the source tree, mutated by the
/// inheritance and mapping passes, then flattened into an `IndexRecord`
/// and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureNode {
    /// Assigned by the sequencer before mapping; `None` until then
    pub identity: Option<Identity>,
    /// Structural type: "monograph", "chapter", "volume", ...
    pub node_type: String,
    pub label: String,
    /// Logical identifier within the source document; the root's doubles
    /// as the work's persistent identifier
    pub logical_id: String,
    /// Ordered field list
    pub fields: Vec<MetadataField>,
    pub access_conditions: BTreeSet<String>,
    pub grouped: Vec<GroupedMetadata>,
    /// Owned children; depth is derived from recursion, root = 0
    pub children: Vec<StructureNode>,
    /// Physical identifiers this node claims ownership of
    pub linked_physical_ids: Vec<String>,
    /// Physical identifier of the declared representative image
    pub representative: Option<String>,
    /// Identifier of the anchor this work belongs to (volumes only)
    pub anchor_id: Option<String>,
    /// Volume order within the anchor (volumes only)
    pub volume_order: Option<i64>,
    /// Name of the data repository holding this work's data folders
    pub data_repository: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,

    // Aggregates filled in by the structure mapper
    pub page_count: usize,
    pub first_page_label: Option<String>,
    pub last_page_label: Option<String>,
    pub thumbnail: Option<String>,
}

impl StructureNode {
    pub fn new(
        node_type: impl Into<String>,
        label: impl Into<String>,
        logical_id: impl Into<String>,
    ) -> Self {
        Self {
            identity: None,
            node_type: node_type.into(),
            label: label.into(),
            logical_id: logical_id.into(),
            fields: Vec::new(),
            access_conditions: BTreeSet::new(),
            grouped: Vec::new(),
            children: Vec::new(),
            linked_physical_ids: Vec::new(),
            representative: None,
            anchor_id: None,
            volume_order: None,
            data_repository: None,
            date_created: None,
            date_updated: None,
            page_count: 0,
            first_page_label: None,
            last_page_label: None,
            thumbnail: None,
        }
    }

    /// Append a field unless the same name+value pair is already present.
    pub fn add_field_deduped(&mut self, field: MetadataField) {
        if !self
            .fields
            .iter()
            .any(|f| f.name == field.name && f.value == field.value)
        {
            self.fields.push(field);
        }
    }

    /// Set a sort field as a singleton: only one instance per name may
    /// exist on a node, first writer wins.
    pub fn add_sort_field_singleton(&mut self, field: MetadataField) {
        if !self.fields.iter().any(|f| f.name == field.name) {
            self.fields.push(field);
        }
    }

    /// Own fields with the given name
    pub fn field_values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .map(|f| f.value.as_str())
            .collect()
    }

    /// Total number of nodes in this subtree, including self
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_size()).sum::<usize>()
    }
}

/// Physical page sequence parsed from the source document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysicalManifest {
    pub pages: Vec<PhysicalPage>,
}

/// One entry of the physical manifest: a scanned page or downloadable
/// resource at a sequential position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalPage {
    pub physical_id: String,
    pub order: PageOrder,
    /// Human-readable order label ("3", "IV", "unpaginated", ...)
    pub order_label: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}
