//! Page records
//!
//! One `PageRecord` is built per entry of the physical manifest, possibly
//! in parallel; the structure mapper then resolves ownership and finalizes
//! each page into a flat index record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::field::{MetadataField, SORT_PREFIX};
use super::node::GroupedMetadata;
use super::record::Identity;

/// Sequential page position. `sub_order` supports fractional positions
/// for region annotations sitting between two pages' records (order 5,
/// sub-order 1 sorts after plain order 5 and before order 6).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PageOrder {
    pub order: u32,
    pub sub_order: u32,
}

impl PageOrder {
    pub fn new(order: u32) -> Self {
        Self {
            order,
            sub_order: 0,
        }
    }

    pub fn with_sub_order(order: u32, sub_order: u32) -> Self {
        Self { order, sub_order }
    }
}

impl std::fmt::Display for PageOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.sub_order == 0 {
            write!(f, "{}", self.order)
        } else {
            write!(f, "{}.{}", self.order, self.sub_order)
        }
    }
}

/// Current owner of a page. A page has exactly one owner at any time;
/// a deeper structural node takes ownership over a shallower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOwner {
    pub identity: Identity,
    pub depth: usize,
}

/// Index record in the making for one physical page or resource.
///
/// Mutated in place by the structure mapper as ownership is resolved,
/// then finalized into the write batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub order: PageOrder,
    pub order_label: String,
    pub physical_id: String,
    pub owner: Option<PageOwner>,
    /// Structural type of the owning node
    pub structure_type: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size: Option<u64>,
    pub has_image: bool,
    pub has_fulltext: bool,
    pub fulltext: Option<String>,
    /// Whether the full text came from an ALTO conversion
    pub fulltext_from_alto: bool,
    pub access_conditions: BTreeSet<String>,
    /// Fields inherited from the owning node (tokenized copies and sort
    /// fields)
    pub inherited_fields: Vec<MetadataField>,
    /// Grouped entities declared on the page itself (highlighted regions)
    pub grouped: Vec<GroupedMetadata>,
}

impl PageRecord {
    pub fn new(physical_id: impl Into<String>, order: PageOrder, order_label: impl Into<String>) -> Self {
        Self {
            order,
            order_label: order_label.into(),
            physical_id: physical_id.into(),
            owner: None,
            structure_type: None,
            file_name: None,
            mime_type: None,
            width: None,
            height: None,
            file_size: None,
            has_image: false,
            has_fulltext: false,
            fulltext: None,
            fulltext_from_alto: false,
            access_conditions: BTreeSet::new(),
            inherited_fields: Vec::new(),
            grouped: Vec::new(),
        }
    }

    /// Append an inherited field unless the same name+value pair is
    /// already present.
    pub fn inherit_field_deduped(&mut self, field: MetadataField) {
        if !self
            .inherited_fields
            .iter()
            .any(|f| f.name == field.name && f.value == field.value)
        {
            self.inherited_fields.push(field);
        }
    }

    /// Drop all inherited sort-prefixed fields. Called when ownership is
    /// reassigned so the new owner's sort fields replace the old ones
    /// wholesale.
    pub fn clear_sort_fields(&mut self) {
        self.inherited_fields
            .retain(|f| !f.name.starts_with(SORT_PREFIX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_order_sorting() {
        let mut orders = vec![
            PageOrder::new(6),
            PageOrder::with_sub_order(5, 1),
            PageOrder::new(5),
            PageOrder::new(1),
        ];
        orders.sort();
        assert_eq!(
            orders,
            vec![
                PageOrder::new(1),
                PageOrder::new(5),
                PageOrder::with_sub_order(5, 1),
                PageOrder::new(6),
            ]
        );
    }

    #[test]
    fn test_page_order_display() {
        assert_eq!(PageOrder::new(7).to_string(), "7");
        assert_eq!(PageOrder::with_sub_order(7, 2).to_string(), "7.2");
    }

    #[test]
    fn test_clear_sort_fields() {
        let mut page = PageRecord::new("phys1", PageOrder::new(1), "1");
        page.inherit_field_deduped(MetadataField::new("SORT_TITLE", "a"));
        page.inherit_field_deduped(MetadataField::new("MD_TITLE", "a"));
        page.clear_sort_fields();

        assert_eq!(page.inherited_fields.len(), 1);
        assert_eq!(page.inherited_fields[0].name, "MD_TITLE");
    }

    #[test]
    fn test_inherit_field_deduped() {
        let mut page = PageRecord::new("phys1", PageOrder::new(1), "1");
        page.inherit_field_deduped(MetadataField::new("MD_PLACE", "Leipzig"));
        page.inherit_field_deduped(MetadataField::new("MD_PLACE", "Leipzig"));
        assert_eq!(page.inherited_fields.len(), 1);
    }
}
