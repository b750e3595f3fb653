//! Page-to-structure ownership mapping
//!
//! Binds page records to their owning structural node, resolves
//! ownership conflicts (deepest node wins), merges access conditions,
//! copies owner metadata onto pages, and tracks per-node page
//! aggregates. Pages must be handed in sorted canonical order; parallel
//! construction does not guarantee it, so the caller re-sorts first.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::model::{MetadataField, PageOwner, PageRecord, StructureNode};

pub struct StructureMapper {
    config: Arc<EngineConfig>,
}

impl StructureMapper {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Map every node of the tree against the page list, depth-first.
    /// Node identities must already be assigned.
    pub fn map_tree(&self, root: &mut StructureNode, pages: &mut [PageRecord]) {
        self.map_node_recursive(root, 0, pages);
    }

    fn map_node_recursive(&self, node: &mut StructureNode, depth: usize, pages: &mut [PageRecord]) {
        self.map_node(node, depth, pages);
        for child in &mut node.children {
            self.map_node_recursive(child, depth + 1, pages);
        }
    }

    /// Map one node at the given depth (root = 0) against the page list.
    pub fn map_node(&self, node: &mut StructureNode, depth: usize, pages: &mut [PageRecord]) {
        let identity = match node.identity {
            Some(identity) => identity,
            None => {
                error!(logical_id = %node.logical_id, "node has no identity, skipping mapping");
                return;
            },
        };

        // 1. Resolve the pages this node claims
        let mut resolved: Vec<usize> = pages
            .iter()
            .enumerate()
            .filter(|(_, p)| node.linked_physical_ids.contains(&p.physical_id))
            .map(|(i, _)| i)
            .collect();

        if resolved.is_empty() {
            debug!(logical_id = %node.logical_id, "no pages resolved for node");
            return;
        }

        // 2. Canonical page order
        resolved.sort_by_key(|&i| pages[i].order);

        // 3. Representative / thumbnail selection
        node.thumbnail = self.select_thumbnail(node, &resolved, pages);

        for &i in &resolved {
            let page = &mut pages[i];

            // 4. Deepest wins; at equal depth the incumbent owner is kept
            let takes_ownership = match page.owner {
                None => true,
                Some(owner) => depth > owner.depth,
            };
            let previous_depth = page.owner.map(|o| o.depth);

            if takes_ownership {
                page.owner = Some(PageOwner { identity, depth });
                page.structure_type = Some(node.node_type.clone());

                // Sort fields come exclusively from the current owner
                page.clear_sort_fields();
                for field in node.fields.iter().filter(|f| f.is_sort_field()) {
                    if !page.inherited_fields.iter().any(|f| f.name == field.name) {
                        page.inherited_fields.push(field.clone());
                    }
                }
            }

            // 5. Access condition merge
            self.merge_access_conditions(node, depth, previous_depth, page);

            // 6. Tokenized owner fields
            if takes_ownership {
                for name in &self.config.tokenized_owner_fields {
                    for value in node.field_values(name) {
                        let value = value.to_string();
                        page.inherit_field_deduped(MetadataField::new(name.clone(), value));
                    }
                }
            }
        }

        // 7. Node aggregates
        node.page_count = resolved.len();
        node.first_page_label = Some(pages[resolved[0]].order_label.clone());
        node.last_page_label = Some(pages[resolved[resolved.len() - 1]].order_label.clone());
    }

    fn select_thumbnail(
        &self,
        node: &StructureNode,
        resolved: &[usize],
        pages: &[PageRecord],
    ) -> Option<String> {
        let first = &pages[resolved[0]];
        let fallback = first
            .file_name
            .clone()
            .unwrap_or_else(|| first.physical_id.clone());

        match &node.representative {
            Some(rep) => {
                if let Some(&i) = resolved.iter().find(|&&i| &pages[i].physical_id == rep) {
                    Some(
                        pages[i]
                            .file_name
                            .clone()
                            .unwrap_or_else(|| pages[i].physical_id.clone()),
                    )
                } else {
                    warn!(
                        logical_id = %node.logical_id,
                        representative = %rep,
                        "declared representative not among resolved pages, falling back to first page"
                    );
                    Some(fallback)
                }
            },
            None => self
                .config
                .default_representative_first_page
                .then_some(fallback),
        }
    }

    /// Add this node's conditions to the page. A deeper node introducing
    /// a non-open condition while an open-access marker is present
    /// overrides: all prior conditions are replaced by the node's
    /// non-open conditions. Open access is demoted, never the reverse.
    fn merge_access_conditions(
        &self,
        node: &StructureNode,
        depth: usize,
        previous_depth: Option<usize>,
        page: &mut PageRecord,
    ) {
        let open = &self.config.open_access_label;
        let deeper = previous_depth.map_or(true, |d| depth > d);
        let non_open: Vec<&String> = node
            .access_conditions
            .iter()
            .filter(|c| *c != open)
            .collect();

        if deeper && !non_open.is_empty() && page.access_conditions.contains(open) {
            page.access_conditions.clear();
            for condition in non_open {
                page.access_conditions.insert(condition.clone());
            }
        } else {
            for condition in &node.access_conditions {
                page.access_conditions.insert(condition.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Identity, PageOrder};

    fn mapper() -> StructureMapper {
        StructureMapper::new(Arc::new(EngineConfig::default()))
    }

    fn node(logical_id: &str, identity: i64, linked: &[&str]) -> StructureNode {
        let mut n = StructureNode::new("chapter", logical_id, logical_id);
        n.identity = Some(Identity::new(identity));
        n.linked_physical_ids = linked.iter().map(|s| s.to_string()).collect();
        n
    }

    fn page(physical_id: &str, order: u32) -> PageRecord {
        PageRecord::new(physical_id, PageOrder::new(order), order.to_string())
    }

    #[test]
    fn test_deepest_owner_wins() {
        let mapper = mapper();
        let mut shallow = node("log1", 10, &["phys1"]);
        shallow.fields.push(MetadataField::new("SORT_TITLE", "shallow"));
        let mut deep = node("log2", 20, &["phys1"]);
        deep.fields.push(MetadataField::new("SORT_TITLE", "deep"));

        let mut pages = vec![page("phys1", 1)];
        mapper.map_node(&mut shallow, 1, &mut pages);
        mapper.map_node(&mut deep, 2, &mut pages);

        let owner = pages[0].owner.unwrap();
        assert_eq!(owner.identity, Identity::new(20));
        assert_eq!(owner.depth, 2);

        // Sort fields originate only from the deepest owner
        let sort_values: Vec<&str> = pages[0]
            .inherited_fields
            .iter()
            .filter(|f| f.is_sort_field())
            .map(|f| f.value.as_str())
            .collect();
        assert_eq!(sort_values, vec!["deep"]);
    }

    #[test]
    fn test_equal_depth_keeps_incumbent() {
        let mapper = mapper();
        let mut first = node("log1", 10, &["phys1"]);
        let mut second = node("log2", 20, &["phys1"]);

        let mut pages = vec![page("phys1", 1)];
        mapper.map_node(&mut first, 1, &mut pages);
        mapper.map_node(&mut second, 1, &mut pages);

        assert_eq!(pages[0].owner.unwrap().identity, Identity::new(10));
    }

    #[test]
    fn test_open_access_is_demoted_by_deeper_node() {
        let mapper = mapper();
        let mut shallow = node("log1", 10, &["phys1"]);
        shallow.access_conditions.insert("OPENACCESS".to_string());
        let mut deep = node("log2", 20, &["phys1"]);
        deep.access_conditions.insert("RESTRICTED".to_string());

        let mut pages = vec![page("phys1", 1)];
        mapper.map_node(&mut shallow, 1, &mut pages);
        mapper.map_node(&mut deep, 2, &mut pages);

        let conditions: Vec<&String> = pages[0].access_conditions.iter().collect();
        assert_eq!(conditions, vec!["RESTRICTED"]);
    }

    #[test]
    fn test_open_access_never_demotes_restricted() {
        let mapper = mapper();
        let mut shallow = node("log1", 10, &["phys1"]);
        shallow.access_conditions.insert("RESTRICTED".to_string());
        let mut deep = node("log2", 20, &["phys1"]);
        deep.access_conditions.insert("OPENACCESS".to_string());

        let mut pages = vec![page("phys1", 1)];
        mapper.map_node(&mut shallow, 1, &mut pages);
        mapper.map_node(&mut deep, 2, &mut pages);

        assert!(pages[0].access_conditions.contains("RESTRICTED"));
        assert!(pages[0].access_conditions.contains("OPENACCESS"));
    }

    #[test]
    fn test_representative_fallback_to_first_page() {
        let mapper = mapper();
        let mut n = node("log1", 10, &["phys1", "phys2"]);
        n.representative = Some("phys9".to_string());

        let mut p1 = page("phys1", 1);
        p1.file_name = Some("00000001.tif".to_string());
        let mut pages = vec![p1, page("phys2", 2)];
        mapper.map_node(&mut n, 0, &mut pages);

        assert_eq!(n.thumbnail.as_deref(), Some("00000001.tif"));
    }

    #[test]
    fn test_declared_representative_used_when_resolved() {
        let mapper = mapper();
        let mut n = node("log1", 10, &["phys1", "phys2"]);
        n.representative = Some("phys2".to_string());

        let mut p2 = page("phys2", 2);
        p2.file_name = Some("00000002.tif".to_string());
        let mut pages = vec![page("phys1", 1), p2];
        mapper.map_node(&mut n, 0, &mut pages);

        assert_eq!(n.thumbnail.as_deref(), Some("00000002.tif"));
    }

    #[test]
    fn test_zero_resolved_pages_is_not_an_error() {
        let mapper = mapper();
        let mut n = node("log1", 10, &["missing"]);
        let mut pages = vec![page("phys1", 1)];
        mapper.map_node(&mut n, 0, &mut pages);

        assert_eq!(n.page_count, 0);
        assert!(n.thumbnail.is_none());
        assert!(pages[0].owner.is_none());
    }

    #[test]
    fn test_aggregates_use_canonical_order() {
        let mapper = mapper();
        let mut n = node("log1", 10, &["phys1", "phys2", "phys3"]);

        // Pages arrive out of order
        let mut pages = vec![page("phys3", 3), page("phys1", 1), page("phys2", 2)];
        mapper.map_node(&mut n, 0, &mut pages);

        assert_eq!(n.page_count, 3);
        assert_eq!(n.first_page_label.as_deref(), Some("1"));
        assert_eq!(n.last_page_label.as_deref(), Some("3"));
    }

    #[test]
    fn test_tokenized_owner_fields_copied_deduped() {
        let mapper = mapper();
        let mut n = node("log1", 10, &["phys1"]);
        n.fields.push(MetadataField::new("MD_TITLE", "Faust"));
        n.fields.push(MetadataField::new("MD_TITLE", "Faust"));

        let mut pages = vec![page("phys1", 1)];
        mapper.map_node(&mut n, 0, &mut pages);

        let titles: Vec<&str> = pages[0]
            .inherited_fields
            .iter()
            .filter(|f| f.name == "MD_TITLE")
            .map(|f| f.value.as_str())
            .collect();
        assert_eq!(titles, vec!["Faust"]);
    }
}
