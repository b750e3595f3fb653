//! Recursive metadata inheritance
//!
//! Depth-first walk of the structural tree. Top-down, configured field
//! names are copied verbatim from parent to every descendant; bottom-up,
//! promotion is modeled as the return value of the recursive call —
//! children never mutate their parent through a back-pointer. A field
//! promoted "to immediate parent only" is marked skip on the child so it
//! is not also written to the child's own record; a field promoted "to
//! the entire ancestor chain" is kept on the child and keeps climbing.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::model::{fields, MetadataField, StructureNode};

pub struct InheritancePass {
    config: Arc<EngineConfig>,
}

impl InheritancePass {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Run the full inheritance pass over the tree
    pub fn run(&self, root: &mut StructureNode) {
        self.walk(root, &[], &[]);
    }

    /// Returns the fields this subtree promotes to its parent.
    /// `ancestor_labels` is ordered root-first.
    fn walk(
        &self,
        node: &mut StructureNode,
        inherited: &[MetadataField],
        ancestor_labels: &[String],
    ) -> Vec<MetadataField> {
        // Top-down: apply fields handed down by the parent
        for field in inherited {
            if field.is_sort_field() {
                node.add_sort_field_singleton(field.clone());
            } else {
                node.add_field_deduped(field.clone());
            }
        }

        let chain = build_label_chain(&node.label, ancestor_labels);
        if !chain.is_empty() {
            node.fields
                .push(MetadataField::new(fields::LABEL_CHAIN, chain));
        }

        // Own promotions, determined before child contributions arrive so
        // a parent-only field received from a child is not promoted again
        let mut promoted = Vec::new();
        for field in &mut node.fields {
            if self.config.promote_to_parent_fields.contains(&field.name) {
                field.skip = true;
                let mut copy = field.clone();
                copy.skip = false;
                promoted.push(copy);
            } else if self.config.promote_to_ancestor_fields.contains(&field.name) {
                promoted.push(field.clone());
            }
        }

        let pass_down: Vec<MetadataField> = node
            .fields
            .iter()
            .filter(|f| self.config.heritable_fields.contains(&f.name))
            .cloned()
            .collect();

        let mut child_labels = ancestor_labels.to_vec();
        child_labels.push(node.label.clone());

        let mut from_children = Vec::new();
        for child in &mut node.children {
            from_children.extend(self.walk(child, &pass_down, &child_labels));
        }
        for field in from_children {
            if self.config.promote_to_ancestor_fields.contains(&field.name) {
                promoted.push(field.clone());
            }
            node.add_field_deduped(field);
        }

        promoted
    }
}

/// Free-text aggregate of the node's own label and its ancestors'.
/// Duplicates are skipped by substring containment; commas, semicolons,
/// and colons collapse to single spaces.
fn build_label_chain(own_label: &str, ancestor_labels: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for candidate in std::iter::once(own_label)
        .chain(ancestor_labels.iter().rev().map(|s| s.as_str()))
    {
        let normalized = normalize_punctuation(candidate);
        if normalized.is_empty() {
            continue;
        }
        if parts.iter().any(|p| p.contains(&normalized)) {
            continue;
        }
        parts.push(normalized);
    }

    parts.join(" ")
}

fn normalize_punctuation(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if matches!(c, ',' | ';' | ':') { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
