//! Grouped-metadata materialization
//!
//! Turns repeatable metadata entities (persons, places, regions) into
//! standalone records linked to their owner, or merges their authority
//! fields into the owner's own field list. An entity is materialized at
//! most once, guarded by its skip flag.

use folio_common::Result;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

use crate::model::{fields, GroupedMetadata, Identity, IndexRecord, MetadataField, RecordKind};
use crate::sequencer::IdentitySequencer;

/// Context of the node or page that declared the grouped entities
pub struct GroupOwner<'a> {
    pub identity: Identity,
    pub structure_type: &'a str,
    pub topstruct_identity: Identity,
    pub topstruct_pi: &'a str,
    pub access_conditions: &'a BTreeSet<String>,
    /// Collection values of the owner, copied onto each group record
    pub collections: &'a [String],
}

#[derive(Default)]
pub struct GroupedMetadataMaterializer;

impl GroupedMetadataMaterializer {
    pub fn new() -> Self {
        Self
    }

    /// Materialize every entity of one owner. Entities flagged
    /// `merge_into_owner` contribute their authority fields to
    /// `owner_fields` instead of producing a record.
    pub async fn materialize_all(
        &self,
        owner: &GroupOwner<'_>,
        groups: &mut [GroupedMetadata],
        owner_fields: &mut Vec<MetadataField>,
        sequencer: &IdentitySequencer,
    ) -> Result<Vec<IndexRecord>> {
        // Per-owner tracking sets span all of the owner's entities
        let mut seen_pairs: HashSet<(String, String)> = owner_fields
            .iter()
            .map(|f| f.dedup_key())
            .collect();
        let mut singleton_names: HashSet<String> = owner_fields
            .iter()
            .filter(|f| f.is_bool_field() || f.is_sort_field())
            .map(|f| f.name.clone())
            .collect();

        let mut records = Vec::new();

        for group in groups.iter_mut() {
            if group.skip {
                continue;
            }

            if group.merge_into_owner {
                merge_authority_fields(group, owner_fields, &mut seen_pairs, &mut singleton_names);
                group.skip = true;
                continue;
            }

            if group.primary_value.trim().is_empty() {
                warn!(
                    group_type = %group.group_type,
                    owner = %owner.identity,
                    "grouped entity has no primary value, skipping"
                );
                continue;
            }

            records.push(self.materialize_one(owner, group, sequencer).await?);
            group.skip = true;
        }

        Ok(records)
    }

    async fn materialize_one(
        &self,
        owner: &GroupOwner<'_>,
        group: &GroupedMetadata,
        sequencer: &IdentitySequencer,
    ) -> Result<IndexRecord> {
        let identity = sequencer.next().await?;
        let mut record = IndexRecord::new(identity, RecordKind::Group);

        record.add_field(fields::IDDOC, identity.to_string());
        record.add_field(fields::GROUPTYPE, &group.group_type);
        record.add_field(fields::LABEL, &group.primary_value);
        record.add_field(fields::IDDOC_OWNER, owner.identity.to_string());
        record.add_field(fields::DOCSTRCT_OWNER, owner.structure_type);
        record.add_field(fields::IDDOC_TOPSTRUCT, owner.topstruct_identity.to_string());
        record.add_field(fields::PI_TOPSTRUCT, owner.topstruct_pi);

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for field in group.fields.iter().chain(group.authority_fields.iter()) {
            if seen.insert(field.dedup_key()) {
                record.push(field.clone());
            }
        }

        // Duplicate-free copies of the owner's access conditions and
        // collections
        for condition in owner.access_conditions {
            record.add_field(fields::ACCESSCONDITION, condition);
        }
        let mut collections: Vec<&String> = owner.collections.iter().collect();
        collections.sort();
        collections.dedup();
        for collection in collections {
            record.add_field(fields::COLLECTION, collection);
        }

        Ok(record)
    }
}

/// Append a merged entity's authority fields to the owner's field list.
///
/// Three exceptions to plain name+value duplicate suppression:
/// boolean/sort-typed fields are added at most once per owner (first
/// occurrence wins); geocoordinate fields are always kept alongside the
/// owner's own coordinates; everything else is suppressed via the
/// per-owner pair set.
fn merge_authority_fields(
    group: &GroupedMetadata,
    owner_fields: &mut Vec<MetadataField>,
    seen_pairs: &mut HashSet<(String, String)>,
    singleton_names: &mut HashSet<String>,
) {
    for field in &group.authority_fields {
        if field.is_coords_field() {
            owner_fields.push(field.clone());
            continue;
        }
        if field.is_bool_field() || field.is_sort_field() {
            if singleton_names.insert(field.name.clone()) {
                owner_fields.push(field.clone());
            }
            continue;
        }
        if seen_pairs.insert(field.dedup_key()) {
            owner_fields.push(field.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use std::sync::Arc;

    fn owner_context<'a>(
        access: &'a BTreeSet<String>,
        collections: &'a [String],
    ) -> GroupOwner<'a> {
        GroupOwner {
            identity: Identity::new(100),
            structure_type: "monograph",
            topstruct_identity: Identity::new(100),
            topstruct_pi: "PPN1",
            access_conditions: access,
            collections,
        }
    }

    fn sequencer() -> IdentitySequencer {
        IdentitySequencer::new(Arc::new(MemoryIndex::new()))
    }

    #[tokio::test]
    async fn test_entity_materialized_at_most_once() {
        let materializer = GroupedMetadataMaterializer::new();
        let access = BTreeSet::new();
        let owner = owner_context(&access, &[]);
        let sequencer = sequencer();

        let mut groups = vec![GroupedMetadata::new("person", "Goethe")];
        let mut owner_fields = Vec::new();

        let first = materializer
            .materialize_all(&owner, &mut groups, &mut owner_fields, &sequencer)
            .await
            .unwrap();
        let second = materializer
            .materialize_all(&owner, &mut groups, &mut owner_fields, &sequencer)
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(groups[0].skip);
    }

    #[tokio::test]
    async fn test_empty_primary_value_skipped_without_record() {
        let materializer = GroupedMetadataMaterializer::new();
        let access = BTreeSet::new();
        let owner = owner_context(&access, &[]);
        let sequencer = sequencer();

        let mut groups = vec![GroupedMetadata::new("person", "  ")];
        let mut owner_fields = Vec::new();

        let records = materializer
            .materialize_all(&owner, &mut groups, &mut owner_fields, &sequencer)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_group_record_carries_owner_stamps() {
        let materializer = GroupedMetadataMaterializer::new();
        let mut access = BTreeSet::new();
        access.insert("RESTRICTED".to_string());
        let collections = vec!["varia".to_string(), "varia".to_string()];
        let owner = owner_context(&access, &collections);
        let sequencer = sequencer();

        let mut groups = vec![GroupedMetadata::new("place", "Leipzig")];
        let mut owner_fields = Vec::new();

        let records = materializer
            .materialize_all(&owner, &mut groups, &mut owner_fields, &sequencer)
            .await
            .unwrap();
        let record = &records[0];

        assert_eq!(record.first_value(fields::IDDOC_OWNER), Some("100"));
        assert_eq!(record.first_value(fields::PI_TOPSTRUCT), Some("PPN1"));
        assert_eq!(record.first_value(fields::DOCSTRCT_OWNER), Some("monograph"));
        assert_eq!(record.values(fields::ACCESSCONDITION), vec!["RESTRICTED"]);
        // Owner collections deduplicated
        assert_eq!(record.values(fields::COLLECTION), vec!["varia"]);
    }

    #[tokio::test]
    async fn test_merge_into_owner_respects_exceptions() {
        let materializer = GroupedMetadataMaterializer::new();
        let access = BTreeSet::new();
        let owner = owner_context(&access, &[]);
        let sequencer = sequencer();

        let mut group = GroupedMetadata::new("place", "Leipzig");
        group.merge_into_owner = true;
        group.authority_fields = vec![
            MetadataField::new("BOOL_HAS_AUTHORITY", "true"),
            MetadataField::new("BOOL_HAS_AUTHORITY", "false"),
            MetadataField::new("COORDS_LOCATION", "51.34 12.37"),
            MetadataField::new("COORDS_LOCATION", "51.34 12.37"),
            MetadataField::new("MD_COUNTRY", "Germany"),
            MetadataField::new("MD_COUNTRY", "Germany"),
        ];
        let mut groups = vec![group];
        // Owner already has its own coordinates
        let mut owner_fields = vec![MetadataField::new("COORDS_LOCATION", "51.0 12.0")];

        let records = materializer
            .materialize_all(&owner, &mut groups, &mut owner_fields, &sequencer)
            .await
            .unwrap();
        assert!(records.is_empty());

        // Bool field: first occurrence wins
        let bools: Vec<&str> = owner_fields
            .iter()
            .filter(|f| f.name == "BOOL_HAS_AUTHORITY")
            .map(|f| f.value.as_str())
            .collect();
        assert_eq!(bools, vec!["true"]);

        // Coordinates always kept alongside the owner's own
        let coords = owner_fields
            .iter()
            .filter(|f| f.name == "COORDS_LOCATION")
            .count();
        assert_eq!(coords, 3);

        // Plain duplicates suppressed
        let countries = owner_fields
            .iter()
            .filter(|f| f.name == "MD_COUNTRY")
            .count();
        assert_eq!(countries, 1);
    }
}
