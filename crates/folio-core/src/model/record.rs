//! Flat index records and record identity

use serde::{Deserialize, Serialize};

use super::field::MetadataField;

/// Globally unique record identity (IDDOC). Issued by the
/// `IdentitySequencer`, never reused, stamped on every emitted record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(i64);

impl Identity {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of flat record emitted into the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Root structural record for a work or volume
    Work,
    /// Non-root structural node (chapter, scene, ...)
    Structure,
    /// One physical page or downloadable resource
    Page,
    /// Materialized grouped-metadata entity (person, place, region)
    Group,
    /// Synthetic parent record for a multi-volume work
    Anchor,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Work => "work",
            RecordKind::Structure => "structure",
            RecordKind::Page => "page",
            RecordKind::Group => "group",
            RecordKind::Anchor => "anchor",
        }
    }
}

/// Well-known index field names
pub mod fields {
    /// Record identity (stringified)
    pub const IDDOC: &str = "IDDOC";
    /// Identity of the record that owns this one (pages, groups)
    pub const IDDOC_OWNER: &str = "IDDOC_OWNER";
    /// Identity of the root structural record of the owning work
    pub const IDDOC_TOPSTRUCT: &str = "IDDOC_TOPSTRUCT";
    /// Persistent identifier of the work (root only)
    pub const PI: &str = "PI";
    /// Persistent identifier of the owning work (every record)
    pub const PI_TOPSTRUCT: &str = "PI_TOPSTRUCT";
    /// Identifier of the anchor a volume belongs to
    pub const PI_ANCHOR: &str = "PI_ANCHOR";
    /// Identity of the structural parent record
    pub const IDDOC_PARENT: &str = "IDDOC_PARENT";
    /// Structural type (monograph, chapter, page owner type, ...)
    pub const DOCSTRCT: &str = "DOCSTRCT";
    /// Structural type of the record owning a group
    pub const DOCSTRCT_OWNER: &str = "DOCSTRCT_OWNER";
    pub const LABEL: &str = "LABEL";
    /// Normalized aggregate of the record's label and its ancestors'
    pub const LABEL_CHAIN: &str = "LABEL_CHAIN";
    /// Page order within the work
    pub const ORDER: &str = "ORDER";
    pub const ORDERLABEL: &str = "ORDERLABEL";
    /// Volume order within an anchor
    pub const CURRENTNO: &str = "CURRENTNO";
    pub const FILENAME: &str = "FILENAME";
    pub const MIMETYPE: &str = "MIMETYPE";
    pub const WIDTH: &str = "WIDTH";
    pub const HEIGHT: &str = "HEIGHT";
    pub const ACCESSCONDITION: &str = "ACCESSCONDITION";
    pub const COLLECTION: &str = "DC";
    pub const FULLTEXT: &str = "FULLTEXT";
    pub const BOOL_IMAGEAVAILABLE: &str = "BOOL_IMAGEAVAILABLE";
    pub const BOOL_FULLTEXT: &str = "BOOL_FULLTEXT";
    pub const NUMPAGES: &str = "NUMPAGES";
    pub const PAGERANGE: &str = "PAGERANGE";
    pub const THUMBNAIL: &str = "THUMBNAIL";
    pub const DATECREATED: &str = "DATECREATED";
    pub const DATEUPDATED: &str = "DATEUPDATED";
    /// Group display value
    pub const GROUPTYPE: &str = "GROUPTYPE";
    /// Volume list entries on a regenerated anchor
    pub const VOLUME_IDDOC: &str = "VOLUME_IDDOC";
    pub const VOLUME_NO: &str = "VOLUME_NO";
}

/// A flat, independently addressable record in the search index.
///
/// Invariants: `identity` is globally unique; every record carries the
/// topstruct identity and persistent identifier of its owning work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub identity: Identity,
    pub kind: RecordKind,
    pub fields: Vec<MetadataField>,
}

impl IndexRecord {
    pub fn new(identity: Identity, kind: RecordKind) -> Self {
        Self {
            identity,
            kind,
            fields: Vec::new(),
        }
    }

    /// Append a field. Repeatable fields may occur any number of times.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(MetadataField::new(name, value));
    }

    pub fn push(&mut self, field: MetadataField) {
        self.fields.push(field);
    }

    /// Set a singleton field, replacing any previous occurrences.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        self.fields.retain(|f| f.name != name);
        self.fields.push(MetadataField::new(name, value));
    }

    /// First value of the named field, if any
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All values of the named field
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .map(|f| f.value.as_str())
            .collect()
    }

    pub fn has_field(&self, name: &str, value: &str) -> bool {
        self.fields.iter().any(|f| f.name == name && f.value == value)
    }
}
