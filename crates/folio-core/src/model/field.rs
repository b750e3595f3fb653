//! Metadata field representation

use serde::{Deserialize, Serialize};

/// Prefix marking fields that carry a sort value. At most one sort field
/// per name may exist on any record; on ownership reassignment they are
/// replaced wholesale, never merged.
pub const SORT_PREFIX: &str = "SORT_";

/// Prefix marking boolean facet fields.
pub const BOOL_PREFIX: &str = "BOOL_";

/// Prefix marking geocoordinate fields. These are exempt from duplicate
/// suppression when authority data is merged into an owner record.
pub const COORDS_PREFIX: &str = "COORDS_";

/// A single named metadata value on a structure node, page, or grouped
/// entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
    /// BCP-47 language tag, if the value is language-specific
    pub language: Option<String>,
    /// Skipped fields are not written to the record that declares them.
    /// Set for fields promoted to the immediate parent only, and for
    /// grouped entities that have already been materialized.
    pub skip: bool,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            language: None,
            skip: false,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn is_sort_field(&self) -> bool {
        self.name.starts_with(SORT_PREFIX)
    }

    pub fn is_bool_field(&self) -> bool {
        self.name.starts_with(BOOL_PREFIX)
    }

    pub fn is_coords_field(&self) -> bool {
        self.name.starts_with(COORDS_PREFIX)
    }

    /// Key used for name+value duplicate suppression
    pub fn dedup_key(&self) -> (String, String) {
        (self.name.clone(), self.value.clone())
    }
}
