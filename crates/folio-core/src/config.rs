//! Engine configuration

use folio_common::{IndexError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Engine Configuration Constants
// ============================================================================

/// Default access condition marking openly accessible material.
pub const DEFAULT_OPEN_ACCESS_LABEL: &str = "OPENACCESS";

/// Default number of concurrent page-construction workers.
pub const DEFAULT_PAGE_WORKERS: usize = 4;

/// Default coarse bound on page construction for one document, in
/// seconds. Exceeding it aborts only the current document.
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 4 * 3600;

/// Default field names copied verbatim from parent to every descendant.
pub const DEFAULT_HERITABLE_FIELDS: &[&str] = &["DC", "MD_LANGUAGE", "MD_SHELFMARK"];

/// Default field names copied from the owning node onto its pages.
pub const DEFAULT_TOKENIZED_OWNER_FIELDS: &[&str] = &["MD_TITLE", "DC"];

/// Engine configuration shared by all components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fields copied top-down from parent to every descendant
    pub heritable_fields: Vec<String>,
    /// Fields promoted bottom-up to the immediate parent only (marked
    /// skip on the child)
    pub promote_to_parent_fields: Vec<String>,
    /// Fields promoted bottom-up to the entire ancestor chain (kept on
    /// the child)
    pub promote_to_ancestor_fields: Vec<String>,
    /// Owner fields copied tokenized onto pages
    pub tokenized_owner_fields: Vec<String>,
    /// Access condition treated as open access; demoted when a deeper
    /// node introduces a more specific condition
    pub open_access_label: String,
    /// Use the first resolved page as thumbnail when no representative
    /// is declared
    pub default_representative_first_page: bool,
    /// Merge volume collections into the anchor's collection field
    pub merge_anchor_collections: bool,
    /// Bounded worker count for page construction fan-out
    pub page_workers: usize,
    /// Coarse timeout for one document's page construction
    pub page_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heritable_fields: DEFAULT_HERITABLE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            promote_to_parent_fields: Vec::new(),
            promote_to_ancestor_fields: Vec::new(),
            tokenized_owner_fields: DEFAULT_TOKENIZED_OWNER_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            open_access_label: DEFAULT_OPEN_ACCESS_LABEL.to_string(),
            default_representative_first_page: true,
            merge_anchor_collections: true,
            page_workers: DEFAULT_PAGE_WORKERS,
            page_timeout_secs: DEFAULT_PAGE_TIMEOUT_SECS,
        }
    }
}

fn env_list(var: &str) -> Option<Vec<String>> {
    std::env::var(var).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// - `FOLIO_HERITABLE_FIELDS`: comma-separated field names
    /// - `FOLIO_PROMOTE_TO_PARENT_FIELDS`: comma-separated field names
    /// - `FOLIO_PROMOTE_TO_ANCESTOR_FIELDS`: comma-separated field names
    /// - `FOLIO_TOKENIZED_OWNER_FIELDS`: comma-separated field names
    /// - `FOLIO_OPEN_ACCESS_LABEL`: open access condition label
    /// - `FOLIO_PAGE_WORKERS`: worker count for page fan-out
    /// - `FOLIO_PAGE_TIMEOUT_SECS`: page construction timeout
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(list) = env_list("FOLIO_HERITABLE_FIELDS") {
            config.heritable_fields = list;
        }
        if let Some(list) = env_list("FOLIO_PROMOTE_TO_PARENT_FIELDS") {
            config.promote_to_parent_fields = list;
        }
        if let Some(list) = env_list("FOLIO_PROMOTE_TO_ANCESTOR_FIELDS") {
            config.promote_to_ancestor_fields = list;
        }
        if let Some(list) = env_list("FOLIO_TOKENIZED_OWNER_FIELDS") {
            config.tokenized_owner_fields = list;
        }
        if let Ok(label) = std::env::var("FOLIO_OPEN_ACCESS_LABEL") {
            config.open_access_label = label;
        }
        if let Ok(workers) = std::env::var("FOLIO_PAGE_WORKERS") {
            config.page_workers = workers
                .parse()
                .map_err(|_| IndexError::Config(format!("invalid FOLIO_PAGE_WORKERS: {workers}")))?;
        }
        if let Ok(timeout) = std::env::var("FOLIO_PAGE_TIMEOUT_SECS") {
            config.page_timeout_secs = timeout.parse().map_err(|_| {
                IndexError::Config(format!("invalid FOLIO_PAGE_TIMEOUT_SECS: {timeout}"))
            })?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.page_workers == 0 {
            return Err(IndexError::Config(
                "page_workers must be greater than 0".to_string(),
            ));
        }
        if self.page_timeout_secs == 0 {
            return Err(IndexError::Config(
                "page_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.open_access_label.is_empty() {
            return Err(IndexError::Config(
                "open_access_label cannot be empty".to_string(),
            ));
        }

        // A field promoted to the parent only is marked skip on the child;
        // promoting it to the whole chain as well would contradict that.
        if let Some(both) = self
            .promote_to_parent_fields
            .iter()
            .find(|f| self.promote_to_ancestor_fields.contains(f))
        {
            return Err(IndexError::Config(format!(
                "field {both} configured for both parent-only and ancestor-chain promotion"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_conflicting_promotion_rejected() {
        let mut config = EngineConfig::default();
        config.promote_to_parent_fields = vec!["MD_PLACE".to_string()];
        config.promote_to_ancestor_fields = vec!["MD_PLACE".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = EngineConfig::default();
        config.page_workers = 0;
        assert!(config.validate().is_err());
    }
}
