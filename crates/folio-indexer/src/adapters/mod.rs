//! Format adapters
//!
//! One adapter per source dialect. The daemon asks each adapter in turn
//! whether it supports an incoming file; the first match processes it.

pub mod anchor;
pub mod flat;

pub use anchor::AnchorQueueAdapter;
pub use flat::FlatXmlAdapter;

use folio_core::FormatAdapter;

/// All adapters in probing order. The anchor adapter goes first so
/// `.purge.json` documents are never mistaken for ordinary sources.
pub fn all() -> Vec<Box<dyn FormatAdapter>> {
    vec![
        Box::new(AnchorQueueAdapter::new()),
        Box::new(FlatXmlAdapter::new()),
    ]
}
