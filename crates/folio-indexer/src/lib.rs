//! Hotfolder indexing daemon
//!
//! Watches an input location for metadata source documents, compiles
//! each one through the shared structure-compilation engine, and keeps
//! the search index and the data repositories consistent. Format
//! adapters live here; everything format-independent is in `folio-core`.

pub mod adapters;
pub mod config;
pub mod daemon;
pub mod hotfolder;
pub mod probes;
pub mod repository;

pub use config::DaemonConfig;
pub use daemon::Daemon;
