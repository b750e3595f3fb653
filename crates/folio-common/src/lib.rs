//! Folio Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging, and checksum utilities for the folio
//! workspace.
//!
//! # Overview
//!
//! This crate provides the functionality used across all folio workspace
//! members:
//!
//! - **Error Handling**: The [`IndexError`] taxonomy and [`Result`] alias
//! - **Logging**: Centralized `tracing` initialization
//! - **Checksums**: Integrity digests for archived source files

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{IndexError, Result};
