//! Verihubs Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Verihubs sales pipeline.
//!
//! - **Error Handling**: [`VerihubsError`] and the crate [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Checksums**: SHA-256 fingerprints for downloaded source files
//!
//! # Example
//!
//! ```no_run
//! use verihubs_common::checksum::compute_file_checksum;
//!
//! fn fingerprint(path: &str) -> verihubs_common::Result<()> {
//!     let checksum = compute_file_checksum(path)?;
//!     println!("sha256: {}", checksum);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{Result, VerihubsError};
