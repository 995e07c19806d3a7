#![forbid(unsafe_code)]
//! Checksums, path filters, URL encoding, and process helpers for Depot.

pub mod checksum;
pub mod error;
pub mod filter;
pub mod process;
pub mod url;
