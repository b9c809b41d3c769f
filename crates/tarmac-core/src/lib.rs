//! # tarmac-core
//!
//! Core types and utilities shared across all tarmac crates.
//!
//! This crate provides:
//! - PackageSpec parsing for `/{package}[@{version}]/{path}` request paths
//! - npm package name validation
//! - ArchiveEntry types for files discovered inside package tarballs
//! - GatewayError enum for unified error handling
//! - Content-type and integrity helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult};
pub use types::{ArchiveEntry, EntryKind, PackageSpec};
