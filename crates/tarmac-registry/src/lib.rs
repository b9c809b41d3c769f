//! npm registry client for the tarmac gateway
//!
//! This crate provides HTTP client functionality for fetching package
//! metadata and tarball streams from an npm registry, plus a TTL- and
//! capacity-bounded metadata cache fronting those lookups.

pub mod api;
pub mod cache;
pub mod client;
pub mod service;

// Re-export main types
pub use api::{clean_package_config, Packument, VersionsAndTags};
pub use cache::{CacheEntry, CacheStats, MetadataCache};
pub use client::RegistryClient;
pub use service::RegistryService;

use tarmac_core::error::GatewayError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, GatewayError>;
