//! Core data types for the gateway.

pub mod entry;
pub mod spec;

pub use entry::{ArchiveEntry, EntryKind};
pub use spec::PackageSpec;
