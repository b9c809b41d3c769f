//! Single-pass archive entry resolution for the tarmac gateway
//!
//! Streams a package tarball from the registry, decompresses it on the fly,
//! and scans it exactly once to find the requested entry (or a directory
//! listing), following node's module resolution conventions. The archive is
//! never materialized on disk and non-matching file bytes are drained
//! without buffering.

pub mod resolve;
pub mod scan;
pub mod stream;

pub use resolve::ArchiveEntryResolver;
pub use scan::{list_entries, search_entries, ScanOutcome};
pub use stream::ChunkReader;
