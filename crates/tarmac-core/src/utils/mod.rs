//! Utility functions shared across the gateway.

pub mod content_type;
pub mod integrity;

pub use content_type::{content_type_header, get_content_type};
pub use integrity::{etag, get_integrity};
