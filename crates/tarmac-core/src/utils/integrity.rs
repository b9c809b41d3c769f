//! Content hashing for integrity metadata and ETags.

use base64::{engine::general_purpose, Engine as _};
use sha1::Digest;

/// Subresource-integrity hash of the given content (`sha384-{base64}`)
pub fn get_integrity(content: &[u8]) -> String {
    let digest = sha2::Sha384::digest(content);
    format!("sha384-{}", general_purpose::STANDARD.encode(digest))
}

/// Strong ETag for the final bytes served
pub fn etag(content: &[u8]) -> String {
    let digest = sha1::Sha1::digest(content);
    format!("\"{}\"", hex::encode(&digest[..8]))
}
