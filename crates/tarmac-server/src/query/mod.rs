//! Query-string policy.
//!
//! Only a few query parameters are recognized; anything else redirects to
//! the same path with the unknown parameters stripped, which keeps the
//! cache key space small for downstream CDN caching.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Parse a raw query string into sorted key/value pairs.
///
/// A key without a value (e.g. `?meta`) maps to an empty string.
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, String> {
    match raw {
        Some(raw) => form_urlencoded::parse(raw.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect(),
        None => BTreeMap::new(),
    }
}

/// Render query pairs back into a `?`-prefixed search string.
///
/// Keys are emitted in sorted order; a key with an empty value is
/// emitted alone. Empty input renders as an empty string.
pub fn create_search(query: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = query
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                encode(key)
            } else {
                format!("{}={}", encode(key), encode(value))
            }
        })
        .collect();

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

/// Keep only the allowed keys. Returns `None` when nothing was dropped
/// (no redirect needed) and the filtered query otherwise.
pub fn filter_unknown(
    query: &BTreeMap<String, String>,
    allowed: &[&str],
) -> Option<BTreeMap<String, String>> {
    if query.keys().all(|key| allowed.contains(&key.as_str())) {
        return None;
    }

    Some(
        query
            .iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
