//! npm registry API response types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Full package document from the registry (`GET /{name}`)
#[derive(Debug, Clone, Deserialize)]
pub struct Packument {
    /// Package name
    pub name: String,
    /// Tag-name to version mapping
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    /// Per-version manifests, keyed by concrete version
    #[serde(default)]
    pub versions: HashMap<String, Value>,
}

/// The published versions and dist-tags of one package.
///
/// Owned by the metadata cache; each registry fetch replaces the cached
/// value wholesale, it is never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsAndTags {
    pub versions: Vec<String>,
    pub tags: HashMap<String, String>,
}

impl From<&Packument> for VersionsAndTags {
    fn from(packument: &Packument) -> Self {
        Self {
            versions: packument.versions.keys().cloned().collect(),
            tags: packument.dist_tags.clone(),
        }
    }
}

/// Manifest keys that are irrelevant for serving files
const CONFIG_EXCLUDE_KEYS: &[&str] = &[
    "browserify",
    "bugs",
    "directories",
    "engines",
    "files",
    "homepage",
    "keywords",
    "maintainers",
    "scripts",
];

/// Strip registry bookkeeping (`_`-prefixed) and irrelevant manifest keys
/// from a per-version manifest.
pub fn clean_package_config(config: &Value) -> Value {
    match config.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| {
                    !key.starts_with('_') && !CONFIG_EXCLUDE_KEYS.contains(&key.as_str())
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        None => config.clone(),
    }
}
