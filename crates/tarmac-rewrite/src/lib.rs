//! ES module specifier rewriting for the tarmac gateway
//!
//! Rewrites import/export source specifiers in JavaScript (and in
//! `<script type="module">` blocks of HTML) so bare package names become
//! fully qualified gateway URLs and relative paths keep module mode
//! through a `?module` query marker.

pub mod html;
pub mod js;

use std::collections::HashMap;

use serde_json::Value;

use tarmac_core::GatewayResult;

/// Rewrites module specifiers against one gateway origin.
///
/// The parse/transform/serialize machinery lives in the `js` and `html`
/// modules; this type is the seam the pipeline dispatches through.
#[derive(Debug, Clone)]
pub struct ModuleRewriter {
    origin: String,
}

impl ModuleRewriter {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    /// Rewrite all static and dynamic import/export specifiers in a
    /// JavaScript module
    pub fn rewrite_javascript(
        &self,
        dependencies: &HashMap<String, String>,
        code: &str,
        file: &str,
    ) -> GatewayResult<String> {
        js::rewrite_module(&self.origin, dependencies, code, file)
    }

    /// Rewrite specifiers inside `<script type="module">` blocks,
    /// leaving the rest of the markup untouched
    pub fn rewrite_html(
        &self,
        dependencies: &HashMap<String, String>,
        markup: &str,
        file: &str,
    ) -> GatewayResult<String> {
        html::rewrite_module_scripts(&self.origin, dependencies, markup, file)
    }
}

/// The dependency map used for bare-specifier versions: merged
/// `peerDependencies` and `dependencies`, with `dependencies` winning.
pub fn dependency_map(package_config: &Value) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for key in ["peerDependencies", "dependencies"] {
        if let Some(map) = package_config.get(key).and_then(Value::as_object) {
            for (name, range) in map {
                if let Some(range) = range.as_str() {
                    merged.insert(name.clone(), range.to_string());
                }
            }
        }
    }
    merged
}
