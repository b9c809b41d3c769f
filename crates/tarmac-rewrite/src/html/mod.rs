//! Rewriting `<script type="module">` blocks inside HTML entries.
//!
//! Only the bodies of module scripts are touched; all other markup,
//! including classic scripts, passes through byte for byte.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use tarmac_core::GatewayResult;

use crate::js;

static MODULE_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)(<script[^>]*\btype\s*=\s*["']?module["']?[^>]*>)(.*?)(</script>)"#).unwrap()
});

/// Rewrite every module-script body in `markup`.
pub fn rewrite_module_scripts(
    origin: &str,
    dependencies: &HashMap<String, String>,
    markup: &str,
    file: &str,
) -> GatewayResult<String> {
    let mut output = String::with_capacity(markup.len());
    let mut last_end = 0;

    for caps in MODULE_SCRIPT.captures_iter(markup) {
        let whole = caps.get(0).expect("capture 0 always present");
        let open_tag = &caps[1];
        let body = &caps[2];
        let close_tag = &caps[3];

        output.push_str(&markup[last_end..whole.start()]);
        output.push_str(open_tag);
        output.push_str(&js::rewrite_module(origin, dependencies, body, file)?);
        output.push_str(close_tag);
        last_end = whole.end();
    }

    output.push_str(&markup[last_end..]);
    Ok(output)
}
