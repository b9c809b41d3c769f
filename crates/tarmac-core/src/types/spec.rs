//! Request path parsing into package coordinates.
//!
//! A request path looks like `/@scope/name@version/file.js`. The version and
//! filename portions are optional; the version defaults to the `latest` tag.

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};

/// `/{@scope/}{name}{@version}{/rest...}`
static PACKAGE_PATHNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/((?:@[^/@]+/)?[^/@]+)(?:@([^/]+))?(/.*)?$").unwrap());

static REPEATED_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"//+").unwrap());

static HEX_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-fA-F0-9]+$").unwrap());

/// Parsed package coordinates for one inbound request.
///
/// Created once per request and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSpec {
    /// Package name, `@scope/name` or unscoped
    pub name: String,
    /// Concrete version, semver range, or dist-tag
    pub version_spec: String,
    /// `/`-rooted path inside the package, possibly empty
    pub filename: String,
}

impl PackageSpec {
    /// Parse a raw URL path into package coordinates.
    ///
    /// URL-decodes the path, applies the package pathname grammar, and
    /// collapses repeated slashes in the filename portion. Pure function.
    pub fn parse(pathname: &str) -> GatewayResult<Self> {
        let invalid = || GatewayError::InvalidPath {
            path: pathname.to_string(),
        };

        let decoded = percent_decode_str(pathname)
            .decode_utf8()
            .map_err(|_| invalid())?;

        let caps = PACKAGE_PATHNAME.captures(&decoded).ok_or_else(invalid)?;

        let name = caps.get(1).map(|m| m.as_str().to_string()).ok_or_else(invalid)?;
        let version_spec = caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "latest".to_string());
        let filename = caps
            .get(3)
            .map(|m| REPEATED_SLASHES.replace_all(m.as_str(), "/").into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            version_spec,
            filename,
        })
    }

    /// The `name@version` form used in messages and cache keys.
    pub fn package_spec(&self) -> String {
        format!("{}@{}", self.name, self.version_spec)
    }
}

/// 32-character hex strings are reserved and can never be package names.
pub fn is_hash(value: &str) -> bool {
    value.len() == 32 && HEX_VALUE.is_match(value)
}

/// Validate an npm package name.
///
/// Follows the registry's naming rules: at most 214 characters, lowercase,
/// URL-friendly characters only, no leading period or underscore in either
/// the scope or the name segment.
pub fn validate_package_name(name: &str) -> Result<(), String> {
    if is_hash(name) {
        return Err("cannot be a hash".to_string());
    }

    if name.is_empty() {
        return Err("name length must be greater than zero".to_string());
    }
    if name.len() > 214 {
        return Err("name cannot contain more than 214 characters".to_string());
    }
    if name.trim() != name {
        return Err("name cannot contain leading or trailing spaces".to_string());
    }
    if name.to_lowercase() != name {
        return Err("name can no longer contain capital letters".to_string());
    }

    let (scope, bare) = match name.strip_prefix('@') {
        Some(rest) => match rest.split_once('/') {
            Some((scope, bare)) => (Some(scope), bare),
            None => return Err("scoped name must contain a slash".to_string()),
        },
        None => (None, name),
    };

    for segment in scope.iter().copied().chain(std::iter::once(bare)) {
        if segment.is_empty() {
            return Err("name segments must be non-empty".to_string());
        }
        if segment.starts_with('.') {
            return Err("name cannot start with a period".to_string());
        }
        if segment.starts_with('_') {
            return Err("name cannot start with an underscore".to_string());
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_'))
        {
            return Err("name can only contain URL-friendly characters".to_string());
        }
    }

    Ok(())
}
