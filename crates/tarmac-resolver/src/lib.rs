//! Version specifier resolution for the tarmac gateway
//!
//! Resolves a version specifier (exact version, semver range, or dist-tag)
//! against the package's published versions into one concrete version.

pub mod semver;

use tracing::debug;

use tarmac_registry::RegistryService;

use crate::semver::max_satisfying;

/// Resolves version specifiers through the cached registry metadata.
///
/// The caller is responsible for redirecting when the resolved concrete
/// version differs from the requested specifier; tags and ranges always
/// redirect, exact versions never do.
#[derive(Debug)]
pub struct VersionResolver<'a> {
    service: &'a RegistryService,
}

impl<'a> VersionResolver<'a> {
    pub fn new(service: &'a RegistryService) -> Self {
        Self { service }
    }

    /// Resolve `version_spec` for `package_name` to a concrete published
    /// version.
    ///
    /// Tags are substituted first, then an exact match is returned
    /// verbatim, then the specifier is treated as a range and the highest
    /// satisfying version wins. `None` when the package does not exist or
    /// nothing satisfies the range.
    pub async fn resolve(
        &self,
        package_name: &str,
        version_spec: &str,
    ) -> tarmac_registry::RegistryResult<Option<String>> {
        let Some(meta) = self.service.versions_and_tags(package_name).await? else {
            return Ok(None);
        };

        let spec = match meta.tags.get(version_spec) {
            Some(tagged) => {
                debug!(
                    package = package_name,
                    tag = version_spec,
                    version = %tagged,
                    "substituted dist-tag"
                );
                tagged.as_str()
            }
            None => version_spec,
        };

        if meta.versions.iter().any(|v| v == spec) {
            return Ok(Some(spec.to_string()));
        }

        let resolved = max_satisfying(meta.versions.iter().map(String::as_str), spec);
        debug!(package = package_name, range = spec, ?resolved, "resolved version range");
        Ok(resolved)
    }
}
