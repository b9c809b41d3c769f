//! HTTP client for the upstream registry with connection pooling

use std::time::Duration;

use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::debug;

use tarmac_core::error::GatewayError;

use crate::api::Packument;
use crate::RegistryResult;

/// HTTP client for npm registry operations.
///
/// Failed fetches are not retried here; negative caching in the service
/// layer bounds how often a missing package can hit the registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Base registry URL, e.g. `https://registry.npmjs.org`
    base_url: String,
}

impl RegistryClient {
    /// Create a new registry client with connection pooling and an
    /// explicit per-request timeout.
    pub fn new(base_url: &str) -> RegistryResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent(concat!("tarmac/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::network("Failed to create HTTP client".to_string(), e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the full package document for a package.
    ///
    /// Returns `None` when the registry has no such package.
    pub async fn fetch_packument(&self, package_name: &str) -> RegistryResult<Option<Packument>> {
        let url = format!("{}/{}", self.base_url, encode_package_name(package_name));
        debug!(package = package_name, %url, "fetching package info");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                GatewayError::network(format!("Failed to fetch info for {package_name}"), e)
            })?;

        match response.status() {
            StatusCode::OK => {
                let packument = response.json::<Packument>().await.map_err(|e| {
                    GatewayError::network(format!("Failed to parse info for {package_name}"), e)
                })?;
                Ok(Some(packument))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(GatewayError::Network {
                message: format!("Registry returned status {status} for {package_name}"),
                source: None,
            }),
        }
    }

    /// The tarball download URL for a concrete `(name, version)` pair
    pub fn tarball_url(&self, package_name: &str, version: &str) -> String {
        // Scoped tarballs live under the full name but use the bare
        // name in the file component.
        let basename = package_name.split('/').last().unwrap_or(package_name);
        format!(
            "{}/{}/-/{}-{}.tgz",
            self.base_url, package_name, basename, version
        )
    }

    /// Open the gzip-compressed tarball stream for a package version.
    ///
    /// Returns the raw response; the caller consumes `bytes_stream()`
    /// exactly once. `None` when the registry has no such tarball.
    pub async fn fetch_tarball(
        &self,
        package_name: &str,
        version: &str,
    ) -> RegistryResult<Option<reqwest::Response>> {
        let url = self.tarball_url(package_name, version);
        debug!(package = package_name, version, %url, "fetching tarball");

        let response = self.client.get(&url).send().await.map_err(|e| {
            GatewayError::network(format!("Failed to fetch tarball for {package_name}@{version}"), e)
        })?;

        match response.status() {
            StatusCode::OK => Ok(Some(response)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(GatewayError::Network {
                message: format!("Registry returned status {status} for {package_name}@{version}"),
                source: None,
            }),
        }
    }
}

/// Encode a package name for use in a registry URL.
///
/// Scoped packages keep the leading `@` but encode the inner slash.
pub fn encode_package_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2f")
    } else {
        name.to_string()
    }
}
