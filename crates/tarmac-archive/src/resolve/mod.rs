//! Fetch-and-scan orchestration.
//!
//! Opens the tarball stream for a concrete package version and runs the
//! blocking scan on a dedicated thread, fed by a bounded chunk channel.
//! Every request opens its own stream; concurrent requests for the same
//! archive are independent.

use std::collections::BTreeMap;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use tarmac_core::{ArchiveEntry, GatewayError, GatewayResult};
use tarmac_registry::RegistryService;

use crate::scan::{self, ScanOutcome};
use crate::stream::{ChunkReader, ChunkResult};

/// Chunks in flight between the download task and the scan thread
const CHANNEL_DEPTH: usize = 16;

/// Streams package archives and resolves entries inside them
#[derive(Debug)]
pub struct ArchiveEntryResolver<'a> {
    service: &'a RegistryService,
}

impl<'a> ArchiveEntryResolver<'a> {
    pub fn new(service: &'a RegistryService) -> Self {
        Self { service }
    }

    /// Search the package archive for the entry answering `filename`
    pub async fn search(
        &self,
        package_name: &str,
        version: &str,
        filename: &str,
    ) -> GatewayResult<ScanOutcome> {
        let receiver = self.open(package_name, version).await?;
        let filename = filename.to_string();
        let spec = format!("{package_name}@{version}");

        run_scan(spec, move || {
            let reader = flate2::read::GzDecoder::new(ChunkReader::new(receiver));
            scan::search_entries(reader, &filename)
        })
        .await
    }

    /// Collect metadata for everything inside the directory `dirname`
    pub async fn list(
        &self,
        package_name: &str,
        version: &str,
        dirname: &str,
    ) -> GatewayResult<BTreeMap<String, ArchiveEntry>> {
        let receiver = self.open(package_name, version).await?;
        let dirname = dirname.to_string();
        let spec = format!("{package_name}@{version}");

        run_scan(spec, move || {
            let reader = flate2::read::GzDecoder::new(ChunkReader::new(receiver));
            scan::list_entries(reader, &dirname)
        })
        .await
    }

    /// Open the compressed archive stream and start the transfer task
    async fn open(
        &self,
        package_name: &str,
        version: &str,
    ) -> GatewayResult<mpsc::Receiver<ChunkResult>> {
        let response = self
            .service
            .tarball(package_name, version)
            .await?
            .ok_or_else(|| GatewayError::PackageNotFound {
                name: package_name.to_string(),
                version: version.to_string(),
            })?;

        let (sender, receiver) = mpsc::channel(CHANNEL_DEPTH);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                // A closed receiver means the scan finished early or the
                // client went away; stop pulling bytes either way.
                if sender.send(chunk).await.is_err() {
                    debug!("archive scan stopped before the transfer completed");
                    break;
                }
            }
        });

        Ok(receiver)
    }
}

/// Run a blocking scan closure, mapping failures to `ArchiveRead`
async fn run_scan<T, F>(spec: String, scan: F) -> GatewayResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    let package = spec.clone();
    tokio::task::spawn_blocking(scan)
        .await
        .map_err(|join_error| GatewayError::ArchiveRead {
            package: spec,
            message: format!("scan task failed: {join_error}"),
            source: None,
        })?
        .map_err(|io_error| GatewayError::ArchiveRead {
            package,
            message: io_error.to_string(),
            source: Some(io_error),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, Header};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use tarmac_registry::{MetadataCache, RegistryClient};

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let encoder = GzEncoder::new(&mut bytes, Compression::default());
            let mut builder = Builder::new(encoder);
            for (file_path, content) in files {
                let mut header = Header::new_gnu();
                header.set_path(format!("package{file_path}")).unwrap();
                header.set_size(content.len() as u64);
                header.set_cksum();
                builder.append(&header, content.as_bytes()).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }
        bytes
    }

    #[tokio::test]
    async fn test_search_streams_from_registry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/react/-/react-16.7.0.tgz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(tarball(&[("/package.json", "{\"name\":\"react\"}")])),
            )
            .mount(&mock_server)
            .await;

        let service = RegistryService::new(
            RegistryClient::new(&mock_server.uri()).unwrap(),
            MetadataCache::new(),
        );
        let resolver = ArchiveEntryResolver::new(&service);

        let outcome = resolver.search("react", "16.7.0", "/package.json").await.unwrap();
        let entry = outcome.found_entry().unwrap();

        assert_eq!(entry.path, "/package.json");
        assert_eq!(entry.content.as_deref(), Some(br#"{"name":"react"}"#.as_slice()));
    }

    #[tokio::test]
    async fn test_missing_tarball_is_package_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ghost/-/ghost-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let service = RegistryService::new(
            RegistryClient::new(&mock_server.uri()).unwrap(),
            MetadataCache::new(),
        );
        let resolver = ArchiveEntryResolver::new(&service);

        let error = resolver.search("ghost", "1.0.0", "/index.js").await.unwrap_err();
        assert!(matches!(error, GatewayError::PackageNotFound { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_archive_read_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad/-/bad-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not gzip".to_vec()))
            .mount(&mock_server)
            .await;

        let service = RegistryService::new(
            RegistryClient::new(&mock_server.uri()).unwrap(),
            MetadataCache::new(),
        );
        let resolver = ArchiveEntryResolver::new(&service);

        let error = resolver.search("bad", "1.0.0", "/index.js").await.unwrap_err();
        assert!(matches!(error, GatewayError::ArchiveRead { .. }));
    }
}
