//! Unit tests for the fetch-or-cache service layer

use super::*;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn service_for(mock_server: &MockServer) -> RegistryService {
    let client = RegistryClient::new(&mock_server.uri()).unwrap();
    RegistryService::new(client, MetadataCache::new())
}

fn react_packument() -> serde_json::Value {
    serde_json::json!({
        "name": "react",
        "dist-tags": { "latest": "16.8.0", "next": "16.9.0-alpha.0" },
        "versions": {
            "16.7.0": {
                "name": "react",
                "version": "16.7.0",
                "main": "index.js",
                "scripts": { "build": "rollup" },
                "_id": "react@16.7.0",
                "dependencies": { "loose-envify": "^1.1.0" }
            },
            "16.8.0": { "name": "react", "version": "16.8.0", "main": "index.js" }
        }
    })
}

#[tokio::test]
async fn test_versions_and_tags_hits_cache_on_second_lookup() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(ResponseTemplate::new(200).set_body_json(react_packument()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server).await;

    let first = service.versions_and_tags("react").await.unwrap().unwrap();
    let second = service.versions_and_tags("react").await.unwrap().unwrap();

    assert_eq!(first.tags.get("latest").unwrap(), "16.8.0");
    assert_eq!(second.versions.len(), 2);
}

#[tokio::test]
async fn test_missing_package_is_negatively_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server).await;

    assert!(service.versions_and_tags("ghost").await.unwrap().is_none());
    // Second lookup is served from the negative cache, not the registry.
    assert!(service.versions_and_tags("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_failure_is_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server).await;

    assert!(service.versions_and_tags("flaky").await.is_err());
    // The failure was not cached as a negative; the registry is asked again.
    assert!(service.versions_and_tags("flaky").await.is_err());
}

#[tokio::test]
async fn test_package_config_is_cleaned() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(ResponseTemplate::new(200).set_body_json(react_packument()))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server).await;
    let config = service.package_config("react", "16.7.0").await.unwrap().unwrap();

    assert_eq!(config["version"], "16.7.0");
    assert!(config.get("dependencies").is_some());
    assert!(config.get("scripts").is_none());
    assert!(config.get("_id").is_none());
}

#[tokio::test]
async fn test_unknown_version_config_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(ResponseTemplate::new(200).set_body_json(react_packument()))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server).await;
    let config = service.package_config("react", "0.0.1").await.unwrap();

    assert!(config.is_none());
}
