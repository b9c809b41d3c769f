//! End-to-end pipeline tests against a mock registry

use super::*;

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use http_body_util::BodyExt;
use serde_json::json;
use tar::Header;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tarmac_registry::{MetadataCache, RegistryClient};

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_546_300_800);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("package{name}"), content.as_bytes())
            .unwrap();
    }
    let data = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&data).unwrap();
    encoder.finish().unwrap()
}

fn react_packument() -> serde_json::Value {
    json!({
        "name": "react",
        "dist-tags": { "latest": "16.8.1" },
        "versions": {
            "16.7.0": {
                "name": "react",
                "version": "16.7.0",
                "main": "index.js",
                "dependencies": { "object-assign": "^4.1.1" }
            },
            "16.8.1": { "name": "react", "version": "16.8.1", "main": "index.js" }
        }
    })
}

fn react_tarball() -> Vec<u8> {
    tarball(&[
        (
            "/package.json",
            r#"{"name":"react","version":"16.7.0","main":"index.js"}"#,
        ),
        (
            "/index.js",
            "module.exports = require('./cjs/react.development.js');",
        ),
        ("/cjs/react.development.js", "exports.version = '16.7.0';"),
        ("/lib/index.js", "module.exports = {};"),
        (
            "/esm/react.js",
            "import assign from 'object-assign';\nexport default assign;",
        ),
    ])
}

async fn react_gateway(mock_server: &MockServer) -> Gateway {
    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(ResponseTemplate::new(200).set_body_json(react_packument()))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/react/-/react-16.7.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(react_tarball()))
        .mount(mock_server)
        .await;

    let client = RegistryClient::new(&mock_server.uri()).unwrap();
    let service = RegistryService::new(client, MetadataCache::new());
    Gateway::new(service, "https://cdn.test")
}

fn header_value<'a>(response: &'a HttpResponse, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .map(|value| value.to_str().unwrap())
        .unwrap_or("")
}

async fn body_text(response: HttpResponse) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_latest_tag_redirects_to_concrete_version() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(header_value(&response, header::LOCATION), "/react@16.8.1");
    assert_eq!(
        header_value(&response, header::CACHE_CONTROL),
        CACHE_SEMVER_REDIRECT
    );
}

#[tokio::test]
async fn test_range_redirect_preserves_filename() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@^16.7.0/index.js").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.8.1/index.js"
    );
}

#[tokio::test]
async fn test_bare_pinned_package_redirects_to_main() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.7.0/index.js"
    );
    assert_eq!(header_value(&response, header::CACHE_CONTROL), CACHE_ONE_YEAR);
}

#[tokio::test]
async fn test_exact_file_serves_content_with_headers() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/index.js").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, header::CONTENT_TYPE).contains("javascript"));
    assert!(header_value(&response, header::CONTENT_TYPE).contains("charset=utf-8"));
    assert_eq!(header_value(&response, header::CACHE_CONTROL), CACHE_ONE_YEAR);
    assert_eq!(
        header_value(&response, header::LAST_MODIFIED),
        "Tue, 01 Jan 2019 00:00:00 GMT"
    );
    assert!(!header_value(&response, header::ETAG).is_empty());

    let body = body_text(response).await;
    assert_eq!(body, "module.exports = require('./cjs/react.development.js');");
}

#[tokio::test]
async fn test_extensionless_file_redirects_to_js() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/cjs/react.development").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.7.0/cjs/react.development.js"
    );
    assert_eq!(header_value(&response, header::CACHE_CONTROL), CACHE_ONE_YEAR);
}

#[tokio::test]
async fn test_directory_redirects_to_index_file() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/lib").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.7.0/lib/index.js"
    );
}

#[tokio::test]
async fn test_missing_file_is_cached_not_found() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/nope.css").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_value(&response, header::CACHE_CONTROL), CACHE_ONE_YEAR);
    let body = body_text(response).await;
    assert!(body.contains("Cannot find \"/nope.css\" in react@16.7.0"));
}

#[tokio::test]
async fn test_unknown_package_is_not_found_without_tarball_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    // Resolution fails before the archive stage, so no tarball request
    // may reach the registry.
    Mock::given(method("GET"))
        .and(path_regex(r"^/ghost/-/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let gateway = react_gateway(&mock_server).await;
    let response = gateway.serve_path("/ghost/index.js").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains("Cannot find package ghost@latest"));
}

#[tokio::test]
async fn test_invalid_package_name_is_forbidden() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/React@16.7.0/index.js").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // 32-character hex names are reserved.
    let response = gateway
        .serve_path("/0123456789abcdef0123456789abcdef/x.js")
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_query_parameters_are_stripped() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/index.js?foo=bar").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.7.0/index.js"
    );
}

#[tokio::test]
async fn test_file_metadata() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/package.json?meta").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, header::CONTENT_TYPE).contains("application/json"));

    let metadata: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(metadata["path"], "/package.json");
    assert_eq!(metadata["type"], "file");
    assert!(metadata["size"].as_u64().unwrap() > 0);
    assert!(metadata["integrity"].as_str().unwrap().starts_with("sha384-"));
}

#[tokio::test]
async fn test_directory_metadata_lists_files_recursively() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let metadata: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(metadata["path"], "/");
    assert_eq!(metadata["type"], "directory");

    let files = metadata["files"].as_array().unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f["path"].as_str().unwrap()).collect();
    assert!(paths.contains(&"/index.js"));
    assert!(paths.contains(&"/cjs"));

    let cjs = files.iter().find(|f| f["path"] == "/cjs").unwrap();
    assert_eq!(cjs["files"][0]["path"], "/cjs/react.development.js");
}

#[tokio::test]
async fn test_module_mode_rewrites_bare_imports() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/esm/react.js?module").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("https://cdn.test/object-assign@^4.1.1?module"));
}

#[tokio::test]
async fn test_module_mode_rejects_non_javascript() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/package.json?module").await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_module_mode_without_es_entry_point() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0?module").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains("does not contain an ES module"));
}

#[tokio::test]
async fn test_responses_allow_any_origin() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let file = gateway.serve_path("/react@16.7.0/index.js").await;
    assert_eq!(
        header_value(&file, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );

    let redirect = gateway.serve_path("/react").await;
    assert_eq!(
        header_value(&redirect, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
}

#[tokio::test]
async fn test_legacy_meta_path_redirects() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway
        .serve_path("/_meta/react@16.7.0/package.json")
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.7.0/package.json?meta"
    );
}

#[tokio::test]
async fn test_legacy_json_query_redirects_to_meta() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react@16.7.0/package.json?json").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header_value(&response, header::LOCATION),
        "/react@16.7.0/package.json?meta"
    );
}

#[tokio::test]
async fn test_trailing_slash_on_tag_redirects_with_slash() {
    let mock_server = MockServer::start().await;
    let gateway = react_gateway(&mock_server).await;

    let response = gateway.serve_path("/react/").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(header_value(&response, header::LOCATION), "/react@16.8.1/");
}
