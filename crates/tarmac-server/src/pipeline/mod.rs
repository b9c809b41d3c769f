//! The request pipeline.
//!
//! One inbound request walks ParsePath -> ResolveVersion -> ResolveEntry
//! and terminates in exactly one response: serve a file, serve directory
//! metadata, redirect to the canonical URL, or report not-found. All
//! ambiguous URLs (tags, ranges, extensionless files, directories)
//! redirect to their canonical `{name}@{version}{/path}` form so
//! downstream caches only ever see one URL per resource.

use std::collections::BTreeMap;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, error};

use tarmac_archive::{ArchiveEntryResolver, ScanOutcome};
use tarmac_core::types::spec::validate_package_name;
use tarmac_core::utils::{content_type_header, etag};
use tarmac_core::{ArchiveEntry, GatewayError, GatewayResult, PackageSpec};
use tarmac_registry::RegistryService;
use tarmac_resolver::VersionResolver;
use tarmac_rewrite::{dependency_map, ModuleRewriter};

use crate::query::{create_search, filter_unknown, parse_query};

pub type HttpResponse = Response<Full<Bytes>>;

/// Version-pinned content is immutable: cache for a year.
const CACHE_ONE_YEAR: &str = "public, max-age=31536000";
/// Version resolution changes as versions are published: 10 minutes on
/// shared caches, 1 minute on clients.
const CACHE_SEMVER_REDIRECT: &str = "public, s-maxage=600, max-age=60";

/// How the client asked for the entry to be served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServeMode {
    /// Raw file bytes
    Raw,
    /// Metadata JSON instead of content
    Meta,
    /// Import-rewritten ES module
    Module,
}

impl ServeMode {
    fn allowed_query_keys(self) -> &'static [&'static str] {
        match self {
            ServeMode::Raw => &["main"],
            ServeMode::Meta => &["meta", "main"],
            ServeMode::Module => &["module", "main"],
        }
    }
}

/// The gateway: orchestrates resolution and entry lookup per request.
///
/// Requests are handled independently and concurrently; the registry
/// service's metadata cache is the only shared state.
#[derive(Debug)]
pub struct Gateway {
    service: RegistryService,
    rewriter: ModuleRewriter,
}

impl Gateway {
    pub fn new(service: RegistryService, origin: impl Into<String>) -> Self {
        Self {
            service,
            rewriter: ModuleRewriter::new(origin),
        }
    }

    /// Entry point for the HTTP server
    pub async fn handle(&self, request: Request<Incoming>) -> HttpResponse {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        }

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        self.serve_path(&path_and_query).await
    }

    /// Serve one request given its path and query string
    pub async fn serve_path(&self, path_and_query: &str) -> HttpResponse {
        let (path, raw_query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let query = parse_query(raw_query);

        let mut response = match self.serve(path, &query).await {
            Ok(response) => response,
            Err(error) => error_response(&error),
        };

        // Package files are fetched cross-origin by design.
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::HeaderValue::from_static("*"),
        );
        response
    }

    async fn serve(
        &self,
        path: &str,
        query: &BTreeMap<String, String>,
    ) -> GatewayResult<HttpResponse> {
        // Legacy URL forms still arrive from old embeds; send them to
        // their modern equivalents.
        if let Some(rest) = path.strip_prefix("/_meta/") {
            let mut kept = query.clone();
            kept.insert("meta".to_string(), String::new());
            return Ok(redirect(
                format!("/{rest}{}", create_search(&kept)),
                CACHE_SEMVER_REDIRECT,
            ));
        }
        if query.contains_key("json") {
            let mut kept = query.clone();
            kept.remove("json");
            kept.insert("meta".to_string(), String::new());
            return Ok(redirect(
                format!("{path}{}", create_search(&kept)),
                CACHE_SEMVER_REDIRECT,
            ));
        }

        let mode = if query.contains_key("meta") {
            ServeMode::Meta
        } else if query.contains_key("module") {
            ServeMode::Module
        } else {
            ServeMode::Raw
        };

        // Unknown query parameters fragment downstream caches; strip
        // them with a redirect before doing any real work.
        if let Some(kept) = filter_unknown(query, mode.allowed_query_keys()) {
            return Ok(redirect(
                format!("{path}{}", create_search(&kept)),
                CACHE_SEMVER_REDIRECT,
            ));
        }

        let spec = PackageSpec::parse(path)?;

        if let Err(reason) = validate_package_name(&spec.name) {
            return Err(GatewayError::InvalidPackageName {
                name: spec.name,
                reason,
            });
        }

        // Resolve the version specifier to a concrete published version.
        let resolver = VersionResolver::new(&self.service);
        let Some(version) = resolver.resolve(&spec.name, &spec.version_spec).await? else {
            return Ok(text_response(
                StatusCode::NOT_FOUND,
                &format!("Cannot find package {}", spec.package_spec()),
            ));
        };

        // Tags and ranges canonicalize to the concrete version; exact
        // versions fall through.
        if version != spec.version_spec {
            debug!(package = %spec.name, from = %spec.version_spec, to = %version, "semver redirect");
            return Ok(redirect(
                package_url(&spec.name, &version, &spec.filename, query),
                CACHE_SEMVER_REDIRECT,
            ));
        }

        let Some(package_config) = self.service.package_config(&spec.name, &version).await? else {
            return Ok(text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Cannot get config for package {}", spec.package_spec()),
            ));
        };

        // A bare package URL redirects to its entry point so relative
        // imports resolve correctly.
        if spec.filename.is_empty() {
            return Ok(self.filename_redirect(&spec, &package_config, query, mode));
        }

        if let Some(dirname) = directory_target(&spec.filename) {
            return match mode {
                ServeMode::Module => Ok(text_response(
                    StatusCode::FORBIDDEN,
                    "module mode is available only for JavaScript and HTML files",
                )),
                _ => self.serve_directory_metadata(&spec, &version, dirname).await,
            };
        }

        let archive = ArchiveEntryResolver::new(&self.service);
        let outcome = archive.search(&spec.name, &version, &spec.filename).await?;

        match mode {
            ServeMode::Meta => self.serve_file_metadata(&spec, query, outcome),
            ServeMode::Module => self.serve_module(&spec, &package_config, query, outcome),
            ServeMode::Raw => self.serve_file(&spec, query, outcome),
        }
    }

    /// Redirect a filename-less request to the package's entry point.
    ///
    /// Module mode prefers the ES-module fields; otherwise the deprecated
    /// `?main=` field override is honored, then `unpkg`, `browser`, and
    /// `main`, falling back to `/index.js`.
    fn filename_redirect(
        &self,
        spec: &PackageSpec,
        config: &Value,
        query: &BTreeMap<String, String>,
        mode: ServeMode,
    ) -> HttpResponse {
        let str_field = |key: &str| config.get(key).and_then(Value::as_str);

        let filename = if mode == ServeMode::Module {
            let mut filename = str_field("module").or_else(|| str_field("jsnext:main"));

            if filename.is_none() {
                if str_field("type") == Some("module") {
                    // The whole package is ESM; use main or index.js.
                    filename = str_field("main").or(Some("/index.js"));
                } else if let Some(main) = str_field("main") {
                    if main.ends_with(".mjs") {
                        filename = Some(main);
                    }
                }
            }

            match filename {
                Some(filename) => filename,
                None => {
                    return text_response(
                        StatusCode::NOT_FOUND,
                        &format!(
                            "Package {} does not contain an ES module",
                            spec.package_spec()
                        ),
                    )
                }
            }
        } else {
            query
                .get("main")
                .and_then(|field| str_field(field))
                .or_else(|| str_field("unpkg"))
                .or_else(|| str_field("browser"))
                .or_else(|| str_field("main"))
                .unwrap_or("/index.js")
        };

        let filename = format!("/{}", filename.trim_start_matches(['.', '/']));
        redirect(
            package_url(&spec.name, &spec.version_spec, &filename, query),
            CACHE_ONE_YEAR,
        )
    }

    /// Flat recursive listing of a directory as metadata JSON
    async fn serve_directory_metadata(
        &self,
        spec: &PackageSpec,
        version: &str,
        dirname: &str,
    ) -> GatewayResult<HttpResponse> {
        let archive = ArchiveEntryResolver::new(&self.service);
        let entries = archive.list(&spec.name, version, dirname).await?;

        // The target itself is always seeded, so a single entry means
        // the directory does not exist in the archive.
        if entries.len() <= 1 && entries.values().all(ArchiveEntry::is_directory) {
            return Ok(not_found_entry(spec, dirname));
        }

        let Some(root) = entries.get(dirname) else {
            return Ok(not_found_entry(spec, dirname));
        };
        Ok(json_response(
            &directory_metadata(root, &entries),
            CACHE_ONE_YEAR,
        ))
    }

    /// Metadata JSON for a single file entry
    fn serve_file_metadata(
        &self,
        spec: &PackageSpec,
        query: &BTreeMap<String, String>,
        outcome: ScanOutcome,
    ) -> GatewayResult<HttpResponse> {
        match self.resolve_outcome(spec, query, outcome)? {
            Resolved::Response(response) => Ok(response),
            Resolved::Entry(entry) => {
                let metadata = serde_json::to_value(&entry).unwrap_or_default();
                Ok(json_response(&metadata, CACHE_ONE_YEAR))
            }
        }
    }

    /// Raw file bytes with content metadata headers
    fn serve_file(
        &self,
        spec: &PackageSpec,
        query: &BTreeMap<String, String>,
        outcome: ScanOutcome,
    ) -> GatewayResult<HttpResponse> {
        match self.resolve_outcome(spec, query, outcome)? {
            Resolved::Response(response) => Ok(response),
            Resolved::Entry(entry) => {
                let content = take_content(&spec.package_spec(), entry)?;
                Ok(file_response(&content.0, content.1))
            }
        }
    }

    /// Import-rewritten ES module output
    fn serve_module(
        &self,
        spec: &PackageSpec,
        config: &Value,
        query: &BTreeMap<String, String>,
        outcome: ScanOutcome,
    ) -> GatewayResult<HttpResponse> {
        match self.resolve_outcome(spec, query, outcome)? {
            Resolved::Response(response) => Ok(response),
            Resolved::Entry(entry) => {
                let (entry, content) = take_content(&spec.package_spec(), entry)?;
                let content_type = entry.content_type.as_deref().unwrap_or("text/plain");
                let label = format!("{}{}", spec.package_spec(), spec.filename);
                let source = String::from_utf8_lossy(&content);
                let dependencies = dependency_map(config);

                let rewritten = match content_type {
                    "application/javascript" | "text/javascript" => {
                        self.rewriter.rewrite_javascript(&dependencies, &source, &label)?
                    }
                    "text/html" => self.rewriter.rewrite_html(&dependencies, &source, &label)?,
                    _ => {
                        return Ok(text_response(
                            StatusCode::FORBIDDEN,
                            "module mode is available only for JavaScript and HTML files",
                        ))
                    }
                };

                let mut rewritten_entry = entry;
                rewritten_entry.size = Some(rewritten.len() as u64);
                Ok(file_response(&rewritten_entry, rewritten.into_bytes()))
            }
        }
    }

    /// Common found/redirect/404 handling shared by the file-serving
    /// modes. A file found at a different path (extension fallback) and a
    /// directory's index file both redirect so the canonical URL serves
    /// the content.
    fn resolve_outcome(
        &self,
        spec: &PackageSpec,
        query: &BTreeMap<String, String>,
        outcome: ScanOutcome,
    ) -> GatewayResult<Resolved> {
        let Some(entry) = outcome.found_entry() else {
            return Ok(Resolved::Response(not_found_entry(spec, &spec.filename)));
        };
        let found = entry.path.clone();

        if entry.is_file() && entry.path != spec.filename {
            // Redirect to the path with the extension so it's clear
            // which file is being served.
            let location = package_url(&spec.name, &spec.version_spec, &entry.path, query);
            return Ok(Resolved::Response(redirect(location, CACHE_ONE_YEAR)));
        }

        if entry.is_directory() {
            // Mirror require("lib") in node: a directory resolves
            // through its index file.
            let index_entry = [format!("{found}/index.js"), format!("{found}/index.json")]
                .into_iter()
                .find_map(|index| outcome.entries.get(&index).filter(|e| e.is_file()));

            return Ok(match index_entry {
                Some(index) => {
                    let location =
                        package_url(&spec.name, &spec.version_spec, &index.path, query);
                    Resolved::Response(redirect(location, CACHE_ONE_YEAR))
                }
                None => Resolved::Response(text_response_with_cache(
                    StatusCode::NOT_FOUND,
                    &format!(
                        "Cannot find an index in \"{}\" in {}",
                        spec.filename,
                        spec.package_spec()
                    ),
                    CACHE_ONE_YEAR,
                )),
            });
        }

        let Some(entry) = outcome.take_found() else {
            return Ok(Resolved::Response(not_found_entry(spec, &spec.filename)));
        };
        Ok(Resolved::Entry(entry))
    }
}

/// Either a terminal response or the winning entry to serve
enum Resolved {
    Response(HttpResponse),
    Entry(ArchiveEntry),
}

/// `/name@version/filename?search`
fn package_url(
    name: &str,
    version: &str,
    filename: &str,
    query: &BTreeMap<String, String>,
) -> String {
    format!("/{name}@{version}{filename}{}", create_search(query))
}

/// `/lib/` asks for the directory `/lib`; `/` asks for the root
fn directory_target(filename: &str) -> Option<&str> {
    if !filename.ends_with('/') {
        return None;
    }
    if filename.len() > 1 {
        Some(&filename[..filename.len() - 1])
    } else {
        Some("/")
    }
}

fn take_content(
    package_spec: &str,
    mut entry: ArchiveEntry,
) -> GatewayResult<(ArchiveEntry, Vec<u8>)> {
    match entry.content.take() {
        Some(content) => Ok((entry, content)),
        None => Err(GatewayError::ArchiveRead {
            package: package_spec.to_string(),
            message: format!("entry {} was selected without content", entry.path),
            source: None,
        }),
    }
}

/// Nested `files` tree in the original metadata shape
fn directory_metadata(dir: &ArchiveEntry, entries: &BTreeMap<String, ArchiveEntry>) -> Value {
    let mut value = serde_json::to_value(dir).unwrap_or_default();

    if dir.is_directory() {
        let files: Vec<Value> = entries
            .values()
            .filter(|entry| entry.path != dir.path && parent_dir(&entry.path) == dir.path)
            .map(|entry| directory_metadata(entry, entries))
            .collect();
        value["files"] = Value::Array(files);
    }

    value
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn not_found_entry(spec: &PackageSpec, filename: &str) -> HttpResponse {
    // Pinned versions are immutable, so a missing entry stays missing.
    text_response_with_cache(
        StatusCode::NOT_FOUND,
        &format!("Cannot find \"{}\" in {}", filename, spec.package_spec()),
        CACHE_ONE_YEAR,
    )
}

fn file_response(entry: &ArchiveEntry, content: Vec<u8>) -> HttpResponse {
    let content_type = entry.content_type.as_deref().unwrap_or("text/plain");
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_header(content_type))
        .header(header::CONTENT_LENGTH, content.len())
        .header(header::CACHE_CONTROL, CACHE_ONE_YEAR)
        .header(header::ETAG, etag(&content));

    if let Some(last_modified) = &entry.last_modified {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }

    builder
        .body(Full::from(content))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "response error"))
}

fn redirect(location: String, cache_control: &str) -> HttpResponse {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, &location)
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::from(format!("Found. Redirecting to {location}")))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "response error"))
}

fn json_response(value: &Value, cache_control: &str) -> HttpResponse {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::CACHE_CONTROL, cache_control)
        .body(Full::from(body))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "response error"))
}

fn text_response(status: StatusCode, body: &str) -> HttpResponse {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Full::from(body.to_string())))
}

fn text_response_with_cache(status: StatusCode, body: &str, cache_control: &str) -> HttpResponse {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, cache_control)
        .body(Full::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Full::from(body.to_string())))
}

/// Map pipeline errors onto their HTTP responses
fn error_response(error: &GatewayError) -> HttpResponse {
    let status = match error {
        GatewayError::InvalidPath { .. } | GatewayError::InvalidPackageName { .. } => {
            StatusCode::FORBIDDEN
        }
        GatewayError::PackageNotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::Network { .. }
        | GatewayError::ArchiveRead { .. }
        | GatewayError::Transform { .. }
        | GatewayError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(%error, "request failed");
    }

    let body = match error {
        // Give the operator the parser's diagnostics.
        GatewayError::Transform { diagnostics, .. } => format!("{error}\n\n{diagnostics}"),
        _ => error.to_string(),
    };

    text_response(status, &body)
}

#[cfg(test)]
mod tests;
