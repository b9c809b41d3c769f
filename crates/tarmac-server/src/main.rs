//! # tarmac
//!
//! npm package CDN gateway.
//!
//! Serves files straight out of npm package tarballs over HTTP: semver
//! resolution with redirects to canonical URLs, single-pass streaming
//! tarball scans, metadata listings, and on-the-fly ES module rewriting.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

use tarmac_registry::{MetadataCache, RegistryClient, RegistryService};

mod pipeline;
mod query;

use pipeline::Gateway;

/// npm package CDN gateway
#[derive(Parser)]
#[command(name = "tarmac", version, about = "Serve files from npm packages")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// npm registry to fetch packages from
    #[arg(
        long,
        env = "REGISTRY_URL",
        default_value = "https://registry.npmjs.org"
    )]
    registry_url: String,

    /// Public origin used in rewritten module URLs
    /// (defaults to http://localhost:{port})
    #[arg(long, env = "ORIGIN")]
    origin: Option<String>,

    /// Metadata cache capacity in megabytes
    #[arg(long, env = "CACHE_CAPACITY_MB", default_value_t = 40)]
    cache_capacity: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    info!("Starting tarmac v{}", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
    rt.block_on(run_server(cli))
}

async fn run_server(cli: Cli) -> anyhow::Result<()> {
    let origin = match cli.origin {
        Some(origin) => {
            Url::parse(&origin).context("invalid --origin URL")?;
            origin.trim_end_matches('/').to_string()
        }
        None => format!("http://localhost:{}", cli.port),
    };

    let client = RegistryClient::new(&cli.registry_url)?;
    let cache = MetadataCache::with_capacity(cli.cache_capacity * 1024 * 1024);
    let gateway = Arc::new(Gateway::new(RegistryService::new(client, cache), origin));

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("tarmac listening on http://{addr}");

    loop {
        let (stream, remote) = listener.accept().await.context("accept failed")?;
        let gateway = Arc::clone(&gateway);

        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let gateway = Arc::clone(&gateway);
                async move { Ok::<_, Infallible>(gateway.handle(request).await) }
            });

            if let Err(error) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%remote, %error, "connection error");
            }
        });
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tarmac={level},tarmac_registry={level},tarmac_resolver={level},tarmac_archive={level},tarmac_rewrite={level}"
        ))
        .with_target(false)
        .init();
}
