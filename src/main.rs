//! Boardcache admin process
//!
//! Wires the entity services over in-memory repositories and a Redis or
//! in-memory L2, then serves the admin endpoint until Ctrl-C.
//!
//! ```text
//! GET  /healthz               liveness
//! GET  /metrics               Prometheus text format
//! GET  /api/mgt/cache/stats   per-entity cache counters (JSON)
//! POST /api/mgt/cache/flush   clear every L1 tier
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use boardcache::cache::{metrics, RedisL2Store};
use boardcache::config::{AppConfig, LoggingSettings, RedisSettings};
use boardcache::Services;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Boardcache - forum content backend with a multi-tier cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "BOARDCACHE_CONFIG", default_value = "boardcache.yaml")]
    config: PathBuf,

    /// Max L1 entries per entity type
    #[arg(long, env = "L1_CAPACITY")]
    l1_capacity: Option<usize>,

    /// L2 entry lifetime in seconds
    #[arg(long, env = "L2_TTL_SECS")]
    l2_ttl_secs: Option<u64>,

    /// Redis URL for the shared L2 (in-memory L2 when unset)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Admin server bind address
    #[arg(long, env = "ADMIN_ADDR")]
    admin_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Load the config file and apply flag overrides
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(capacity) = self.l1_capacity {
            config.cache.l1_capacity = capacity;
        }
        if let Some(ttl) = self.l2_ttl_secs {
            config.cache.l2_ttl_secs = ttl;
        }
        if let Some(url) = self.redis_url {
            config.redis = Some(match config.redis.take() {
                Some(existing) => RedisSettings { url, ..existing },
                None => RedisSettings::new(url),
            });
        }
        if let Some(addr) = self.admin_addr {
            config.server.admin_addr = addr;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.log_json {
            config.logging.json = true;
        }

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    init_logging(&config.logging);

    info!("Starting boardcache v{}", env!("CARGO_PKG_VERSION"));
    info!("  L1 capacity: {}", config.cache.l1_capacity);
    info!("  L2 TTL: {}s", config.cache.l2_ttl_secs);
    info!("  L2 op timeout: {}ms", config.cache.l2_timeout_ms);
    info!("  Admin address: {}", config.server.admin_addr);

    let mut builder = Services::builder(config.cache.clone());
    match &config.redis {
        Some(redis) => {
            let store = RedisL2Store::connect(redis)
                .await
                .context("connecting to Redis")?;
            builder = builder.l2_store(Arc::new(store));
        }
        None => warn!("No Redis configured, L2 is process-local"),
    }
    let services = Arc::new(builder.build());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    run_admin_server(&config.server.admin_addr, services, shutdown).await?;

    info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(settings: &LoggingSettings) {
    let level = match settings.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if settings.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Admin Server
// =============================================================================

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn respond_json(value: &serde_json::Value) -> Response<Full<Bytes>> {
    respond(StatusCode::OK, "application/json", value.to_string())
}

async fn admin_handler(
    services: Arc<Services>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => respond(StatusCode::OK, "text/plain", "ok"),
        (&Method::GET, "/metrics") => {
            services.export_metrics();
            respond(
                StatusCode::OK,
                "text/plain; version=0.0.4",
                metrics::render(),
            )
        }
        (&Method::GET, "/api/mgt/cache/stats") => {
            let stats: serde_json::Map<String, serde_json::Value> = services
                .snapshots()
                .into_iter()
                .map(|(entity, snapshot)| {
                    (
                        entity.to_string(),
                        serde_json::to_value(snapshot).unwrap_or_default(),
                    )
                })
                .collect();
            respond_json(&serde_json::Value::Object(stats))
        }
        (&Method::POST, "/api/mgt/cache/flush") => {
            services.flush_all();
            respond_json(&serde_json::json!({
                "flushed": ["thread", "forum", "tag", "user"],
            }))
        }
        (_, "/healthz" | "/metrics" | "/api/mgt/cache/stats" | "/api/mgt/cache/flush") => {
            respond(StatusCode::METHOD_NOT_ALLOWED, "text/plain", "method not allowed")
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    };
    Ok(response)
}

async fn run_admin_server(
    addr: &str,
    services: Arc<Services>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid admin address {}", addr))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind admin server on {}", addr))?;

    info!("Admin server listening on {}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Admin server accept error: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let services = services.clone();
        let connection_token = shutdown.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| admin_handler(services.clone(), req));
            let connection = http1::Builder::new().serve_connection(io, service);
            tokio::pin!(connection);

            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(e) = result {
                        error!(peer = %peer, "Admin connection error: {}", e);
                    }
                }
                _ = connection_token.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    if let Err(e) = connection.await {
                        error!(peer = %peer, "Admin connection error during shutdown: {}", e);
                    }
                }
            }
        });
    }

    info!("Admin server stopped");
    Ok(())
}
