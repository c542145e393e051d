//! Cluster Relocation Controller
//!
//! Exports ClusterConfig relocation data for the image builder and boots
//! the referenced BareMetalHosts from the generated live ISO.
//!
//! ```text
//!  ClusterConfig ──▶ /data/namespaces/<ns>/<name>/files/*.json ──▶ image server
//!        │
//!        └──▶ BareMetalHost.spec.image = <svc>/images/<ns>/<name>.iso
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_relocation_controller::{
    audit_host_references, run_controller, ClusterStoreRef, Context, ControllerConfig,
    ControllerMetrics, Error, KubeStore, Reconciler, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cluster Relocation Controller - ClusterConfig export and BareMetalHost boot images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the Service fronting the image server
    #[arg(long, env = "SERVICE_NAME", default_value = "")]
    service_name: String,

    /// Namespace of the image server Service
    #[arg(long, env = "SERVICE_NAMESPACE", default_value = "")]
    service_namespace: String,

    /// Port of the image server Service
    #[arg(long, env = "SERVICE_PORT")]
    service_port: Option<String>,

    /// URL scheme of the image server (http or https)
    #[arg(long, env = "SERVICE_SCHEME", default_value = "")]
    service_scheme: String,

    /// Root directory for exported data
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    data_dir: PathBuf,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            service_name: self.service_name.clone(),
            service_namespace: self.service_namespace.clone(),
            service_port: self.service_port.clone(),
            service_scheme: self.service_scheme.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = args.controller_config();
    config.validate()?;

    info!("Starting Cluster Relocation Controller");
    info!("  Version: {}", cluster_relocation_controller::VERSION);
    info!("  Image server: {}", config.service_url());
    info!("  Data directory: {}", config.data_dir().display());

    let registry = prometheus::Registry::new();
    let metrics = ControllerMetrics::register(&registry)?;

    let client = kube::Client::try_default().await?;
    let store: ClusterStoreRef = Arc::new(KubeStore::new(client.clone()));

    audit_host_references(&store).await;

    let shutdown = CancellationToken::new();

    let health_addr = args.health_addr.clone();
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_shutdown).await {
            error!("Health server error: {}", e);
        }
    });

    let metrics_addr = args.metrics_addr.clone();
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, registry, metrics_shutdown).await {
            error!("Metrics server error: {}", e);
        }
    });

    let ctx = Arc::new(Context::new(Reconciler::new(store, &config), metrics));
    run_controller(client, ctx).await;

    shutdown.cancel();
    info!("Controller shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        filter = filter.add_directive(directive.parse().map_err(|e| {
            Error::Configuration(format!("Invalid log directive {}: {}", directive, e))
        })?);
    }

    let result = if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, shutdown: CancellationToken) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Health server bind error: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    registry: prometheus::Registry,
    shutdown: CancellationToken,
) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            let encoder = TextEncoder::new();
                            let mut buffer = Vec::new();
                            match encoder.encode(&registry.gather(), &mut buffer) {
                                Ok(()) => {
                                    let mut response = Response::new(Body::from(buffer));
                                    let content_type = encoder
                                        .format_type()
                                        .parse::<hyper::header::HeaderValue>();
                                    if let Ok(value) = content_type {
                                        response
                                            .headers_mut()
                                            .insert(hyper::header::CONTENT_TYPE, value);
                                    }
                                    response
                                }
                                Err(e) => {
                                    error!("Failed to encode metrics: {}", e);
                                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error")
                                }
                            }
                        }
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Metrics server bind error: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
