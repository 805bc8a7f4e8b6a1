//! routerkit demo server.
//!
//! ```text
//!   --config <path> ─▶ AppConfig ─▶ bootstrap(engine, global middleware)
//!                                        │
//!                             demo routes registered
//!                                        │
//!                                  adapter.start()
//!                                        │
//!                          SIGINT / SIGTERM received
//!                                        │
//!              ShutdownCoordinator: readiness 503 → grace → RouterDrain
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use clap::Parser;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use routerkit::config::{load_config, validate_config, ConfigError};
use routerkit::lifecycle::{bootstrap, shutdown_signal, RouterDrain};
use routerkit::middleware::{handler_fn, middleware_fn};
use routerkit::observability::{logging, metrics};
use routerkit::{
    AppConfig, EngineType, HealthCheck, NativeMiddleware, RouteMeta, RouterAdapter, RouterError, ShutdownCoordinator,
};

#[derive(Debug, Parser)]
#[command(name = "routerkit", version, about = "Framework-agnostic HTTP router demo")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured engine (axum, hyper).
    #[arg(short, long)]
    engine: Option<EngineType>,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u32>,
}

#[derive(Serialize)]
struct User {
    id: String,
}

fn load(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(engine) = args.engine {
        config.router.engine = engine;
    }
    if let Some(port) = args.port {
        config.router.port = port;
    }
    config.router = validate_config(&config.router).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn register_demo_routes(adapter: &mut dyn RouterAdapter) -> Result<(), routerkit::RouteError> {
    adapter.register_route(
        RouteMeta::get(
            "/users/:id",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let user = User {
                        id: ctx.param("id").to_string(),
                    };
                    ctx.json(StatusCode::OK, &user)
                })
            }),
        )
        .describe("look up a user"),
    )?;

    let api_version = middleware_fn(|ctx, next| {
        Box::pin(async move {
            ctx.response_headers_mut()
                .insert("x-api-version", axum::http::HeaderValue::from_static("1"));
            next.run(ctx).await
        })
    });
    let mut api = adapter.register_group("/api", vec![api_version]);
    api.register_route(RouteMeta::get(
        "/ping",
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })),
    ))?;
    api.register_route(RouteMeta::post(
        "/echo",
        handler_fn(|ctx| {
            Box::pin(async move {
                let value: serde_json::Value = ctx.bind()?;
                ctx.json(StatusCode::OK, &value)
            })
        }),
    ))?;
    api.register_route(RouteMeta::get(
        "/fail",
        handler_fn(|_ctx| Box::pin(async move { Err(RouterError::http(StatusCode::CONFLICT, "demo failure")) })),
    ))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load(&args)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "routerkit starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "failed to install metrics exporter");
                }
            }
            Err(e) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %e,
                    "failed to parse metrics address"
                );
            }
        }
    }

    let health = Arc::new(HealthCheck::new());
    let mut adapter = bootstrap(&config, Arc::clone(&health))?;
    if adapter.engine() == EngineType::Axum {
        adapter.use_native(NativeMiddleware::axum_layer(TraceLayer::new_for_http()))?;
    }
    register_demo_routes(adapter.as_mut())?;

    let local_addr = adapter.start(&config.router.listen_address()).await?;
    tracing::info!(address = %local_addr, engine = %config.router.engine, "listening");

    shutdown_signal().await;

    let adapter: Arc<dyn RouterAdapter> = Arc::from(adapter);
    let report = ShutdownCoordinator::new(health)
        .with_readiness_grace(config.shutdown.readiness_grace())
        .then(RouterDrain::new(adapter, config.shutdown.router_timeout()))
        .run()
        .await;

    tracing::info!(clean = report.is_clean(), steps = report.steps.len(), "shutdown complete");
    Ok(())
}
