//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the configured engine through the registry
//! - Install the standard global middleware in a fixed order
//!
//! # Design Decisions
//! - Fail fast: an unknown engine or invalid router config is fatal
//! - Binding happens later in `RouterAdapter::start`, after the caller has
//!   registered its routes

use std::sync::Arc;

use crate::adapter::{new_router_adapter, RouterAdapter};
use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::health::{health_check, HealthCheck};
use crate::middleware::{compression, logger, request_id};

/// Create the adapter for `config` with request ID, logging, readiness and
/// (when enabled) compression installed as global middleware.
pub fn bootstrap(config: &AppConfig, health: Arc<HealthCheck>) -> Result<Box<dyn RouterAdapter>, AdapterError> {
    let mut adapter = new_router_adapter(&config.router)?;

    adapter.register_middleware(request_id());
    adapter.register_middleware(logger());
    adapter.register_middleware(health_check(config.router.health_path.clone(), Some(health)));
    if config.compression.enabled {
        adapter.register_middleware(compression(&config.compression));
    }

    tracing::info!(
        engine = %adapter.engine(),
        health_path = %config.router.health_path,
        compression = config.compression.enabled,
        "router bootstrapped"
    );
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{EngineType, RouterConfig};
    use crate::net::DrainOutcome;

    #[tokio::test]
    async fn bootstrapped_router_answers_health() {
        for engine in EngineType::ALL {
            let config = AppConfig {
                router: RouterConfig::for_engine(engine),
                ..AppConfig::default()
            };
            let health = Arc::new(HealthCheck::new());
            let mut adapter = bootstrap(&config, Arc::clone(&health)).unwrap();
            assert_eq!(adapter.engine(), engine);

            let addr = adapter.start("127.0.0.1:0").await.unwrap();
            let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
            assert_eq!(response.status(), 200, "{engine}");
            assert!(response.headers().contains_key("x-request-id"));

            health.mark_shutting_down();
            let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
            assert_eq!(response.status(), 503, "{engine}");

            assert_eq!(adapter.shutdown(Duration::from_secs(2)).await, DrainOutcome::Drained);
        }
    }

    #[test]
    fn invalid_router_config_is_fatal() {
        let config = AppConfig {
            router: RouterConfig {
                port: 0,
                ..RouterConfig::default()
            },
            ..AppConfig::default()
        };
        let err = bootstrap(&config, Arc::new(HealthCheck::new())).err().expect("port 0 rejected");
        assert!(matches!(err, AdapterError::Config(_)));
    }
}
