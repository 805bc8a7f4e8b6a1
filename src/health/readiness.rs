//! Health endpoint middleware.

use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;

use super::state::HealthCheck;
use crate::middleware::{middleware_fn, MiddlewareFunc};

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

/// Answer `GET path` from `health` and pass everything else through.
///
/// Without a `HealthCheck` the endpoint always reports healthy.
pub fn health_check(path: impl Into<String>, health: Option<Arc<HealthCheck>>) -> MiddlewareFunc {
    let path: Arc<str> = Arc::from(path.into());
    let health = health.unwrap_or_default();

    middleware_fn(move |ctx, next| {
        let path = Arc::clone(&path);
        let health = Arc::clone(&health);
        Box::pin(async move {
            if ctx.method() != Method::GET || ctx.path() != &*path {
                return next.run(ctx).await;
            }
            // One load: status code and body must agree.
            let state = health.state();
            ctx.json(state.status_code(), &HealthBody { status: state.as_str() })
        })
    })
}
