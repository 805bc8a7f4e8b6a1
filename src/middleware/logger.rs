//! Access logging.
//!
//! Emits one tracing event per request and records request metrics. An
//! `Err` coming back up the chain is logged with the status the error
//! handler will answer with.

use std::time::Instant;

use super::request_id::REQUEST_ID_KEY;
use super::{middleware_fn, MiddlewareFunc};
use crate::observability::metrics;

pub fn logger() -> MiddlewareFunc {
    middleware_fn(|ctx, next| {
        Box::pin(async move {
            let started = Instant::now();
            let result = next.run(ctx).await;

            let status = match &result {
                Ok(()) => ctx.status(),
                Err(err) if !ctx.is_written() => err.status_code(),
                Err(_) => ctx.status(),
            };
            let request_id: String = ctx.get(REQUEST_ID_KEY).unwrap_or_default();
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            if status.is_server_error() {
                tracing::warn!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    status = status.as_u16(),
                    latency_ms,
                    request_id = %request_id,
                    "request completed"
                );
            } else {
                tracing::info!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    status = status.as_u16(),
                    latency_ms,
                    request_id = %request_id,
                    "request completed"
                );
            }
            metrics::record_request(ctx.method().as_str(), status.as_u16(), started);
            result
        })
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;

    use super::*;
    use crate::context::RouterContext;
    use crate::error::RouterError;
    use crate::middleware::{handler_fn, Next};

    #[tokio::test]
    async fn passes_results_through() {
        let chain = vec![logger()];
        let ok = handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::ACCEPTED, "ok") }));
        let failing = handler_fn(|_ctx| Box::pin(async move { Err(RouterError::bad_request("no")) }));

        let mut ctx = RouterContext::from_request(Request::builder().uri("/").body(Bytes::new()).unwrap());
        Next::new(&chain, &ok).run(&mut ctx).await.unwrap();
        assert_eq!(ctx.status(), StatusCode::ACCEPTED);

        let mut ctx = RouterContext::from_request(Request::builder().uri("/").body(Bytes::new()).unwrap());
        let err = Next::new(&chain, &failing).run(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
