//! Request dispatch shared by every engine.
//!
//! This is the single place where a chain's `Err` or a panic becomes a
//! response: engines build a [`RouterContext`], pick the endpoint and hand
//! both to the [`Dispatcher`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::header::{HeaderValue, ALLOW};
use axum::http::{Method, Response, StatusCode};
use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::{BodyExt, Limited};
use serde::Serialize;

use crate::context::RouterContext;
use crate::error::{BoxError, RouterError};
use crate::middleware::{handler_fn, HandlerFunc, MiddlewareFunc, Next};

/// Converts a request error into a response.
///
/// Called at most once per request, only when the chain returned an error
/// or panicked, and only while the response is still unwritten.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, ctx: &mut RouterContext, err: RouterError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&mut RouterContext, RouterError) + Send + Sync,
{
    fn handle(&self, ctx: &mut RouterContext, err: RouterError) {
        self(ctx, err)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Writes `{"error": "..."}` with the status from [`RouterError::status_code`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, ctx: &mut RouterContext, err: RouterError) {
        let status = err.status_code();
        let message = match &err {
            // Panic payloads and internal errors stay in the logs.
            RouterError::Panic(_) | RouterError::Handler(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(
                method = %ctx.method(),
                path = %ctx.path(),
                status = status.as_u16(),
                error = %err,
                "request failed"
            );
        } else {
            tracing::debug!(
                method = %ctx.method(),
                path = %ctx.path(),
                status = status.as_u16(),
                error = %err,
                "request rejected"
            );
        }
        if let Err(e) = ctx.json(status, &ErrorBody { error: &message }) {
            tracing::warn!(error = %e, "default error handler could not write response");
        }
    }
}

pub(crate) fn default_no_route() -> HandlerFunc {
    handler_fn(|ctx| Box::pin(async move { ctx.json(StatusCode::NOT_FOUND, &ErrorBody { error: "not found" }) }))
}

pub(crate) fn default_no_method() -> HandlerFunc {
    handler_fn(|ctx| {
        Box::pin(async move {
            ctx.json(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorBody {
                    error: "method not allowed",
                },
            )
        })
    })
}

/// Handlers the application may replace.
#[derive(Clone)]
pub(crate) struct Hooks {
    pub error: Arc<dyn ErrorHandler>,
    pub no_route: HandlerFunc,
    pub no_method: HandlerFunc,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            error: Arc::new(DefaultErrorHandler),
            no_route: default_no_route(),
            no_method: default_no_method(),
        }
    }
}

/// Runs the global chain, the route chain and the handler for one request.
///
/// Global middleware and hooks are loaded per request, so registrations
/// made after the server started still apply.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    global: Arc<ArcSwap<Vec<MiddlewareFunc>>>,
    hooks: Arc<ArcSwap<Hooks>>,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            global: Arc::new(ArcSwap::from_pointee(Vec::new())),
            hooks: Arc::new(ArcSwap::from_pointee(Hooks::default())),
            write_timeout,
        }
    }

    pub fn push_global(&self, middleware: MiddlewareFunc) {
        self.global.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(middleware.clone());
            next
        });
    }

    pub fn update_hooks(&self, update: impl Fn(&mut Hooks)) {
        self.hooks.rcu(|current| {
            let mut next = Hooks::clone(current);
            update(&mut next);
            next
        });
    }

    /// Dispatch to a matched route.
    pub async fn dispatch(
        &self,
        ctx: RouterContext,
        route: &[MiddlewareFunc],
        handler: &HandlerFunc,
    ) -> Response<Bytes> {
        self.run(ctx, route, handler).await
    }

    /// Dispatch to the no-route handler behind the global chain.
    pub async fn not_found(&self, ctx: RouterContext) -> Response<Bytes> {
        let handler = self.hooks.load().no_route.clone();
        self.run(ctx, &[], &handler).await
    }

    /// Dispatch to the no-method handler behind the global chain, with
    /// `Allow` listing the methods the path does accept.
    pub async fn method_not_allowed(&self, mut ctx: RouterContext, allowed: &[Method]) -> Response<Bytes> {
        let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        if let Ok(value) = HeaderValue::try_from(allow) {
            ctx.response_headers_mut().insert(ALLOW, value);
        }
        let handler = self.hooks.load().no_method.clone();
        self.run(ctx, &[], &handler).await
    }

    /// Answer a request that failed before routing (e.g. body too large).
    pub fn reject(&self, mut ctx: RouterContext, err: RouterError) -> Response<Bytes> {
        let hooks = self.hooks.load_full();
        finish_with_error(&hooks, &mut ctx, err);
        ctx.into_response()
    }

    async fn run(&self, mut ctx: RouterContext, route: &[MiddlewareFunc], handler: &HandlerFunc) -> Response<Bytes> {
        let global = self.global.load_full();
        let chain: Vec<MiddlewareFunc> = global.iter().chain(route).cloned().collect();

        let scope = ctx.context().with_timeout(self.write_timeout);
        ctx.set_context(scope.clone());
        // The engine drops this future when the client goes away; the scope
        // and anything the handler spawned on it end with the request.
        let _cancel_on_drop = scope.token().clone().drop_guard();

        let outcome = {
            let run = Next::new(&chain, handler).run(&mut ctx);
            AssertUnwindSafe(scope.run(run)).catch_unwind().await
        };

        let failure = match outcome {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(err))) | Ok(Err(err)) => Some(err),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    panic = %message,
                    "handler panicked"
                );
                Some(RouterError::Panic(message))
            }
        };

        if let Some(err) = failure {
            let hooks = self.hooks.load_full();
            finish_with_error(&hooks, &mut ctx, err);
        }
        ctx.into_response()
    }
}

/// Exactly one response per request: a chain that already wrote keeps its
/// response and the error is only logged.
fn finish_with_error(hooks: &Hooks, ctx: &mut RouterContext, err: RouterError) {
    if ctx.is_written() {
        tracing::warn!(
            method = %ctx.method(),
            path = %ctx.path(),
            error = %err,
            "error after response was written"
        );
        return;
    }

    let handled = std::panic::catch_unwind(AssertUnwindSafe(|| hooks.error.handle(ctx, err)));
    if handled.is_err() {
        tracing::error!("error handler panicked");
    }
    if !ctx.is_written() {
        let _ = ctx.json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorBody {
                error: "internal server error",
            },
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Buffer a request body, bounded in size and time.
pub(crate) async fn read_body<B>(body: B, limit: usize, timeout: Duration) -> Result<Bytes, RouterError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let collected = tokio::time::timeout(timeout, Limited::new(body, limit).collect())
        .await
        .map_err(|_| RouterError::http(StatusCode::REQUEST_TIMEOUT, "timed out reading request body"))?;

    match collected {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() => Err(RouterError::http(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request body too large",
        )),
        Err(e) => Err(RouterError::bad_request(format!("failed to read request body: {e}"))),
    }
}
