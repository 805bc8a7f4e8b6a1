//! Continuation-passing middleware chain.
//!
//! The first registered middleware is the outermost: it runs first on the
//! way in and last on the way out. A middleware that returns without
//! calling [`Next::run`] short-circuits everything behind it.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::context::RouterContext;
use crate::error::HandlerResult;

/// Terminal request handler.
pub type HandlerFunc =
    Arc<dyn for<'a> Fn(&'a mut RouterContext) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// Interceptor given the context and the rest of the chain.
pub type MiddlewareFunc =
    Arc<dyn for<'a> Fn(&'a mut RouterContext, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// Wrap a closure as a [`HandlerFunc`].
///
/// ```ignore
/// let hello = handler_fn(|ctx| Box::pin(async move {
///     ctx.text(StatusCode::OK, "hello")
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFunc
where
    F: for<'a> Fn(&'a mut RouterContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`MiddlewareFunc`].
///
/// ```ignore
/// let timing = middleware_fn(|ctx, next| Box::pin(async move {
///     let started = Instant::now();
///     let result = next.run(ctx).await;
///     tracing::debug!(elapsed = ?started.elapsed(), status = %ctx.status());
///     result
/// }));
/// ```
pub fn middleware_fn<F>(f: F) -> MiddlewareFunc
where
    F: for<'a> Fn(&'a mut RouterContext, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// The remainder of a middleware chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [MiddlewareFunc],
    handler: &'a HandlerFunc,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [MiddlewareFunc], handler: &'a HandlerFunc) -> Self {
        Self { chain, handler }
    }

    /// Invoke the rest of the chain.
    pub fn run<'b>(self, ctx: &'b mut RouterContext) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((middleware, rest)) => (**middleware)(
                ctx,
                Next {
                    chain: rest,
                    handler: self.handler,
                },
            ),
            None => (**self.handler)(ctx),
        }
    }

    /// Middlewares still ahead of the handler.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::http::{Request, StatusCode};
    use bytes::Bytes;

    use super::*;

    fn ctx() -> RouterContext {
        RouterContext::from_request(Request::builder().uri("/").body(Bytes::new()).unwrap())
    }

    fn recording(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> MiddlewareFunc {
        middleware_fn(move |ctx, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name}:in"));
                let result = next.run(ctx).await;
                log.lock().unwrap().push(format!("{name}:out"));
                result
            })
        })
    }

    #[tokio::test]
    async fn runs_outer_to_inner_then_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recording("a", log.clone()),
            recording("b", log.clone()),
            recording("c", log.clone()),
        ];
        let handler_log = log.clone();
        let handler = handler_fn(move |ctx| {
            let log = handler_log.clone();
            Box::pin(async move {
                log.lock().unwrap().push("handler".to_string());
                ctx.text(StatusCode::OK, "done")
            })
        });

        let mut c = ctx();
        Next::new(&chain, &handler).run(&mut c).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            ["a:in", "b:in", "c:in", "handler", "c:out", "b:out", "a:out"]
        );
        assert_eq!(c.response_body().as_ref(), b"done");
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let gate = middleware_fn(|ctx, _next| {
            Box::pin(async move { ctx.text(StatusCode::UNAUTHORIZED, "nope") })
        });
        let handler = handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "handler ran") }));

        let chain = vec![gate];
        let mut c = ctx();
        Next::new(&chain, &handler).run(&mut c).await.unwrap();
        assert_eq!(c.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(c.response_body().as_ref(), b"nope");
    }

    #[tokio::test]
    async fn context_usable_after_next() {
        let observe = middleware_fn(|ctx, next| {
            Box::pin(async move {
                let result = next.run(ctx).await;
                ctx.set("seen_status", ctx.status().as_u16());
                result
            })
        });
        let handler = handler_fn(|ctx| Box::pin(async move { ctx.no_content() }));

        let chain = vec![observe];
        let mut c = ctx();
        Next::new(&chain, &handler).run(&mut c).await.unwrap();
        assert_eq!(c.get::<u16>("seen_status"), Some(204));
    }
}
