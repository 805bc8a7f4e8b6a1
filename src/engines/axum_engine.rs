//! axum-backed adapter.
//!
//! Each distinct path pattern becomes one axum `any` route whose handler
//! looks the method up in the shared route table, so 405 responses and
//! method registration stay under our control. Unmatched paths reach the
//! no-route handler through the router fallback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::request::Parts;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::service::service_fn;
use tower::ServiceExt;

use super::{EngineCore, RequestHandles};
use crate::adapter::dispatch::{read_body, ErrorHandler};
use crate::adapter::path::RoutePattern;
use crate::adapter::{ensure_native_engine, AxumLayerFn, NativeMiddleware, RouteMeta, RouterAdapter, RouterGroup};
use crate::config::{EngineType, RouterConfig};
use crate::context::{AxumNative, NativeContext};
use crate::error::{RouteError, ServeError};
use crate::middleware::{HandlerFunc, MiddlewareFunc};
use crate::net::{self, ConnActivity, DrainOutcome, Listener, ServeOptions};

pub struct AxumAdapter {
    core: EngineCore,
    router: Router,
    layers: Vec<AxumLayerFn>,
}

impl AxumAdapter {
    /// Build an adapter from a validated config.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            core: EngineCore::new(config),
            router: Router::new(),
            layers: Vec::new(),
        }
    }

    fn handles(&self) -> RequestHandles {
        self.core.request_handles(self.core.config.axum.body_limit)
    }
}

#[async_trait]
impl RouterAdapter for AxumAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Axum
    }

    fn register_route(&mut self, route: RouteMeta) -> Result<(), RouteError> {
        self.core.ensure_not_started()?;
        let RouteMeta {
            method,
            path,
            handler,
            middlewares,
            description,
        } = route;

        let mut table = self.core.table_mut();
        let inserted = table.insert(method.clone(), &path, handler, middlewares)?;
        if !inserted.new_path {
            self.core.log_registered(&method, &path, description.as_deref());
            return Ok(());
        }

        let axum_path = RoutePattern::parse(&path)?.to_axum();
        let handles = self.handles();
        let index = inserted.index;
        let endpoint = any(move |request: Request| {
            let handles = handles.clone();
            async move { serve_path(handles, index, request).await }
        });

        // axum panics on patterns matchit cannot hold; keep the old router if so.
        let candidate = self.router.clone();
        match std::panic::catch_unwind(AssertUnwindSafe(move || candidate.route(&axum_path, endpoint))) {
            Ok(router) => {
                self.router = router;
                self.core.log_registered(&method, &path, description.as_deref());
                Ok(())
            }
            Err(_) => {
                table.rollback(inserted, &method);
                Err(RouteError::Conflict {
                    path,
                    existing: "a route already held by the axum router".to_string(),
                })
            }
        }
    }

    fn register_middleware(&mut self, middleware: MiddlewareFunc) {
        self.core.register_middleware(middleware);
    }

    fn register_group(&mut self, prefix: &str, middlewares: Vec<MiddlewareFunc>) -> RouterGroup<'_> {
        RouterGroup::new(self, prefix, middlewares)
    }

    fn use_native(&mut self, native: NativeMiddleware) -> Result<(), RouteError> {
        ensure_native_engine(EngineType::Axum, &native)?;
        self.core.ensure_not_started()?;
        if let NativeMiddleware::Axum(layer) = native {
            self.layers.push(layer);
        }
        Ok(())
    }

    fn set_error_handler(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.core.set_error_handler(handler);
    }

    fn set_no_route_handler(&mut self, handler: HandlerFunc) {
        self.core.set_no_route_handler(handler);
    }

    fn set_no_method_handler(&mut self, handler: HandlerFunc) {
        self.core.set_no_method_handler(handler);
    }

    async fn start(&mut self, addr: &str) -> Result<SocketAddr, ServeError> {
        if self.core.is_started() {
            return Err(ServeError::AlreadyStarted);
        }
        let listener = Listener::bind(addr, self.core.config.max_connections).await?;
        let local_addr = listener.local_addr();

        let fallback_handles = self.handles();
        let mut router = std::mem::take(&mut self.router).fallback(move |request: Request| {
            let handles = fallback_handles.clone();
            async move { serve_unmatched(handles, request).await }
        });
        for layer in self.layers.drain(..) {
            router = layer(router);
        }

        let make_service = move |remote: SocketAddr, activity: ConnActivity| {
            let router = router.clone();
            service_fn(move |mut request: axum::http::Request<Incoming>| {
                let router = router.clone();
                let in_flight = activity.begin();
                request.extensions_mut().insert(ConnectInfo(remote));
                async move {
                    let response = router.oneshot(request).await;
                    drop(in_flight);
                    response
                }
            })
        };

        let server = net::serve(
            listener,
            make_service,
            ServeOptions::from(&self.core.config),
            self.core.root.clone(),
        );
        self.core.server = Some(server);
        tracing::info!(engine = "axum", address = %local_addr, "router started");
        Ok(local_addr)
    }

    async fn shutdown(&self, timeout: Duration) -> DrainOutcome {
        self.core.shutdown(timeout).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.core.local_addr()
    }

    fn active_connections(&self) -> u64 {
        self.core.active_connections()
    }
}

fn native_context(parts: &Parts) -> NativeContext {
    NativeContext::Axum(AxumNative {
        matched_path: parts
            .extensions
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string()),
        remote_addr: remote_addr(parts),
    })
}

fn remote_addr(parts: &Parts) -> SocketAddr {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)))
}

fn into_axum(response: axum::http::Response<Bytes>) -> Response {
    response.map(Body::from)
}

enum Resolved {
    Endpoint(crate::adapter::table::Endpoint),
    WrongMethod(Vec<axum::http::Method>),
    Missing,
}

async fn serve_path(handles: RequestHandles, index: usize, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let native = native_context(&parts);

    // Params come from the shared matcher so decoding matches the hyper engine.
    let (resolved, params) = match handles.table().entry(index) {
        Some(entry) => {
            let params = entry.pattern.matches(parts.uri.path()).unwrap_or_default();
            let resolved = match entry.methods.get(&parts.method) {
                Some(endpoint) => Resolved::Endpoint(endpoint.clone()),
                None => Resolved::WrongMethod(entry.allowed_methods()),
            };
            (resolved, params)
        }
        None => (Resolved::Missing, HashMap::new()),
    };

    let body = match read_body(body, handles.body_limit, handles.read_timeout).await {
        Ok(body) => body,
        Err(err) => {
            let ctx = handles.context(parts, Bytes::new(), native);
            return into_axum(handles.dispatcher.reject(ctx, err));
        }
    };
    let ctx = handles.context(parts, body, native).with_params(params);

    let response = match resolved {
        Resolved::Endpoint(endpoint) => {
            handles
                .dispatcher
                .dispatch(ctx, &endpoint.middlewares, &endpoint.handler)
                .await
        }
        Resolved::WrongMethod(allowed) => handles.dispatcher.method_not_allowed(ctx, &allowed).await,
        Resolved::Missing => handles.dispatcher.not_found(ctx).await,
    };
    into_axum(response)
}

async fn serve_unmatched(handles: RequestHandles, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let native = native_context(&parts);
    match read_body(body, handles.body_limit, handles.read_timeout).await {
        Ok(body) => {
            let ctx = handles.context(parts, body, native);
            into_axum(handles.dispatcher.not_found(ctx).await)
        }
        Err(err) => {
            let ctx = handles.context(parts, Bytes::new(), native);
            into_axum(handles.dispatcher.reject(ctx, err))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use super::*;
    use crate::middleware::handler_fn;

    fn adapter() -> AxumAdapter {
        AxumAdapter::new(RouterConfig::for_engine(EngineType::Axum))
    }

    fn ok() -> HandlerFunc {
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "ok") }))
    }

    #[test]
    fn rejects_hyper_native_middleware() {
        let mut adapter = adapter();
        let err = adapter
            .use_native(NativeMiddleware::hyper_hook(|_parts| None))
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::NativeMismatch {
                engine: EngineType::Axum,
                native: EngineType::Hyper
            }
        ));
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut adapter = adapter();
        adapter.register_route(RouteMeta::get("/users/:id", ok())).unwrap();
        adapter.register_route(RouteMeta::new(Method::PUT, "/users/:id", ok())).unwrap();
        let err = adapter.register_route(RouteMeta::get("/users/:id", ok())).unwrap_err();
        assert!(matches!(err, RouteError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn routes_are_fixed_after_start() {
        let mut adapter = adapter();
        adapter.start("127.0.0.1:0").await.unwrap();
        assert!(matches!(
            adapter.register_route(RouteMeta::get("/late", ok())),
            Err(RouteError::Started)
        ));
        assert!(matches!(adapter.start("127.0.0.1:0").await, Err(ServeError::AlreadyStarted)));
        assert_eq!(adapter.shutdown(Duration::from_secs(1)).await, DrainOutcome::Drained);
    }
}
