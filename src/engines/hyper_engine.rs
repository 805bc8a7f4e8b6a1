//! Bare hyper adapter.
//!
//! No framework router: requests go through the native hooks, then the
//! shared route table matcher, then the dispatcher.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Request, Response};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;

use super::{EngineCore, RequestHandles};
use crate::adapter::dispatch::{read_body, ErrorHandler};
use crate::adapter::table::Lookup;
use crate::adapter::{ensure_native_engine, HyperHookFn, NativeMiddleware, RouteMeta, RouterAdapter, RouterGroup};
use crate::config::{EngineType, RouterConfig};
use crate::context::{HyperNative, NativeContext};
use crate::error::{RouteError, ServeError};
use crate::middleware::{HandlerFunc, MiddlewareFunc};
use crate::net::{self, ConnActivity, DrainOutcome, Listener, ServeOptions};

pub struct HyperAdapter {
    core: EngineCore,
    hooks: Vec<HyperHookFn>,
}

impl HyperAdapter {
    /// Build an adapter from a validated config.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            core: EngineCore::new(config),
            hooks: Vec::new(),
        }
    }

    fn serve_options(&self) -> ServeOptions {
        let hyper = &self.core.config.hyper;
        ServeOptions {
            keep_alive: hyper.keep_alive,
            half_close: hyper.half_close,
            ..ServeOptions::from(&self.core.config)
        }
    }
}

#[async_trait]
impl RouterAdapter for HyperAdapter {
    fn engine(&self) -> EngineType {
        EngineType::Hyper
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
        self.core
            .table_mut()
            .insert(method.clone(), &path, handler, middlewares)?;
        self.core.log_registered(&method, &path, description.as_deref());
        Ok(())
    }

    fn register_middleware(&mut self, middleware: MiddlewareFunc) {
        self.core.register_middleware(middleware);
    }

    fn register_group(&mut self, prefix: &str, middlewares: Vec<MiddlewareFunc>) -> RouterGroup<'_> {
        RouterGroup::new(self, prefix, middlewares)
    }

    fn use_native(&mut self, native: NativeMiddleware) -> Result<(), RouteError> {
        ensure_native_engine(EngineType::Hyper, &native)?;
        self.core.ensure_not_started()?;
        if let NativeMiddleware::Hyper(hook) = native {
            self.hooks.push(hook);
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

        let handles = self.core.request_handles(self.core.config.hyper.body_limit);
        let hooks: Arc<[HyperHookFn]> = std::mem::take(&mut self.hooks).into();

        let make_service = move |remote: SocketAddr, activity: ConnActivity| {
            let handles = handles.clone();
            let hooks = Arc::clone(&hooks);
            service_fn(move |request: Request<Incoming>| {
                let handles = handles.clone();
                let hooks = Arc::clone(&hooks);
                let in_flight = activity.begin();
                async move {
                    let response = handle(handles, &hooks, remote, request).await;
                    drop(in_flight);
                    Ok::<_, Infallible>(response.map(Full::new))
                }
            })
        };

        let server = net::serve(listener, make_service, self.serve_options(), self.core.root.clone());
        self.core.server = Some(server);
        tracing::info!(engine = "hyper", address = %local_addr, "router started");
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

async fn handle(
    handles: RequestHandles,
    hooks: &[HyperHookFn],
    remote: SocketAddr,
    request: Request<Incoming>,
) -> Response<Bytes> {
    let (mut parts, body) = request.into_parts();
    for hook in hooks {
        if let Some(response) = hook(&mut parts) {
            return response;
        }
    }

    let lookup = handles.table().lookup(&parts.method, parts.uri.path());
    let pattern = match &lookup {
        Lookup::Found { endpoint, .. } => endpoint.pattern.to_string(),
        _ => String::new(),
    };
    let native = NativeContext::Hyper(HyperNative {
        pattern,
        remote_addr: remote,
    });

    let body = match read_body(body, handles.body_limit, handles.read_timeout).await {
        Ok(body) => body,
        Err(err) => {
            let ctx = handles.context(parts, Bytes::new(), native);
            return handles.dispatcher.reject(ctx, err);
        }
    };

    match lookup {
        Lookup::Found { endpoint, params } => {
            let ctx = handles.context(parts, body, native).with_params(params);
            handles
                .dispatcher
                .dispatch(ctx, &endpoint.middlewares, &endpoint.handler)
                .await
        }
        Lookup::MethodNotAllowed(allowed) => {
            let ctx = handles.context(parts, body, native);
            handles.dispatcher.method_not_allowed(ctx, &allowed).await
        }
        Lookup::NotFound => {
            let ctx = handles.context(parts, body, native);
            handles.dispatcher.not_found(ctx).await
        }
    }
}
