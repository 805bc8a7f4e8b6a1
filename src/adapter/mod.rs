//! Framework-agnostic router contract.
//!
//! # Data Flow
//! ```text
//! application
//!     → EngineRegistry::create(RouterConfig) → Box<dyn RouterAdapter>
//!     → register_route / register_middleware / register_group / use_native
//!     → start(addr)
//!         engine request → RouterContext
//!             → global middleware → route middleware → handler
//!             → Err / panic → ErrorHandler (once, only if unwritten)
//!         → engine response
//!     → shutdown(timeout) → DrainOutcome
//! ```
//!
//! # Design Decisions
//! - Application code depends only on [`RouterAdapter`], [`RouterContext`]
//!   and [`RouterError`]; engine types appear only through
//!   [`NativeMiddleware`] and [`NativeContext`](crate::context::NativeContext)
//! - Route patterns use `:param` and `*catchall` on every engine
//! - Errors travel as `Result` values; conversion to a response happens in
//!   one place (dispatch)
//!
//! [`RouterContext`]: crate::context::RouterContext
//! [`RouterError`]: crate::error::RouterError

pub(crate) mod dispatch;
mod group;
pub(crate) mod path;
mod registry;
pub(crate) mod table;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::{Method, Response};
use bytes::Bytes;

use crate::config::EngineType;
use crate::error::{RouteError, ServeError};
use crate::middleware::{HandlerFunc, MiddlewareFunc};
use crate::net::DrainOutcome;

pub use dispatch::{DefaultErrorHandler, ErrorHandler};
pub use group::RouterGroup;
pub use registry::{new_router_adapter, register_engine, AdapterConstructor, EngineRegistry};

/// Route registration request.
#[derive(Clone)]
pub struct RouteMeta {
    pub method: Method,
    pub path: String,
    pub handler: HandlerFunc,
    /// Route-level middleware, outermost first. Runs inside the global chain.
    pub middlewares: Vec<MiddlewareFunc>,
    pub description: Option<String>,
}

impl RouteMeta {
    pub fn new(method: Method, path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self {
            method,
            path: path.into(),
            handler,
            middlewares: Vec::new(),
            description: None,
        }
    }

    pub fn get(path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self::new(Method::POST, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self::new(Method::PUT, path, handler)
    }

    pub fn patch(path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self::new(Method::PATCH, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: HandlerFunc) -> Self {
        Self::new(Method::DELETE, path, handler)
    }

    pub fn with_middleware(mut self, middleware: MiddlewareFunc) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for RouteMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMeta")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middlewares", &self.middlewares.len())
            .field("description", &self.description)
            .finish()
    }
}

/// Rewrites the axum router before it starts serving (e.g. adds tower layers).
pub type AxumLayerFn = Box<dyn FnOnce(axum::Router) -> axum::Router + Send + Sync>;

/// Runs on the raw request before routing; returning a response short-circuits.
pub type HyperHookFn = Arc<dyn Fn(&mut Parts) -> Option<Response<Bytes>> + Send + Sync>;

/// Engine-specific middleware, accepted only by the matching engine.
pub enum NativeMiddleware {
    Axum(AxumLayerFn),
    Hyper(HyperHookFn),
}

impl NativeMiddleware {
    /// Apply a tower layer to the whole axum router.
    pub fn axum_layer<L>(layer: L) -> Self
    where
        L: tower::Layer<axum::routing::Route> + Clone + Send + Sync + 'static,
        L::Service: tower::Service<axum::extract::Request> + Clone + Send + Sync + 'static,
        <L::Service as tower::Service<axum::extract::Request>>::Response: axum::response::IntoResponse + 'static,
        <L::Service as tower::Service<axum::extract::Request>>::Error: Into<std::convert::Infallible> + 'static,
        <L::Service as tower::Service<axum::extract::Request>>::Future: Send + 'static,
    {
        NativeMiddleware::Axum(Box::new(move |router| router.layer(layer)))
    }

    pub fn hyper_hook<F>(hook: F) -> Self
    where
        F: Fn(&mut Parts) -> Option<Response<Bytes>> + Send + Sync + 'static,
    {
        NativeMiddleware::Hyper(Arc::new(hook))
    }

    /// Engine this middleware belongs to.
    pub fn engine(&self) -> EngineType {
        match self {
            NativeMiddleware::Axum(_) => EngineType::Axum,
            NativeMiddleware::Hyper(_) => EngineType::Hyper,
        }
    }
}

impl fmt::Debug for NativeMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeMiddleware({})", self.engine())
    }
}

/// Uniform contract over HTTP engines.
///
/// Registration happens before [`start`](Self::start); global middleware
/// and the replaceable handlers may also change while serving and apply to
/// requests that begin afterwards.
#[async_trait]
pub trait RouterAdapter: Send + Sync {
    fn engine(&self) -> EngineType;

    /// Add a route. Duplicates and pattern conflicts fail without changing
    /// the table.
    fn register_route(&mut self, route: RouteMeta) -> Result<(), RouteError>;

    /// Append to the global chain, which runs for every request including
    /// unmatched ones.
    fn register_middleware(&mut self, middleware: MiddlewareFunc);

    /// Routes registered through the group get `prefix` prepended and
    /// `middlewares` run before their own.
    fn register_group(&mut self, prefix: &str, middlewares: Vec<MiddlewareFunc>) -> RouterGroup<'_>;

    fn use_native(&mut self, native: NativeMiddleware) -> Result<(), RouteError>;

    fn set_error_handler(&mut self, handler: Arc<dyn ErrorHandler>);

    fn set_no_route_handler(&mut self, handler: HandlerFunc);

    fn set_no_method_handler(&mut self, handler: HandlerFunc);

    /// Bind `addr` and serve in the background. Returns the bound address,
    /// which differs from `addr` when it asks for port 0.
    async fn start(&mut self, addr: &str) -> Result<SocketAddr, ServeError>;

    /// Stop accepting and drain in-flight requests, force-closing whatever
    /// is still running at `timeout`. A no-op before `start`.
    async fn shutdown(&self, timeout: Duration) -> DrainOutcome;

    fn local_addr(&self) -> Option<SocketAddr>;

    fn active_connections(&self) -> u64;
}

pub(crate) fn ensure_native_engine(engine: EngineType, native: &NativeMiddleware) -> Result<(), RouteError> {
    if native.engine() == engine {
        Ok(())
    } else {
        Err(RouteError::NativeMismatch {
            engine,
            native: native.engine(),
        })
    }
}
