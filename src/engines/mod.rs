//! Backend engine adapters.
//!
//! # Data Flow
//! ```text
//! axum_engine.rs:  axum::Router (one `any` route per path, fallback = no-route)
//!                      → method table lookup → Dispatcher
//! hyper_engine.rs: hyper service_fn
//!                      → native hooks → RouteTable::lookup → Dispatcher
//!
//! Both serve through net::serve and share EngineCore below.
//! ```
//!
//! # Design Decisions
//! - Route validation, duplicate and conflict checks are shared, so both
//!   engines accept and reject exactly the same registrations
//! - Routes are fixed once serving starts; global middleware and the
//!   replaceable handlers are not

pub mod axum_engine;
pub mod hyper_engine;

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use axum::http::request::Parts;
use axum::http::Method;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::adapter::dispatch::{Dispatcher, ErrorHandler};
use crate::adapter::table::RouteTable;
use crate::adapter::{EngineRegistry, RouterAdapter};
use crate::config::{EngineType, RouterConfig};
use crate::context::{NativeContext, RequestScope, RouterContext};
use crate::error::{AdapterError, RouteError};
use crate::middleware::{HandlerFunc, MiddlewareFunc};
use crate::net::{DrainOutcome, ServerHandle};

pub use axum_engine::AxumAdapter;
pub use hyper_engine::HyperAdapter;

/// Register every engine shipped with this crate.
pub fn register_builtin(registry: &mut EngineRegistry) {
    registry.register(
        EngineType::Axum,
        Arc::new(|config: RouterConfig| -> Result<Box<dyn RouterAdapter>, AdapterError> {
            Ok(Box::new(AxumAdapter::new(config)))
        }),
    );
    registry.register(
        EngineType::Hyper,
        Arc::new(|config: RouterConfig| -> Result<Box<dyn RouterAdapter>, AdapterError> {
            Ok(Box::new(HyperAdapter::new(config)))
        }),
    );
}

/// State every engine carries.
pub(crate) struct EngineCore {
    pub config: RouterConfig,
    pub table: Arc<RwLock<RouteTable>>,
    pub dispatcher: Dispatcher,
    pub root: CancellationToken,
    pub server: Option<ServerHandle>,
}

impl EngineCore {
    pub fn new(config: RouterConfig) -> Self {
        let dispatcher = Dispatcher::new(config.write_timeout());
        Self {
            config,
            table: Arc::new(RwLock::new(RouteTable::new())),
            dispatcher,
            root: CancellationToken::new(),
            server: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.server.is_some()
    }

    pub fn table_mut(&self) -> RwLockWriteGuard<'_, RouteTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ensure_not_started(&self) -> Result<(), RouteError> {
        if self.is_started() {
            Err(RouteError::Started)
        } else {
            Ok(())
        }
    }

    pub fn log_registered(&self, method: &Method, path: &str, description: Option<&str>) {
        tracing::debug!(
            engine = %self.config.engine,
            method = %method,
            path = %path,
            description = description.unwrap_or(""),
            "route registered"
        );
    }

    pub fn register_middleware(&self, middleware: MiddlewareFunc) {
        self.dispatcher.push_global(middleware);
    }

    pub fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        self.dispatcher.update_hooks(|hooks| hooks.error = Arc::clone(&handler));
    }

    pub fn set_no_route_handler(&self, handler: HandlerFunc) {
        self.dispatcher.update_hooks(|hooks| hooks.no_route = Arc::clone(&handler));
    }

    pub fn set_no_method_handler(&self, handler: HandlerFunc) {
        self.dispatcher.update_hooks(|hooks| hooks.no_method = Arc::clone(&handler));
    }

    pub async fn shutdown(&self, timeout: Duration) -> DrainOutcome {
        match &self.server {
            Some(server) => server.drain(timeout).await,
            None => DrainOutcome::Drained,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    pub fn active_connections(&self) -> u64 {
        self.server.as_ref().map_or(0, ServerHandle::active_connections)
    }

    pub fn request_handles(&self, body_limit: usize) -> RequestHandles {
        RequestHandles {
            table: Arc::clone(&self.table),
            dispatcher: self.dispatcher.clone(),
            root: self.root.clone(),
            body_limit,
            read_timeout: self.config.read_timeout(),
        }
    }
}

/// What a request task needs from its engine.
#[derive(Clone)]
pub(crate) struct RequestHandles {
    pub table: Arc<RwLock<RouteTable>>,
    pub dispatcher: Dispatcher,
    pub root: CancellationToken,
    pub body_limit: usize,
    pub read_timeout: Duration,
}

impl RequestHandles {
    pub fn table(&self) -> RwLockReadGuard<'_, RouteTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh context whose scope hangs off the engine's root token.
    pub fn context(&self, parts: Parts, body: Bytes, native: NativeContext) -> RouterContext {
        RouterContext::new(parts, body, RequestScope::child_of(&self.root), native)
    }
}
