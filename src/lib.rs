//! Framework-agnostic HTTP router.
//!
//! Application code registers routes, groups and middleware against the
//! [`RouterAdapter`] trait and picks a backend engine (axum or bare hyper)
//! from configuration. Handlers see one [`RouterContext`] type whatever the
//! engine.

pub mod adapter;
pub mod config;
pub mod context;
pub mod engines;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod middleware;
pub mod net;
pub mod observability;

pub use adapter::{new_router_adapter, register_engine, NativeMiddleware, RouteMeta, RouterAdapter, RouterGroup};
pub use config::{AppConfig, EngineType, RouterConfig};
pub use context::RouterContext;
pub use error::{AdapterError, HandlerResult, RouteError, RouterError, ServeError};
pub use health::HealthCheck;
pub use lifecycle::{ShutdownCoordinator, ShutdownReport};
pub use middleware::{handler_fn, middleware_fn, HandlerFunc, MiddlewareFunc, Next};
pub use net::DrainOutcome;
