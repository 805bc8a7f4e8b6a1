//! Middleware subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → request_id.rs (X-Request-ID, propagated into request data)
//!     → logger.rs (one structured event + metrics per request)
//!     → health::readiness (answers the health path)
//!     → compression.rs (gzip on the way out)
//!     → group / route middleware
//!     → handler
//! ```
//!
//! The order above is what [`lifecycle::startup`](crate::lifecycle::startup)
//! installs; each piece is an ordinary [`MiddlewareFunc`] and can be
//! registered independently.

pub mod chain;
pub mod compression;
pub mod logger;
pub mod request_id;

pub use chain::{handler_fn, middleware_fn, HandlerFunc, MiddlewareFunc, Next};
pub use compression::{compression, EncoderPools};
pub use logger::logger;
pub use request_id::{request_id, REQUEST_ID_HEADER, REQUEST_ID_KEY};
