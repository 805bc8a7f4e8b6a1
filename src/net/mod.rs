//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limit)
//!     → connection.rs (open-connection count, idle tracking)
//!     → server.rs (hyper http1 connection driving an engine's service)
//!
//! Stop:
//!     stop accepting → graceful_shutdown per connection → wait until the
//!     tracker reaches zero or the deadline → cancel root token (force close)
//! ```
//!
//! # Design Decisions
//! - Over-limit connections are shed, not queued
//! - One cancellation tree: the root token parents both the stop signal and
//!   every request scope, so a force close reaches handlers too

pub mod connection;
pub mod listener;
pub mod server;

pub use connection::{ConnActivity, ConnectionTracker};
pub use listener::Listener;
pub use server::{serve, DrainOutcome, ServeOptions, ServerHandle};
