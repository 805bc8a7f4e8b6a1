//! Readiness subsystem.
//!
//! # Data Flow
//! ```text
//! GET <health_path>
//!     → readiness.rs (global middleware)
//!     → state.rs: Healthy → 200 {"status":"ok"}
//!                 ShuttingDown → 503 {"status":"shutting down"}
//!
//! Shutdown coordinator
//!     → state.rs mark_shutting_down() before any drain starts
//! ```
//!
//! # Design Decisions
//! - Load balancers see 503 while in-flight requests still drain
//! - The middleware runs ahead of routing so the path needs no route

pub mod readiness;
pub mod state;

pub use readiness::health_check;
pub use state::{HealthCheck, HealthState};
