//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     AppConfig → engine registry → adapter + global middleware
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller runs the shutdown pipeline
//!
//! Shutdown (shutdown.rs):
//!     Readiness 503 → grace → RouterDrain → PoolDrain(s) → ShutdownReport
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: readiness first, then the router, then the pools
//!   the router's handlers were using
//! - Every step has its own deadline; the pipeline always finishes

pub mod pool;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use pool::{PoolStat, ResourcePool};
pub use shutdown::{
    DrainStep, PoolDrain, RouterDrain, ShutdownCoordinator, ShutdownReport, StepOutcome, StepReport,
};
pub use signals::shutdown_signal;
pub use startup::bootstrap;
