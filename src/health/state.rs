//! Readiness state machine.
//!
//! # States
//! - Healthy: the health path answers 200
//! - ShuttingDown: the health path answers 503
//!
//! # State Transitions
//! ```text
//! Healthy → ShuttingDown: mark_shutting_down() (one-way, idempotent)
//! ```
//!
//! # Design Decisions
//! - A single atomic; readers never block
//! - The transition is logged once

use std::sync::atomic::{AtomicU8, Ordering};

use axum::http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthState {
    Healthy = 0,
    ShuttingDown = 1,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "ok",
            HealthState::ShuttingDown => "shutting down",
        }
    }

    /// Status the health endpoint answers with in this state.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthState::Healthy => StatusCode::OK,
            HealthState::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Process readiness shared by the health middleware and the shutdown
/// coordinator.
#[derive(Debug, Default)]
pub struct HealthCheck {
    state: AtomicU8,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HealthState {
        match self.state.load(Ordering::Acquire) {
            0 => HealthState::Healthy,
            _ => HealthState::ShuttingDown,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == HealthState::Healthy
    }

    /// Flip to shutting down. Returns `true` only for the call that made the
    /// transition.
    pub fn mark_shutting_down(&self) -> bool {
        let previous = self
            .state
            .swap(HealthState::ShuttingDown as u8, Ordering::AcqRel);
        let transitioned = previous == HealthState::Healthy as u8;
        if transitioned {
            tracing::info!(
                from = HealthState::Healthy.as_str(),
                to = HealthState::ShuttingDown.as_str(),
                "health state changed"
            );
        }
        transitioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_and_flips_once() {
        let health = HealthCheck::new();
        assert!(health.is_healthy());

        assert!(health.mark_shutting_down());
        assert!(!health.mark_shutting_down());
        assert_eq!(health.state(), HealthState::ShuttingDown);
        assert!(!health.is_healthy());
    }

    #[test]
    fn status_code_follows_state() {
        assert_eq!(HealthState::Healthy.status_code(), StatusCode::OK);
        assert_eq!(HealthState::ShuttingDown.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
