//! Ordered shutdown pipeline.
//!
//! # Data Flow
//! ```text
//! ShutdownCoordinator::run()
//!     → HealthCheck::mark_shutting_down()     (probes start seeing 503)
//!     → readiness grace sleep                 (optional)
//!     → step 1 drain()  e.g. RouterDrain      (bounded by its own deadline)
//!     → step 2 drain()  e.g. PoolDrain
//!     → ShutdownReport
//! ```
//!
//! # Design Decisions
//! - Steps run strictly in registration order, one at a time
//! - A failing or panicking step is logged and reported; later steps still run
//! - Each step owns its deadline, so the whole sequence is bounded

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;

use super::pool::ResourcePool;
use crate::adapter::dispatch::panic_message;
use crate::adapter::RouterAdapter;
use crate::health::HealthCheck;
use crate::net::DrainOutcome;
use crate::observability::metrics;

/// How one drain step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Drained,
    /// The deadline passed with `remaining` units still busy; the step
    /// released them forcibly.
    ForcedAfterTimeout { remaining: u64 },
    Failed(String),
}

impl StepOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Drained => "drained",
            StepOutcome::ForcedAfterTimeout { .. } => "forced",
            StepOutcome::Failed(_) => "failed",
        }
    }
}

/// One stage of the shutdown pipeline.
#[async_trait]
pub trait DrainStep: Send + Sync {
    fn name(&self) -> &str;

    /// Run the step to completion. Must return within the step's deadline.
    async fn drain(&self) -> StepOutcome;
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub steps: Vec<StepReport>,
    pub total: Duration,
}

impl ShutdownReport {
    /// True when every step drained without forcing or failing.
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.outcome == StepOutcome::Drained)
    }
}

pub struct ShutdownCoordinator {
    health: Arc<HealthCheck>,
    readiness_grace: Duration,
    steps: Vec<Box<dyn DrainStep>>,
}

impl ShutdownCoordinator {
    pub fn new(health: Arc<HealthCheck>) -> Self {
        Self {
            health,
            readiness_grace: Duration::ZERO,
            steps: Vec::new(),
        }
    }

    /// Pause between flipping readiness and the first step.
    pub fn with_readiness_grace(mut self, grace: Duration) -> Self {
        self.readiness_grace = grace;
        self
    }

    /// Append a step; steps run in the order they were added.
    pub fn then(mut self, step: impl DrainStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub async fn run(self) -> ShutdownReport {
        let started = Instant::now();
        self.health.mark_shutting_down();
        if !self.readiness_grace.is_zero() {
            tracing::info!(
                grace_ms = self.readiness_grace.as_millis() as u64,
                "waiting for readiness probes to observe shutdown"
            );
            tokio::time::sleep(self.readiness_grace).await;
        }

        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let name = step.name().to_string();
            let step_started = Instant::now();
            tracing::info!(step = %name, "shutdown step starting");

            let outcome = match AssertUnwindSafe(step.drain()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => StepOutcome::Failed(format!("panicked: {}", panic_message(&*panic))),
            };
            let elapsed = step_started.elapsed();
            match &outcome {
                StepOutcome::Drained => {
                    tracing::info!(step = %name, elapsed_ms = elapsed.as_millis() as u64, "shutdown step drained");
                }
                StepOutcome::ForcedAfterTimeout { remaining } => {
                    tracing::warn!(
                        step = %name,
                        remaining,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "shutdown step forced after timeout"
                    );
                }
                StepOutcome::Failed(error) => {
                    tracing::error!(step = %name, error = %error, "shutdown step failed");
                }
            }
            metrics::record_shutdown_step(&name, outcome.as_str());
            steps.push(StepReport {
                name,
                outcome,
                elapsed,
            });
        }

        let report = ShutdownReport {
            steps,
            total: started.elapsed(),
        };
        tracing::info!(
            total_ms = report.total.as_millis() as u64,
            clean = report.is_clean(),
            "shutdown complete"
        );
        report
    }
}

/// Stop the router: no new connections, in-flight requests get `timeout`.
pub struct RouterDrain {
    adapter: Arc<dyn RouterAdapter>,
    timeout: Duration,
}

impl RouterDrain {
    pub fn new(adapter: Arc<dyn RouterAdapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }
}

#[async_trait]
impl DrainStep for RouterDrain {
    fn name(&self) -> &str {
        "router"
    }

    async fn drain(&self) -> StepOutcome {
        match self.adapter.shutdown(self.timeout).await {
            DrainOutcome::Drained => StepOutcome::Drained,
            DrainOutcome::ForceClosed { remaining } => StepOutcome::ForcedAfterTimeout { remaining },
        }
    }
}

/// Wait for a resource pool to go idle, then close it.
///
/// The ping and the idle wait share one deadline; `close` has its own.
pub struct PoolDrain<P> {
    name: String,
    pool: Arc<P>,
    timeout: Duration,
    close_timeout: Duration,
    poll_interval: Duration,
}

impl<P: ResourcePool> PoolDrain<P> {
    pub fn new(name: impl Into<String>, pool: Arc<P>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            pool,
            timeout,
            close_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Poll until nothing is in use; returns what is still busy at the deadline.
    async fn wait_idle(&self, deadline: tokio::time::Instant) -> u64 {
        loop {
            let in_use = self.pool.stat().in_use;
            if in_use == 0 {
                return 0;
            }
            if tokio::time::Instant::now() >= deadline {
                return in_use;
            }
            tokio::time::sleep_until(deadline.min(tokio::time::Instant::now() + self.poll_interval)).await;
        }
    }

    async fn settle(&self) -> StepOutcome {
        let deadline = tokio::time::Instant::now() + self.timeout;
        match tokio::time::timeout_at(deadline, self.pool.ping()).await {
            Ok(Ok(())) => match self.wait_idle(deadline).await {
                0 => StepOutcome::Drained,
                remaining => StepOutcome::ForcedAfterTimeout { remaining },
            },
            Ok(Err(e)) => {
                let in_use = self.pool.stat().in_use;
                tracing::warn!(pool = %self.name, error = %e, in_use, "pool ping failed, closing without waiting");
                StepOutcome::Failed(format!("ping failed with {in_use} in use: {e}"))
            }
            Err(_) => {
                let in_use = self.pool.stat().in_use;
                tracing::warn!(
                    pool = %self.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    in_use,
                    "pool ping did not answer before the deadline"
                );
                StepOutcome::Failed(format!(
                    "ping timed out after {}ms with {in_use} in use",
                    self.timeout.as_millis()
                ))
            }
        }
    }
}

#[async_trait]
impl<P: ResourcePool + 'static> DrainStep for PoolDrain<P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn drain(&self) -> StepOutcome {
        let outcome = self.settle().await;
        match tokio::time::timeout(self.close_timeout, self.pool.close()).await {
            Ok(Ok(())) => outcome,
            Ok(Err(e)) => StepOutcome::Failed(format!("close failed: {e}")),
            Err(_) => StepOutcome::Failed(format!(
                "close timed out after {}ms",
                self.close_timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::error::BoxError;
    use crate::health::HealthState;
    use crate::lifecycle::pool::PoolStat;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        health: Arc<HealthCheck>,
        outcome: StepOutcome,
    }

    #[async_trait]
    impl DrainStep for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn drain(&self) -> StepOutcome {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let state = self.health.state().as_str();
            self.log.lock().unwrap().push(format!("{}:{}", self.name, state));
            self.outcome.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl DrainStep for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn drain(&self) -> StepOutcome {
            panic!("step blew up")
        }
    }

    #[tokio::test]
    async fn steps_run_in_order_after_readiness_flips() {
        let health = Arc::new(HealthCheck::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |name, outcome| Recording {
            name,
            log: Arc::clone(&log),
            health: Arc::clone(&health),
            outcome,
        };

        let report = ShutdownCoordinator::new(Arc::clone(&health))
            .then(step("first", StepOutcome::Failed("nope".into())))
            .then(Panicking)
            .then(step("last", StepOutcome::Drained))
            .run()
            .await;

        assert_eq!(health.state(), HealthState::ShuttingDown);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:shutting down".to_string(), "last:shutting down".to_string()]
        );
        let names: Vec<_> = report.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["first", "panicking", "last"]);
        assert!(matches!(&report.steps[1].outcome, StepOutcome::Failed(msg) if msg.contains("step blew up")));
        assert_eq!(report.steps[2].outcome, StepOutcome::Drained);
        assert!(!report.is_clean());
    }

    #[derive(Default)]
    struct FakePool {
        in_use: AtomicU64,
        ping_fails: AtomicBool,
        ping_hangs: AtomicBool,
        close_hangs: AtomicBool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl ResourcePool for FakePool {
        async fn ping(&self) -> Result<(), BoxError> {
            if self.ping_hangs.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.ping_fails.load(Ordering::SeqCst) {
                return Err("connection refused".into());
            }
            Ok(())
        }

        fn stat(&self) -> PoolStat {
            let in_use = self.in_use.load(Ordering::SeqCst);
            PoolStat {
                open: in_use + 1,
                in_use,
                idle: 1,
            }
        }

        async fn close(&self) -> Result<(), BoxError> {
            if self.close_hangs.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pool_drain_waits_for_in_use_to_reach_zero() {
        let pool = Arc::new(FakePool::default());
        pool.in_use.store(2, Ordering::SeqCst);
        let releaser = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                pool.in_use.store(0, Ordering::SeqCst);
            })
        };

        let step = PoolDrain::new("db", Arc::clone(&pool), Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(100));
        assert_eq!(step.drain().await, StepOutcome::Drained);
        assert!(pool.closed.load(Ordering::SeqCst));
        releaser.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pool_drain_forces_after_deadline() {
        let pool = Arc::new(FakePool::default());
        pool.in_use.store(3, Ordering::SeqCst);
        let step = PoolDrain::new("db", Arc::clone(&pool), Duration::from_millis(500));

        let started = tokio::time::Instant::now();
        assert_eq!(step.drain().await, StepOutcome::ForcedAfterTimeout { remaining: 3 });
        assert!(started.elapsed() <= Duration::from_millis(600));
        assert!(pool.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_ping_closes_immediately_and_reports_failure() {
        let pool = Arc::new(FakePool::default());
        pool.in_use.store(1, Ordering::SeqCst);
        pool.ping_fails.store(true, Ordering::SeqCst);
        let step = PoolDrain::new("cache", Arc::clone(&pool), Duration::from_secs(30));

        let started = Instant::now();
        let outcome = step.drain().await;
        assert!(matches!(&outcome, StepOutcome::Failed(msg) if msg.contains("connection refused")));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(pool.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_ping_is_bounded_by_the_step_timeout() {
        let pool = Arc::new(FakePool::default());
        pool.in_use.store(2, Ordering::SeqCst);
        pool.ping_hangs.store(true, Ordering::SeqCst);
        let step = PoolDrain::new("db", Arc::clone(&pool), Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let outcome = step.drain().await;
        assert!(matches!(&outcome, StepOutcome::Failed(msg) if msg.contains("ping timed out")));
        assert!(started.elapsed() <= Duration::from_millis(200));
        assert!(pool.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_close_does_not_block_the_pipeline() {
        let pool = Arc::new(FakePool::default());
        pool.close_hangs.store(true, Ordering::SeqCst);
        let health = Arc::new(HealthCheck::new());

        let report = ShutdownCoordinator::new(health)
            .then(
                PoolDrain::new("db", Arc::clone(&pool), Duration::from_millis(100))
                    .with_close_timeout(Duration::from_millis(250)),
            )
            .run()
            .await;

        assert!(matches!(&report.steps[0].outcome, StepOutcome::Failed(msg) if msg.contains("close timed out")));
        assert!(report.total <= Duration::from_millis(400));
        assert!(!pool.closed.load(Ordering::SeqCst));
    }
}
