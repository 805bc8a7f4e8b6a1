//! HTTP/1 serve loop shared by every engine.
//!
//! Engines hand in a per-connection service factory; this module owns the
//! accept loop, connection limits, timeouts and the two-phase stop
//! (graceful drain, then force close).

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{RouterConfig, MIN_MAX_HEADER_BYTES};
use crate::error::BoxError;

use super::connection::{ConnActivity, ConnectionGuard, ConnectionTracker};
use super::listener::{ConnectionPermit, Listener};

/// How long force-closed connections get to unwind before shutdown returns.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Result of stopping a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight request finished inside the deadline.
    Drained,
    /// The deadline passed; `remaining` connections were closed forcibly.
    ForceClosed { remaining: u64 },
}

/// Per-connection protocol settings.
#[derive(Debug, Clone, Copy)]
pub struct ServeOptions {
    pub keep_alive: bool,
    pub half_close: bool,
    pub max_buf_size: usize,
    pub header_read_timeout: Duration,
    pub idle_timeout: Duration,
}

impl From<&RouterConfig> for ServeOptions {
    fn from(config: &RouterConfig) -> Self {
        Self {
            keep_alive: true,
            half_close: false,
            max_buf_size: config.max_header_bytes.max(MIN_MAX_HEADER_BYTES),
            header_read_timeout: config.read_header_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Handle to a running serve loop.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: CancellationToken,
    root: CancellationToken,
    tracker: ConnectionTracker,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Stop accepting, let in-flight requests finish until `timeout`, then
    /// force-close whatever is left.
    pub async fn drain(&self, timeout: Duration) -> DrainOutcome {
        self.stop.cancel();
        let accept_task = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = accept_task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "accept loop terminated abnormally");
            }
        }

        let outcome = match tokio::time::timeout(timeout, self.tracker.wait_idle()).await {
            Ok(()) => DrainOutcome::Drained,
            Err(_) => {
                let remaining = self.tracker.active_count();
                tracing::warn!(
                    remaining,
                    timeout_ms = timeout.as_millis() as u64,
                    "drain deadline passed, force-closing connections"
                );
                self.root.cancel();
                let _ = tokio::time::timeout(FORCE_CLOSE_GRACE, self.tracker.wait_idle()).await;
                DrainOutcome::ForceClosed { remaining }
            }
        };
        // Work spawned from handlers observes the same signal.
        self.root.cancel();
        tracing::info!(address = %self.local_addr, ?outcome, "server stopped");
        outcome
    }
}

/// Start accepting on `listener`.
///
/// `make_service` builds the service for one connection. Cancelling `root`
/// force-closes every connection.
pub fn serve<M, S, B>(
    listener: Listener,
    make_service: M,
    options: ServeOptions,
    root: CancellationToken,
) -> ServerHandle
where
    M: Fn(SocketAddr, ConnActivity) -> S + Send + 'static,
    S: hyper::service::Service<Request<Incoming>, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    let local_addr = listener.local_addr();
    let stop = root.child_token();
    let tracker = ConnectionTracker::new();

    let accept_task = {
        let stop = stop.clone();
        let root = root.clone();
        let tracker = tracker.clone();
        tokio::spawn(async move {
            loop {
                let (stream, remote, permit) = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                let _ = stream.set_nodelay(true);
                let guard = tracker.track();
                let activity = ConnActivity::new();
                let service = make_service(remote, activity.clone());
                tokio::spawn(serve_connection(
                    stream,
                    remote,
                    service,
                    options,
                    Lifecycle {
                        activity,
                        stop: stop.clone(),
                        root: root.clone(),
                        _guard: guard,
                        _permit: permit,
                    },
                ));
            }
            tracing::info!(address = %local_addr, "listener closed");
        })
    };

    ServerHandle {
        local_addr,
        stop,
        root,
        tracker,
        accept_task: Mutex::new(Some(accept_task)),
    }
}

/// Everything a connection task holds until it ends.
struct Lifecycle {
    activity: ConnActivity,
    stop: CancellationToken,
    root: CancellationToken,
    _guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

async fn serve_connection<S, B>(
    stream: TcpStream,
    remote: SocketAddr,
    service: S,
    options: ServeOptions,
    lifecycle: Lifecycle,
) where
    S: hyper::service::Service<Request<Incoming>, Response = Response<B>>,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    let connection_id = lifecycle._guard.id();
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .keep_alive(options.keep_alive)
        .half_close(options.half_close)
        .max_buf_size(options.max_buf_size)
        .header_read_timeout(options.header_read_timeout);

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);
    let idle = lifecycle.activity.idle_for(options.idle_timeout);
    tokio::pin!(idle);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(%connection_id, peer_addr = %remote, error = %e, "connection error");
            }
            return;
        }
        _ = lifecycle.root.cancelled() => return,
        _ = lifecycle.stop.cancelled() => {}
        _ = &mut idle => {
            tracing::debug!(%connection_id, peer_addr = %remote, "closing idle connection");
        }
    }

    conn.as_mut().graceful_shutdown();
    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(%connection_id, error = %e, "connection error while draining");
            }
        }
        _ = lifecycle.root.cancelled() => {
            tracing::debug!(%connection_id, peer_addr = %remote, "connection force-closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::service::service_fn;

    use super::*;

    fn options() -> ServeOptions {
        ServeOptions {
            keep_alive: true,
            half_close: false,
            max_buf_size: 8192,
            header_read_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }

    async fn start(delay: Duration) -> ServerHandle {
        let listener = Listener::bind("127.0.0.1:0", 16).await.unwrap();
        serve(
            listener,
            move |_remote, activity: ConnActivity| {
                service_fn(move |_req: Request<Incoming>| {
                    let guard = activity.begin();
                    async move {
                        tokio::time::sleep(delay).await;
                        drop(guard);
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"ok"))))
                    }
                })
            },
            options(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn drains_idle_server() {
        let handle = start(Duration::ZERO).await;
        let body = reqwest::get(format!("http://{}/", handle.local_addr()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        let outcome = handle.drain(Duration::from_secs(2)).await;
        assert_eq!(outcome, DrainOutcome::Drained);
        assert!(reqwest::get(format!("http://{}/", handle.local_addr())).await.is_err());
    }

    #[tokio::test]
    async fn force_closes_after_deadline() {
        let handle = start(Duration::from_secs(30)).await;
        let url = format!("http://{}/", handle.local_addr());
        let request = tokio::spawn(async move { reqwest::get(url).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.active_connections(), 1);

        let started = std::time::Instant::now();
        let outcome = handle.drain(Duration::from_millis(200)).await;
        assert_eq!(outcome, DrainOutcome::ForceClosed { remaining: 1 });
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(request.await.unwrap().is_err());
    }
}
