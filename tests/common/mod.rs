//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};

use flate2::read::GzDecoder;
use routerkit::config::RouterConfig;
use routerkit::{new_router_adapter, EngineType, RouterAdapter};

/// A started adapter and the base URL it answers on.
pub struct Running {
    pub adapter: Box<dyn RouterAdapter>,
    pub base: String,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Build an adapter for `engine`, let `setup` register routes, then start
/// it on an ephemeral port.
pub async fn start<F>(engine: EngineType, setup: F) -> Running
where
    F: FnOnce(&mut dyn RouterAdapter),
{
    start_with(RouterConfig::for_engine(engine), setup).await
}

pub async fn start_with<F>(config: RouterConfig, setup: F) -> Running
where
    F: FnOnce(&mut dyn RouterAdapter),
{
    let mut adapter = new_router_adapter(&config).expect("adapter");
    setup(adapter.as_mut());
    start_adapter(adapter).await
}

pub async fn start_adapter(mut adapter: Box<dyn RouterAdapter>) -> Running {
    let addr = adapter.start("127.0.0.1:0").await.expect("start");
    Running {
        adapter,
        base: format!("http://{addr}"),
    }
}

/// Client without connection reuse between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("client")
}

pub fn gunzip(data: &[u8]) -> String {
    let mut out = String::new();
    GzDecoder::new(data).read_to_string(&mut out).expect("valid gzip");
    out
}

/// Append-only event log shared between handlers and assertions.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
