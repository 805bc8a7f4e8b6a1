use std::net::SocketAddr;

/// Engine-specific details behind a [`RouterContext`](super::RouterContext).
#[derive(Debug, Clone)]
pub enum NativeContext {
    Axum(AxumNative),
    Hyper(HyperNative),
    /// Built outside any engine (tests, tooling).
    Detached,
}

#[derive(Debug, Clone)]
pub struct AxumNative {
    /// Route template axum matched, in axum syntax (`/users/{id}`).
    pub matched_path: Option<String>,
    pub remote_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct HyperNative {
    /// Route pattern as registered (`/users/:id`).
    pub pattern: String,
    pub remote_addr: SocketAddr,
}

impl NativeContext {
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        match self {
            NativeContext::Axum(n) => Some(n.remote_addr),
            NativeContext::Hyper(n) => Some(n.remote_addr),
            NativeContext::Detached => None,
        }
    }
}
