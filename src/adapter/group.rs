use crate::error::RouteError;
use crate::middleware::MiddlewareFunc;

use super::path::join;
use super::{RouteMeta, RouterAdapter};

/// Routes sharing a path prefix and a middleware stack.
///
/// Group middleware runs after the global chain and before the route's own
/// middleware. Nested groups concatenate both prefix and stack.
pub struct RouterGroup<'r> {
    adapter: &'r mut (dyn RouterAdapter + 'static),
    prefix: String,
    middlewares: Vec<MiddlewareFunc>,
}

impl<'r> RouterGroup<'r> {
    pub fn new(
        adapter: &'r mut (dyn RouterAdapter + 'static),
        prefix: &str,
        middlewares: Vec<MiddlewareFunc>,
    ) -> Self {
        Self {
            adapter,
            prefix: join("", prefix),
            middlewares,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append middleware for routes registered through this group from now on.
    pub fn register_middleware(&mut self, middleware: MiddlewareFunc) {
        self.middlewares.push(middleware);
    }

    pub fn register_route(&mut self, mut route: RouteMeta) -> Result<(), RouteError> {
        route.path = join(&self.prefix, &route.path);
        let mut middlewares = self.middlewares.clone();
        middlewares.append(&mut route.middlewares);
        route.middlewares = middlewares;
        self.adapter.register_route(route)
    }

    /// Nested group under this one.
    pub fn group(&mut self, prefix: &str, middlewares: Vec<MiddlewareFunc>) -> RouterGroup<'_> {
        let mut stack = self.middlewares.clone();
        stack.extend(middlewares);
        RouterGroup {
            adapter: &mut *self.adapter,
            prefix: join(&self.prefix, prefix),
            middlewares: stack,
        }
    }
}
