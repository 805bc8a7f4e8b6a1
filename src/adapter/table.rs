//! Registered routes, shared by both engines.
//!
//! Duplicate and conflict checks live here so every engine rejects the same
//! registrations with the same errors.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use super::path::RoutePattern;
use crate::error::RouteError;
use crate::middleware::{HandlerFunc, MiddlewareFunc};

/// A registered handler with its route-level middleware.
#[derive(Clone)]
pub(crate) struct Endpoint {
    pub handler: HandlerFunc,
    pub middlewares: Arc<[MiddlewareFunc]>,
    pub pattern: Arc<str>,
}

pub(crate) struct PathEntry {
    pub pattern: RoutePattern,
    pub methods: HashMap<Method, Endpoint>,
}

impl PathEntry {
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.methods.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

/// Where a successful insert landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Inserted {
    pub index: usize,
    pub new_path: bool,
}

/// Result of matching a request against the table.
pub(crate) enum Lookup {
    Found {
        endpoint: Endpoint,
        params: HashMap<String, String>,
    },
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

#[derive(Default)]
pub(crate) struct RouteTable {
    entries: Vec<PathEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.methods.len()).sum()
    }

    pub fn entry(&self, index: usize) -> Option<&PathEntry> {
        self.entries.get(index)
    }

    /// Validate and insert; on error the table is unchanged.
    pub fn insert(
        &mut self,
        method: Method,
        path: &str,
        handler: HandlerFunc,
        middlewares: Vec<MiddlewareFunc>,
    ) -> Result<Inserted, RouteError> {
        let pattern = RoutePattern::parse(path)?;

        if let Some(index) = self.entries.iter().position(|e| e.pattern == pattern) {
            let entry = &mut self.entries[index];
            if entry.methods.contains_key(&method) {
                return Err(RouteError::Duplicate {
                    method,
                    path: path.to_string(),
                });
            }
            entry.methods.insert(
                method,
                Endpoint {
                    handler,
                    middlewares: middlewares.into(),
                    pattern: Arc::from(path),
                },
            );
            return Ok(Inserted {
                index,
                new_path: false,
            });
        }

        if let Some(existing) = self.entries.iter().find(|e| e.pattern.conflicts_with(&pattern)) {
            return Err(RouteError::Conflict {
                path: path.to_string(),
                existing: existing.pattern.as_str().to_string(),
            });
        }

        let mut methods = HashMap::new();
        methods.insert(
            method,
            Endpoint {
                handler,
                middlewares: middlewares.into(),
                pattern: Arc::from(path),
            },
        );
        self.entries.push(PathEntry { pattern, methods });
        Ok(Inserted {
            index: self.entries.len() - 1,
            new_path: true,
        })
    }

    /// Undo an insert the engine could not apply.
    pub fn rollback(&mut self, inserted: Inserted, method: &Method) {
        if inserted.new_path {
            if inserted.index + 1 == self.entries.len() {
                self.entries.pop();
            }
        } else if let Some(entry) = self.entries.get_mut(inserted.index) {
            entry.methods.remove(method);
        }
    }

    /// Resolve `method path`; among matching patterns the one with a static
    /// segment furthest left wins.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let best = self
            .entries
            .iter()
            .filter_map(|entry| entry.pattern.matches(path).map(|params| (entry, params)))
            .max_by(|(a, _), (b, _)| a.pattern.precedence(&b.pattern));

        let Some((entry, params)) = best else {
            return Lookup::NotFound;
        };
        match entry.methods.get(method) {
            Some(endpoint) => Lookup::Found {
                endpoint: endpoint.clone(),
                params,
            },
            None => Lookup::MethodNotAllowed(entry.allowed_methods()),
        }
    }
}
