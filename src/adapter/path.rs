//! Engine-neutral route path syntax.
//!
//! Patterns use `:name` for a single-segment capture and `*name` for a
//! trailing catch-all, e.g. `/users/:id` or `/static/*file`. Each engine
//! translates the parsed form into its own syntax.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::RouteError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 2,
            Segment::Param(_) => 1,
            Segment::Wildcard(_) => 0,
        }
    }
}

/// A validated route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub(crate) fn parse(path: &str) -> Result<Self, RouteError> {
        let invalid = |reason| RouteError::InvalidPath {
            path: path.to_string(),
            reason,
        };

        let Some(rest) = path.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        if path.contains(['{', '}', '?', '#']) {
            return Err(invalid("contains a reserved character"));
        }

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();
        if !rest.is_empty() {
            let parts: Vec<&str> = rest.split('/').collect();
            let last = parts.len() - 1;
            for (i, part) in parts.iter().enumerate() {
                if let Some(name) = part.strip_prefix(':') {
                    check_name(name, &names).map_err(invalid)?;
                    names.push(name);
                    segments.push(Segment::Param(name.to_string()));
                } else if let Some(name) = part.strip_prefix('*') {
                    if i != last {
                        return Err(invalid("catch-all must be the last segment"));
                    }
                    check_name(name, &names).map_err(invalid)?;
                    names.push(name);
                    segments.push(Segment::Wildcard(name.to_string()));
                } else if part.is_empty() && i != last {
                    return Err(invalid("empty path segment"));
                } else if part.contains([':', '*']) {
                    return Err(invalid("':' and '*' may only start a segment"));
                } else {
                    segments.push(Segment::Static(part.to_string()));
                }
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Pattern in axum 0.8 syntax: `/users/{id}`, `/static/{*file}`.
    pub(crate) fn to_axum(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Static(s) => out.push_str(s),
                Segment::Param(name) => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
                Segment::Wildcard(name) => {
                    out.push_str("{*");
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        out
    }

    /// Lookup precedence between two patterns matching the same path.
    ///
    /// Segments compare left to right, static over param over catch-all;
    /// the first position that differs decides, as in axum's router.
    pub(crate) fn precedence(&self, other: &RoutePattern) -> Ordering {
        self.segments
            .iter()
            .map(Segment::rank)
            .cmp(other.segments.iter().map(Segment::rank))
    }

    /// Whether both patterns would need different names for the same
    /// capture position, which engines cannot represent.
    pub(crate) fn conflicts_with(&self, other: &RoutePattern) -> bool {
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            match (a, b) {
                (Segment::Static(x), Segment::Static(y)) if x == y => continue,
                (Segment::Static(_), _) | (_, Segment::Static(_)) => return false,
                (Segment::Param(x), Segment::Param(y)) if x == y => continue,
                (Segment::Wildcard(x), Segment::Wildcard(y)) => return x != y,
                _ => return true,
            }
        }
        false
    }

    /// Match a request path, returning the captured parameters.
    pub(crate) fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut params = HashMap::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), percent_decode(value));
                }
                Segment::Wildcard(name) => {
                    let tail = parts.get(i..)?.join("/");
                    if tail.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), percent_decode(&tail));
                    return Some(params);
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn check_name(name: &str, seen: &[&str]) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("parameter name must not be empty");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("parameter names may only contain [A-Za-z0-9_]");
    }
    if seen.contains(&name) {
        return Err("duplicate parameter name");
    }
    Ok(())
}

/// Join a group prefix and a route path with exactly one '/' between them.
pub(crate) fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), path.is_empty() || path == "/") {
        (true, true) => "/".to_string(),
        (true, false) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path.trim_start_matches('/')),
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
