//! Framework-neutral request/response facade.
//!
//! # Data Flow
//! ```text
//! engine request (axum / hyper)
//!     → body buffered, params captured, RequestScope inserted into extensions
//!     → RouterContext (one per request)
//!     → middleware chain + handler read it and write the response once
//!     → RouterContext::into_response → engine response
//! ```
//!
//! # Design Decisions
//! - Missing params, query keys and headers read as `""`, never an error
//! - Response writers are write-once; the second call fails with
//!   [`RouterError::AlreadyWritten`] and changes nothing
//! - The request scope is read from the live request extensions on every
//!   access, so a middleware replacing it is observed downstream

mod data;
mod native;
mod scope;

use std::collections::HashMap;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Method, Request, Response, StatusCode, Uri};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HandlerResult, RouterError};

pub use data::DataStore;
pub use native::{AxumNative, HyperNative, NativeContext};
pub use scope::RequestScope;

const MIME_JSON: &str = "application/json";
const MIME_FORM: &str = "application/x-www-form-urlencoded";

/// Per-request facade handed to every middleware and handler.
#[derive(Debug)]
pub struct RouterContext {
    request: Parts,
    body: Bytes,
    params: HashMap<String, String>,
    query: HashMap<String, Vec<String>>,
    data: DataStore,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Bytes,
    written: bool,
    native: NativeContext,
}

impl RouterContext {
    /// Build a context around request parts and an already-buffered body.
    pub fn new(mut request: Parts, body: Bytes, scope: RequestScope, native: NativeContext) -> Self {
        request.extensions.insert(scope);
        let query = parse_query(request.uri.query());
        Self {
            request,
            body,
            params: HashMap::new(),
            query,
            data: DataStore::new(),
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Bytes::new(),
            written: false,
            native,
        }
    }

    /// Build a detached context from a plain request, useful for driving
    /// handlers without a server.
    pub fn from_request(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body, RequestScope::detached(), NativeContext::Detached)
    }

    /// Attach captured path parameters.
    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    // --- Request ---

    pub fn request(&self) -> &Parts {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Parts {
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// Header value as a string; `""` when missing or not valid UTF-8.
    pub fn header(&self, name: &str) -> &str {
        self.request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Media type of the request body without parameters, lowercased.
    pub fn content_type(&self) -> String {
        self.header(header::CONTENT_TYPE.as_str())
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Path parameter captured by the route pattern; `""` when absent.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// First query value for `key`; `""` when absent.
    pub fn query(&self, key: &str) -> &str {
        self.query
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Every query value for `key`, in request order.
    pub fn query_all(&self, key: &str) -> &[String] {
        self.query.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decode the body according to its `Content-Type`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, RouterError> {
        match self.content_type().as_str() {
            MIME_JSON => serde_json::from_slice(&self.body).map_err(|e| RouterError::Bind(e.to_string())),
            MIME_FORM => serde_urlencoded::from_bytes(&self.body).map_err(|e| RouterError::Bind(e.to_string())),
            other => Err(RouterError::UnsupportedMediaType(other.to_string())),
        }
    }

    /// Decode the query string.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, RouterError> {
        serde_urlencoded::from_str(self.request.uri.query().unwrap_or(""))
            .map_err(|e| RouterError::Bind(e.to_string()))
    }

    // --- Request-scoped state ---

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: std::any::Any + Send + Sync,
    {
        self.data.set(key, value);
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: std::any::Any + Clone,
    {
        self.data.get(key)
    }

    /// Current request scope, read from the live request.
    pub fn context(&self) -> RequestScope {
        self.request
            .extensions
            .get::<RequestScope>()
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the request scope; later [`context`](Self::context) calls see it.
    pub fn set_context(&mut self, scope: RequestScope) {
        self.request.extensions.insert(scope);
    }

    pub fn native(&self) -> &NativeContext {
        &self.native
    }

    // --- Response ---

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set the status used when the chain ends without writing a body.
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.written {
            self.status = status;
        }
    }

    /// Set a response header. Fails once the response is written.
    pub fn set_header(&mut self, name: &str, value: &str) -> HandlerResult {
        if self.written {
            return Err(RouterError::AlreadyWritten);
        }
        let name = HeaderName::try_from(name).map_err(RouterError::other)?;
        let value = HeaderValue::try_from(value).map_err(RouterError::other)?;
        self.response_headers.insert(name, value);
        Ok(())
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Headers may still be adjusted by post-processing middleware after
    /// the body is written (e.g. `Content-Encoding`).
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn response_body(&self) -> &Bytes {
        &self.response_body
    }

    /// Swap the written body for an encoded form of itself.
    pub fn replace_response_body(&mut self, body: Bytes) -> HandlerResult {
        if !self.written {
            return Err(RouterError::Handler("no response body written yet".into()));
        }
        self.response_body = body;
        Ok(())
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> HandlerResult {
        if self.written {
            return Err(RouterError::AlreadyWritten);
        }
        let body = serde_json::to_vec(value).map_err(RouterError::other)?;
        self.write(status, Some(MIME_JSON), Bytes::from(body))
    }

    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> HandlerResult {
        self.write(status, Some("text/plain; charset=utf-8"), Bytes::from(body.into()))
    }

    pub fn html(&mut self, status: StatusCode, body: impl Into<String>) -> HandlerResult {
        self.write(status, Some("text/html; charset=utf-8"), Bytes::from(body.into()))
    }

    pub fn blob(&mut self, status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> HandlerResult {
        self.write(status, Some(content_type), body.into())
    }

    pub fn no_content(&mut self) -> HandlerResult {
        self.write(StatusCode::NO_CONTENT, None, Bytes::new())
    }

    /// Redirect with a 3xx code in 300..=308.
    pub fn redirect(&mut self, code: u16, location: &str) -> HandlerResult {
        if self.written {
            return Err(RouterError::AlreadyWritten);
        }
        if !(300..=308).contains(&code) {
            return Err(RouterError::InvalidRedirectCode(code));
        }
        let status = StatusCode::from_u16(code).map_err(RouterError::other)?;
        let location = HeaderValue::try_from(location).map_err(RouterError::other)?;
        self.response_headers.insert(header::LOCATION, location);
        self.write(status, None, Bytes::new())
    }

    fn write(&mut self, status: StatusCode, content_type: Option<&str>, body: Bytes) -> HandlerResult {
        if self.written {
            return Err(RouterError::AlreadyWritten);
        }
        if let Some(content_type) = content_type {
            let value = HeaderValue::try_from(content_type).map_err(RouterError::other)?;
            self.response_headers.insert(header::CONTENT_TYPE, value);
        }
        self.status = status;
        self.response_body = body;
        self.written = true;
        Ok(())
    }

    /// Consume the context into the response to send.
    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(self.response_body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    let Some(query) = query else {
        return map;
    };
    // Malformed pairs are skipped rather than failing the request.
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    for (k, v) in pairs {
        map.entry(k).or_default().push(v);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn ctx(method: &str, uri: &str, content_type: Option<&str>, body: &'static str) -> RouterContext {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        RouterContext::from_request(builder.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn missing_lookups_are_empty() {
        let c = ctx("GET", "/users?tag=a&tag=b", None, "");
        assert_eq!(c.param("id"), "");
        assert_eq!(c.query("missing"), "");
        assert_eq!(c.header("x-nope"), "");
        assert_eq!(c.query("tag"), "a");
        assert_eq!(c.query_all("tag"), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn params_are_exposed() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        let c = ctx("GET", "/users/42", None, "").with_params(params);
        assert_eq!(c.param("id"), "42");
    }

    #[test]
    fn bind_dispatches_on_content_type() {
        let c = ctx("POST", "/", Some("application/json; charset=utf-8"), r#"{"name":"ann","age":3}"#);
        assert_eq!(c.bind::<User>().unwrap(), User { name: "ann".into(), age: 3 });

        let c = ctx("POST", "/", Some("application/x-www-form-urlencoded"), "name=bo&age=9");
        assert_eq!(c.bind::<User>().unwrap(), User { name: "bo".into(), age: 9 });

        let c = ctx("POST", "/", Some("text/csv"), "name,age");
        assert!(matches!(c.bind::<User>(), Err(RouterError::UnsupportedMediaType(t)) if t == "text/csv"));

        let c = ctx("POST", "/", Some("application/json"), "{");
        assert!(matches!(c.bind::<User>(), Err(RouterError::Bind(_))));
    }

    #[test]
    fn bind_query_decodes() {
        let c = ctx("GET", "/?name=cy&age=4", None, "");
        assert_eq!(c.bind_query::<User>().unwrap(), User { name: "cy".into(), age: 4 });
    }

    #[test]
    fn writes_are_write_once() {
        let mut c = ctx("GET", "/", None, "");
        c.json(StatusCode::CREATED, &serde_json::json!({"ok": true})).unwrap();

        assert!(matches!(c.text(StatusCode::OK, "again"), Err(RouterError::AlreadyWritten)));
        assert!(matches!(c.no_content(), Err(RouterError::AlreadyWritten)));
        assert!(matches!(c.redirect(302, "/x"), Err(RouterError::AlreadyWritten)));
        c.set_status(StatusCode::IM_A_TEAPOT);

        let response = c.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.body().as_ref(), br#"{"ok":true}"#);
    }

    #[test]
    fn redirect_validates_code() {
        let mut c = ctx("GET", "/", None, "");
        assert!(matches!(c.redirect(200, "/x"), Err(RouterError::InvalidRedirectCode(200))));
        assert!(!c.is_written());
        c.redirect(307, "/elsewhere").unwrap();
        let response = c.into_response();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
    }

    #[test]
    fn unwritten_context_uses_status() {
        let mut c = ctx("DELETE", "/", None, "");
        c.set_status(StatusCode::ACCEPTED);
        let response = c.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.body().is_empty());
    }

    #[test]
    fn replaced_scope_is_observed() {
        let mut c = ctx("GET", "/", None, "");
        assert!(c.context().deadline().is_none());

        let scoped = c.context().with_timeout(std::time::Duration::from_secs(1));
        c.set_context(scoped);
        assert!(c.context().deadline().is_some());

        c.context().cancel();
        assert!(c.context().is_cancelled());
    }
}
