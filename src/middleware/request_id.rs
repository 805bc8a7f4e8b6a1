//! Request ID propagation.
//!
//! An incoming `X-Request-ID` is kept; otherwise a UUID v4 is generated.
//! The ID is stored in request data and echoed on the response.

use axum::http::HeaderValue;

use super::{middleware_fn, MiddlewareFunc};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Key under which the ID is stored in request data.
pub const REQUEST_ID_KEY: &str = "request_id";

const MAX_INBOUND_LEN: usize = 128;

pub fn request_id() -> MiddlewareFunc {
    middleware_fn(|ctx, next| {
        Box::pin(async move {
            let inbound = ctx.header(REQUEST_ID_HEADER);
            let id = if inbound.is_empty() || inbound.len() > MAX_INBOUND_LEN {
                uuid::Uuid::new_v4().to_string()
            } else {
                inbound.to_string()
            };

            if let Ok(value) = HeaderValue::try_from(id.as_str()) {
                ctx.response_headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            ctx.set(REQUEST_ID_KEY, id);
            next.run(ctx).await
        })
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;

    use super::*;
    use crate::context::RouterContext;
    use crate::middleware::{handler_fn, Next};

    async fn run(request: Request<Bytes>) -> (RouterContext, String) {
        let chain = vec![request_id()];
        let handler = handler_fn(|ctx| {
            Box::pin(async move {
                let id: String = ctx.get(REQUEST_ID_KEY).unwrap_or_default();
                ctx.text(StatusCode::OK, id)
            })
        });
        let mut ctx = RouterContext::from_request(request);
        Next::new(&chain, &handler).run(&mut ctx).await.unwrap();
        let body = String::from_utf8(ctx.response_body().to_vec()).unwrap();
        (ctx, body)
    }

    #[tokio::test]
    async fn keeps_inbound_id() {
        let request = Request::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Bytes::new())
            .unwrap();
        let (ctx, body) = run(request).await;
        assert_eq!(body, "abc-123");
        assert_eq!(ctx.response_headers()[REQUEST_ID_HEADER], "abc-123");
    }

    #[tokio::test]
    async fn generates_uuid_when_missing() {
        let (ctx, body) = run(Request::builder().uri("/").body(Bytes::new()).unwrap()).await;
        assert!(uuid::Uuid::parse_str(&body).is_ok());
        assert_eq!(ctx.response_headers()[REQUEST_ID_HEADER], body.as_str());
    }
}
