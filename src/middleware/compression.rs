//! gzip response compression with pooled encoders.
//!
//! # Responsibilities
//! - Negotiate gzip from `Accept-Encoding`
//! - Encode written bodies with a deflate state borrowed from a per-level pool
//! - Set `Content-Encoding` only when the body was encoded; `Vary` on every
//!   eligible response, whatever the client accepted
//!
//! # Design Decisions
//! - One pool per level 0..=9; an encoder is reset before each use and
//!   never shared by two requests at once
//! - Levels outside 0..=9 fall back to the default level
//! - Bodies already encoded, empty, or of a non-compressible type pass through

use std::io;
use std::sync::{Mutex, OnceLock, PoisonError};

use axum::http::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use axum::http::StatusCode;
use bytes::Bytes;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};

use super::{middleware_fn, MiddlewareFunc};
use crate::config::CompressionConfig;
use crate::context::RouterContext;

pub const DEFAULT_LEVEL: u32 = 6;
const LEVELS: usize = 10;
/// Idle encoders kept per level; extras are dropped on return.
const MAX_IDLE_PER_LEVEL: usize = 64;

/// gzip member header: magic, deflate, no flags, no mtime, no extra flags, OS unknown.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

/// Map a configured level onto 0..=9.
pub fn normalize_level(level: i32) -> u32 {
    match u32::try_from(level) {
        Ok(level) if level <= 9 => level,
        _ => DEFAULT_LEVEL,
    }
}

/// Raw-deflate encoder pools, one per compression level.
#[derive(Debug)]
pub struct EncoderPools {
    levels: [Mutex<Vec<Compress>>; LEVELS],
}

impl EncoderPools {
    pub fn new() -> Self {
        Self {
            levels: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// Process-wide pools used by [`compression`].
    pub fn global() -> &'static EncoderPools {
        static POOLS: OnceLock<EncoderPools> = OnceLock::new();
        POOLS.get_or_init(EncoderPools::new)
    }

    /// Borrow an encoder for `level`; it returns to the pool on drop.
    pub fn checkout(&self, level: u32) -> PooledEncoder<'_> {
        let level = if level as usize >= LEVELS { DEFAULT_LEVEL } else { level };
        let reused = self.levels[level as usize]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let compress = match reused {
            Some(mut compress) => {
                compress.reset();
                compress
            }
            None => Compress::new(Compression::new(level), false),
        };
        PooledEncoder {
            pools: self,
            level,
            compress: Some(compress),
        }
    }

    /// Encoders currently idle in the pool for `level`.
    pub fn idle(&self, level: u32) -> usize {
        self.levels
            .get(level as usize)
            .map(|pool| pool.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }
}

impl Default for EncoderPools {
    fn default() -> Self {
        Self::new()
    }
}

/// An encoder on loan from [`EncoderPools`].
pub struct PooledEncoder<'p> {
    pools: &'p EncoderPools,
    level: u32,
    compress: Option<Compress>,
}

impl PooledEncoder<'_> {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Encode `input` as a complete gzip member.
    pub fn gzip(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let Some(compress) = self.compress.as_mut() else {
            return Err(io::Error::other("encoder already returned to pool"));
        };

        let mut out = Vec::with_capacity(GZIP_HEADER.len() + input.len() / 2 + 64);
        out.extend_from_slice(&GZIP_HEADER);

        let start_in = compress.total_in();
        loop {
            let consumed = (compress.total_in() - start_in) as usize;
            if out.capacity() - out.len() < 64 {
                out.reserve(out.capacity().max(256));
            }
            let status = compress
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Finish)
                .map_err(io::Error::other)?;
            if status == Status::StreamEnd {
                break;
            }
        }

        let mut crc = Crc::new();
        crc.update(input);
        out.extend_from_slice(&crc.sum().to_le_bytes());
        // ISIZE is the input length modulo 2^32.
        out.extend_from_slice(&(input.len() as u32).to_le_bytes());
        Ok(out)
    }
}

impl Drop for PooledEncoder<'_> {
    fn drop(&mut self) {
        if let Some(compress) = self.compress.take() {
            let mut pool = self.pools.levels[self.level as usize]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if pool.len() < MAX_IDLE_PER_LEVEL {
                pool.push(compress);
            }
        }
    }
}

/// Whether an `Accept-Encoding` value admits gzip.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|item| {
        let mut parts = item.split(';');
        let coding = parts.next().unwrap_or("").trim();
        if !(coding.eq_ignore_ascii_case("gzip") || coding == "*") {
            return false;
        }
        let q = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|v| v.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        q > 0.0
    })
}

fn is_compressible(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/javascript"
                | "application/x-javascript"
                | "application/xml"
                | "image/svg+xml"
        )
}

fn should_compress(ctx: &RouterContext, min_length: usize) -> bool {
    let headers = ctx.response_headers();
    let body = ctx.response_body();
    if body.is_empty() || body.len() < min_length {
        return false;
    }
    if headers.contains_key(CONTENT_ENCODING) {
        return false;
    }
    if matches!(ctx.status(), StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED) {
        return false;
    }
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_compressible)
}

/// gzip responses for clients that accept it.
pub fn compression(config: &CompressionConfig) -> MiddlewareFunc {
    let level = normalize_level(config.level);
    let min_length = config.min_length;
    if level as i32 != config.level {
        tracing::warn!(
            configured = config.level,
            using = level,
            "invalid gzip level, falling back to default"
        );
    }

    middleware_fn(move |ctx, next| {
        Box::pin(async move {
            let accepted = accepts_gzip(ctx.header("accept-encoding"));
            let result = next.run(ctx).await;
            if result.is_err() || !ctx.is_written() || !should_compress(ctx, min_length) {
                return result;
            }
            ctx.response_headers_mut()
                .append(VARY, HeaderValue::from_static("Accept-Encoding"));
            if !accepted {
                return result;
            }

            let encoded = {
                let mut encoder = EncoderPools::global().checkout(level);
                encoder.gzip(ctx.response_body())
            };
            match encoded {
                Ok(encoded) => {
                    ctx.replace_response_body(Bytes::from(encoded))?;
                    let headers = ctx.response_headers_mut();
                    headers.remove(CONTENT_LENGTH);
                    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "gzip encoding failed, sending identity body");
                }
            }
            result
        })
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use axum::http::Request;
    use flate2::read::GzDecoder;

    use super::*;
    use crate::middleware::{handler_fn, Next};

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn level_normalization() {
        assert_eq!(normalize_level(0), 0);
        assert_eq!(normalize_level(9), 9);
        assert_eq!(normalize_level(-1), DEFAULT_LEVEL);
        assert_eq!(normalize_level(42), DEFAULT_LEVEL);
    }

    #[test]
    fn pooled_encoder_output_is_valid_gzip() {
        let pools = EncoderPools::new();
        let input = "hello gzip ".repeat(500);
        for level in [0, 1, 6, 9] {
            let encoded = pools.checkout(level).gzip(input.as_bytes()).unwrap();
            assert_eq!(gunzip(&encoded), input, "level {level}");
        }
        assert_eq!(pools.idle(6), 1);
    }

    #[test]
    fn reused_encoder_is_reset() {
        let pools = EncoderPools::new();
        let first = pools.checkout(5).gzip(b"first body").unwrap();
        let second = pools.checkout(5).gzip(b"second body").unwrap();
        assert_eq!(gunzip(&first), "first body");
        assert_eq!(gunzip(&second), "second body");
        assert_eq!(pools.idle(5), 1);
    }

    #[test]
    fn concurrent_checkouts_get_distinct_encoders() {
        let pools = EncoderPools::new();
        {
            let mut a = pools.checkout(3);
            let mut b = pools.checkout(3);
            let ea = a.gzip(b"aaaa").unwrap();
            let eb = b.gzip(b"bbbb").unwrap();
            assert_eq!(gunzip(&ea), "aaaa");
            assert_eq!(gunzip(&eb), "bbbb");
        }
        assert_eq!(pools.idle(3), 2);
    }

    #[test]
    fn accept_encoding_negotiation() {
        assert!(accepts_gzip("gzip"));
        assert!(accepts_gzip("deflate, GZIP;q=0.5"));
        assert!(accepts_gzip("*"));
        assert!(!accepts_gzip("gzip;q=0"));
        assert!(!accepts_gzip("br, deflate"));
        assert!(!accepts_gzip(""));
    }

    async fn run(accept: Option<&str>, body: &'static str, config: CompressionConfig) -> RouterContext {
        let chain = vec![compression(&config)];
        let handler = handler_fn(move |ctx| Box::pin(async move { ctx.text(StatusCode::OK, body) }));
        let mut builder = Request::builder().uri("/");
        if let Some(accept) = accept {
            builder = builder.header("accept-encoding", accept);
        }
        let mut ctx = RouterContext::from_request(builder.body(Bytes::new()).unwrap());
        Next::new(&chain, &handler).run(&mut ctx).await.unwrap();
        ctx
    }

    #[tokio::test]
    async fn compresses_when_accepted() {
        let ctx = run(Some("gzip"), "compress me please", CompressionConfig::default()).await;
        assert_eq!(ctx.response_headers()[CONTENT_ENCODING], "gzip");
        assert_eq!(ctx.response_headers()[VARY], "Accept-Encoding");
        assert_eq!(gunzip(ctx.response_body()), "compress me please");
    }

    #[tokio::test]
    async fn identity_when_not_accepted() {
        let ctx = run(None, "plain", CompressionConfig::default()).await;
        assert!(!ctx.response_headers().contains_key(CONTENT_ENCODING));
        assert_eq!(ctx.response_headers()[VARY], "Accept-Encoding");
        assert_eq!(ctx.response_body().as_ref(), b"plain");

        let ctx = run(Some("br"), "plain", CompressionConfig::default()).await;
        assert!(!ctx.response_headers().contains_key(CONTENT_ENCODING));
        assert_eq!(ctx.response_headers()[VARY], "Accept-Encoding");
    }

    #[tokio::test]
    async fn respects_min_length() {
        let config = CompressionConfig {
            min_length: 1024,
            ..CompressionConfig::default()
        };
        let ctx = run(Some("gzip"), "short", config).await;
        assert!(!ctx.response_headers().contains_key(CONTENT_ENCODING));
        assert!(!ctx.response_headers().contains_key(VARY));
        assert_eq!(ctx.response_body().as_ref(), b"short");
    }

    #[tokio::test]
    async fn invalid_level_still_compresses() {
        let config = CompressionConfig {
            level: 99,
            ..CompressionConfig::default()
        };
        let ctx = run(Some("gzip"), "fallback level", config).await;
        assert_eq!(gunzip(ctx.response_body()), "fallback level");
    }
}
