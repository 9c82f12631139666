//! Content rewrite pipeline.
//!
//! # Responsibilities
//! - Decide whether an upstream response is eligible for rewriting
//! - Gunzip the body, run the text transform, gzip the result
//!
//! # Data Flow
//! ```text
//! gzip bytes → GzDecoder → text → TextTransform → GzEncoder → gzip bytes
//! ```
//!
//! # Design Decisions
//! - Works on a complete body; the relay buffers eligible responses first
//! - Invalid UTF-8 is replaced rather than rejected, the media type is
//!   already known to be textual
//! - A missing anchor is an error, never a silent pass-through

pub mod document;
pub mod marks;
pub mod transform;

use std::io::{self, Read, Write};
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use thiserror::Error;

use crate::config::ProxyConfig;

pub use document::rewrite_anchor_text;
pub use marks::MarkInserter;
pub use transform::{MarkTransform, TextTransform};

/// Errors raised while rewriting a response body.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("no element with class '{0}' found")]
    StructureNotFound(String),

    #[error("gzip decode failed: {0}")]
    Decompress(#[source] io::Error),

    #[error("gzip encode failed: {0}")]
    Compress(#[source] io::Error),

    #[error("invalid mark pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid public origin: {0}")]
    Origin(String),

    #[error("rewrite task failed: {0}")]
    Task(String),
}

/// Rewrites gzip-compressed bodies of one media type.
#[derive(Clone)]
pub struct ContentRewriter {
    media_type: String,
    transform: Arc<dyn TextTransform>,
}

impl ContentRewriter {
    pub fn new(media_type: impl Into<String>, transform: Arc<dyn TextTransform>) -> Self {
        Self {
            media_type: media_type.into(),
            transform,
        }
    }

    /// Build the reference rewriter, or `None` when rewriting is disabled.
    pub fn from_config(config: &ProxyConfig) -> Result<Option<Self>, RewriteError> {
        let rewrite = &config.rewrite;
        if !rewrite.enabled {
            return Ok(None);
        }
        let transform = MarkTransform::new(
            &config.upstream.scheme,
            &config.upstream.host,
            &rewrite.public_origin,
            &rewrite.mark,
            &rewrite.anchor_class,
        )?;
        Ok(Some(Self::new(rewrite.media_type.clone(), Arc::new(transform))))
    }

    /// True when the response is gzip encoded and of the rewritable type.
    pub fn applies_to(&self, headers: &HeaderMap) -> bool {
        let gzip = headers
            .get_all(header::CONTENT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"));

        let media_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim);

        gzip && media_type.is_some_and(|m| m.eq_ignore_ascii_case(&self.media_type))
    }

    /// Run the whole pipeline over one gzip body. CPU bound; callers on the
    /// runtime should move this onto a blocking thread.
    pub fn rewrite(&self, compressed: &[u8]) -> Result<Vec<u8>, RewriteError> {
        let mut raw = Vec::with_capacity(compressed.len() * 4);
        GzDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(RewriteError::Decompress)?;
        let text = String::from_utf8_lossy(&raw);

        let rewritten = self.transform.transform(&text)?;

        let mut encoder = GzEncoder::new(Vec::with_capacity(compressed.len()), Compression::default());
        encoder
            .write_all(rewritten.as_bytes())
            .map_err(RewriteError::Compress)?;
        encoder.finish().map_err(RewriteError::Compress)
    }
}

impl std::fmt::Debug for ContentRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRewriter")
            .field("media_type", &self.media_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;

    pub(crate) fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn gunzip(bytes: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
        out
    }

    pub(crate) fn rewriter() -> ContentRewriter {
        let mut config = ProxyConfig::default();
        config.upstream.host = "example.com".into();
        ContentRewriter::from_config(&config).unwrap().unwrap()
    }

    fn headers(encoding: &str, content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_str(encoding).unwrap());
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn eligibility_requires_gzip_and_media_type() {
        let rewriter = rewriter();
        assert!(rewriter.applies_to(&headers("gzip", "text/html")));
        assert!(rewriter.applies_to(&headers("br, GZIP", "Text/HTML; charset=utf-8")));
        assert!(!rewriter.applies_to(&headers("br", "text/html")));
        assert!(!rewriter.applies_to(&headers("gzip", "application/json")));
        assert!(!rewriter.applies_to(&HeaderMap::new()));
    }

    #[test]
    fn rewrites_and_recompresses() {
        let body = gzip(r#"<div class="layout">Gophers rustic code</div>"#);
        let out = rewriter().rewrite(&body).unwrap();
        let text = gunzip(&out);
        assert_eq!(text, "<div class=\"layout\">Gophers rustic\u{2122} code</div>");
        assert_eq!(text.matches('\u{2122}').count(), 1);
    }

    #[test]
    fn missing_anchor_propagates() {
        let body = gzip("<div>Hello World</div>");
        assert!(matches!(
            rewriter().rewrite(&body),
            Err(RewriteError::StructureNotFound(_))
        ));
    }

    #[test]
    fn corrupt_gzip_reported() {
        assert!(matches!(
            rewriter().rewrite(b"definitely not gzip"),
            Err(RewriteError::Decompress(_))
        ));
    }

    #[test]
    fn disabled_rewriter_is_none() {
        let mut config = ProxyConfig::default();
        config.upstream.host = "example.com".into();
        config.rewrite.enabled = false;
        assert!(ContentRewriter::from_config(&config).unwrap().is_none());
    }
}
