//! Reference text transform: origin substitution plus anchor-scoped marks.

use url::Url;

use super::document::rewrite_anchor_text;
use super::marks::MarkInserter;
use super::RewriteError;

/// A pure function over decoded response text.
pub trait TextTransform: Send + Sync {
    fn transform(&self, text: &str) -> Result<String, RewriteError>;
}

/// Points upstream links at the proxy and marks six-letter words inside the
/// anchor element.
#[derive(Debug, Clone)]
pub struct MarkTransform {
    upstream_origin: String,
    upstream_host: String,
    public_origin: String,
    public_authority: String,
    anchor_class: String,
    marks: MarkInserter,
}

impl MarkTransform {
    pub fn new(
        upstream_scheme: &str,
        upstream_host: &str,
        public_origin: &str,
        mark: &str,
        anchor_class: &str,
    ) -> Result<Self, RewriteError> {
        if upstream_host.is_empty() {
            return Err(RewriteError::Origin("upstream host is empty".into()));
        }
        let public = Url::parse(public_origin).map_err(|e| RewriteError::Origin(e.to_string()))?;
        let host = public
            .host_str()
            .ok_or_else(|| RewriteError::Origin(format!("{} has no host", public_origin)))?;
        let public_authority = match public.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            upstream_origin: format!("{}://{}", upstream_scheme, upstream_host),
            upstream_host: upstream_host.to_string(),
            public_origin: public.origin().ascii_serialization(),
            public_authority,
            anchor_class: anchor_class.to_string(),
            marks: MarkInserter::new(mark)?,
        })
    }
}

impl TextTransform for MarkTransform {
    fn transform(&self, text: &str) -> Result<String, RewriteError> {
        // Absolute URLs first so the scheme is swapped along with the host.
        let text = text
            .replace(&self.upstream_origin, &self.public_origin)
            .replace(&self.upstream_host, &self.public_authority);
        rewrite_anchor_text(&text, &self.anchor_class, |segment| {
            self.marks.mark_segment(segment)
        })
    }
}
