//! Minimal HTML token stream and anchor-scoped text rewriting.
//!
//! # Responsibilities
//! - Split a document into markup and text tokens without building a tree
//! - Locate the first element whose `class` attribute equals the anchor
//! - Rewrite the text tokens inside that element's subtree
//!
//! # Design Decisions
//! - Rewriting is a pure function from input text to output text; every
//!   markup token is emitted byte-for-byte as it was read
//! - Script and style contents are raw text and are never rewritten
//! - Unclosed elements inside the anchor are closed implicitly by the first
//!   end tag that matches an outer element

use super::RewriteError;

/// Elements that never have content or an end tag.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    RawText(&'a str),
    Start {
        raw: &'a str,
        name: String,
        class: Option<&'a str>,
        self_closing: bool,
    },
    End {
        raw: &'a str,
        name: String,
    },
    /// Comments, doctypes and processing instructions.
    Other(&'a str),
}

impl<'a> Token<'a> {
    fn raw(&self) -> &'a str {
        match self {
            Token::Text(raw) | Token::RawText(raw) | Token::Other(raw) => *raw,
            Token::Start { raw, .. } | Token::End { raw, .. } => *raw,
        }
    }
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    raw_element: Option<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            raw_element: None,
        }
    }

    fn take(&mut self, len: usize) -> &'a str {
        let src = self.src;
        let raw = &src[self.pos..self.pos + len];
        self.pos += len;
        raw
    }

    fn start_tag(&mut self, rest: &'a str) -> Token<'a> {
        let bytes = rest.as_bytes();
        let len = bytes.len();
        let mut i = 1;
        while i < len && is_name_byte(bytes[i]) {
            i += 1;
        }
        let name = rest[1..i].to_ascii_lowercase();
        let mut class = None;
        let mut self_closing = false;

        loop {
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    i += 1;
                    if i < len && bytes[i] == b'>' {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                    continue;
                }
                _ => {}
            }

            let attr_start = i;
            while i < len
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            let attr = &rest[attr_start..i];
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < len && bytes[i] == b'=' {
                i += 1;
                while i < len && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                let value = if i < len && matches!(bytes[i], b'"' | b'\'') {
                    let quote = bytes[i] as char;
                    let start = i + 1;
                    let end = rest[start..].find(quote).map_or(len, |e| start + e);
                    i = (end + 1).min(len);
                    &rest[start..end]
                } else {
                    let start = i;
                    while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    &rest[start..i]
                };
                if class.is_none() && attr.eq_ignore_ascii_case("class") {
                    class = Some(value);
                }
            }
        }

        if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_element = Some(name.clone());
        }
        Token::Start {
            raw: self.take(i),
            name,
            class,
            self_closing,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let src = self.src;
        let rest = &src[self.pos..];
        if rest.is_empty() {
            return None;
        }

        if let Some(element) = self.raw_element.take() {
            let close = format!("</{}", element);
            let end = rest.to_ascii_lowercase().find(&close).unwrap_or(rest.len());
            if end > 0 {
                return Some(Token::RawText(self.take(end)));
            }
        }

        if let Some(body) = rest.strip_prefix("<!--") {
            let len = body.find("-->").map_or(rest.len(), |i| i + 7);
            return Some(Token::Other(self.take(len)));
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            let len = rest.find('>').map_or(rest.len(), |i| i + 1);
            return Some(Token::Other(self.take(len)));
        }
        if let Some(after) = rest.strip_prefix("</") {
            if after.starts_with(|c: char| c.is_ascii_alphabetic()) {
                let name_len = after.bytes().take_while(|b| is_name_byte(*b)).count();
                let name = after[..name_len].to_ascii_lowercase();
                let len = rest.find('>').map_or(rest.len(), |i| i + 1);
                return Some(Token::End {
                    raw: self.take(len),
                    name,
                });
            }
        }
        if let Some(after) = rest.strip_prefix('<') {
            if after.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return Some(self.start_tag(rest));
            }
        }

        // A stray '<' is ordinary text.
        let skip = usize::from(rest.starts_with('<'));
        let len = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        Some(Token::Text(self.take(len)))
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b':'
}

fn has_content(name: &str, self_closing: bool) -> bool {
    !self_closing && !VOID_ELEMENTS.contains(&name)
}

/// Rewrite every text segment inside the first element whose class
/// attribute is exactly `anchor_class`.
///
/// Fails with [`RewriteError::StructureNotFound`] when no such element
/// exists. Everything outside the anchor is returned unchanged.
pub fn rewrite_anchor_text<F>(
    html: &str,
    anchor_class: &str,
    mut rewrite: F,
) -> Result<String, RewriteError>
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(html.len() + html.len() / 8);
    let mut open: Vec<String> = Vec::new();
    let mut found = false;

    for token in Tokenizer::new(html) {
        let inside = !open.is_empty();
        match &token {
            Token::Text(text) if inside => {
                out.push_str(&rewrite(*text));
                continue;
            }
            Token::Start {
                name,
                class,
                self_closing,
                ..
            } => {
                let is_anchor = !inside && !found && *class == Some(anchor_class);
                if is_anchor {
                    found = true;
                }
                if (inside || is_anchor) && has_content(name, *self_closing) {
                    open.push(name.clone());
                }
            }
            Token::End { name, .. } if inside => {
                if let Some(depth) = open.iter().rposition(|n| n == name) {
                    open.truncate(depth);
                }
            }
            _ => {}
        }
        out.push_str(token.raw());
    }

    if !found {
        return Err(RewriteError::StructureNotFound(anchor_class.to_string()));
    }
    Ok(out)
}
