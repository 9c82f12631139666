//! Mark insertion into six-letter words.

use regex::Regex;

use super::RewriteError;

/// A run of exactly six letters bounded by line edges, whitespace or
/// punctuation. The bounds are part of the match, so two runs sharing one
/// delimiter only match once: in `a castle bridge` only `castle` is marked.
const SIX_LETTER_RUN: &str = r"(?m)(?:^|\s|\p{P})\p{L}{6}(?:\s|\p{P}|$)";

/// Inserts a mark into every bounded six-letter run of a text segment.
#[derive(Debug, Clone)]
pub struct MarkInserter {
    mark: String,
    pattern: Regex,
}

impl MarkInserter {
    pub fn new(mark: impl Into<String>) -> Result<Self, RewriteError> {
        Ok(Self {
            mark: mark.into(),
            pattern: Regex::new(SIX_LETTER_RUN)?,
        })
    }

    /// Mark one text segment. Segments already carrying the mark come back
    /// untouched, so marking twice is the same as marking once.
    pub fn mark_segment(&self, text: &str) -> String {
        if self.mark.is_empty() || text.contains(self.mark.as_str()) {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len() + self.mark.len() * 4);
        let mut last = 0;
        for found in self.pattern.find_iter(text) {
            let run = found.as_str();
            if is_character_reference(run) {
                continue;
            }
            let mut at = found.start() + byte_offset(run, insertion_point(run));
            if text[..at].ends_with('&') && opens_character_reference(&text[at..]) {
                at -= 1;
            }
            out.push_str(&text[last..at]);
            out.push_str(&self.mark);
            last = at;
        }
        out.push_str(&text[last..]);
        out
    }
}

/// Character position inside a matched run where the mark goes.
///
/// A bare run takes the mark at its end. A seven character run takes it at
/// its end unless it opens with whitespace. Everything else takes it just
/// before the closing bound.
fn insertion_point(run: &str) -> usize {
    let len = run.chars().count();
    let leading_space = run.chars().next().is_some_and(char::is_whitespace);
    match len {
        6 => 6,
        7 if !leading_space => 7,
        _ => len - 1,
    }
}

fn byte_offset(run: &str, chars: usize) -> usize {
    run.char_indices()
        .nth(chars)
        .map(|(offset, _)| offset)
        .unwrap_or(run.len())
}

/// `&hellip;` and friends match the run pattern but are not words.
fn is_character_reference(run: &str) -> bool {
    run.starts_with('&') && run.ends_with(';')
}

/// True when `rest` is the remainder of a reference whose `&` was just
/// passed, as in `amp;` or `#8482;`.
fn opens_character_reference(rest: &str) -> bool {
    let mut chars = rest.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '#') {
        return false;
    }
    for c in chars {
        match c {
            ';' => return true,
            c if c.is_ascii_alphanumeric() => {}
            _ => return false,
        }
    }
    false
}
