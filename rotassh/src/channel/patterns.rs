//! Composable patterns for prompt detection.

use std::fmt;

use memchr::memmem;
use regex::bytes::{Regex, RegexBuilder};

/// Byte range of a match, relative to the data that was searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Trait for prompt matching - implemented by [`Pattern`] and plain regexes.
pub trait PromptMatcher: Send + Sync {
    /// Returns the span of the first match, or None if no match.
    fn find_span(&self, data: &[u8]) -> Option<Span>;

    /// Returns byte offset where match ends, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.find_span(data).map(|span| span.end)
    }

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_span(data).is_some()
    }
}

impl PromptMatcher for Regex {
    fn find_span(&self, data: &[u8]) -> Option<Span> {
        self.find(data).map(|m| Span {
            start: m.start(),
            end: m.end(),
        })
    }
}

/// A prompt pattern.
///
/// Patterns are searched for anywhere in the unread part of the buffer, so a
/// prompt does not need to sit at the very end of the output to match.
///
/// ```
/// use rotassh::channel::{Pattern, PromptMatcher};
///
/// let prompt = Pattern::sequence([
///     Pattern::regex_ci("new").unwrap(),
///     Pattern::regex_ci("password:").unwrap(),
/// ]);
/// assert!(prompt.is_match(b"New password: "));
/// assert!(!prompt.is_match(b"password: new"));
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain substring.
    Literal(String),

    /// Regular expression.
    Regex(Regex),

    /// Sub-patterns that must be found in order, each one searched for after
    /// the end of the previous match.
    Sequence(Vec<Pattern>),
}

impl Pattern {
    /// Substring pattern.
    pub fn contains(text: impl Into<String>) -> Self {
        Pattern::Literal(text.into())
    }

    /// Case-sensitive regex pattern. Inline flags such as `(?i)` are honoured.
    pub fn regex(expr: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(expr)?))
    }

    /// Case-insensitive regex pattern.
    pub fn regex_ci(expr: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(
            RegexBuilder::new(expr).case_insensitive(true).build()?,
        ))
    }

    /// Ordered sequence of sub-patterns.
    pub fn sequence(parts: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Sequence(parts.into_iter().collect())
    }
}

impl PromptMatcher for Pattern {
    fn find_span(&self, data: &[u8]) -> Option<Span> {
        match self {
            Pattern::Literal(text) => memmem::find(data, text.as_bytes()).map(|start| Span {
                start,
                end: start + text.len(),
            }),
            Pattern::Regex(regex) => regex.find_span(data),
            Pattern::Sequence(parts) => {
                let mut pos = 0;
                let mut start = None;
                for part in parts {
                    let span = part.find_span(&data[pos..])?;
                    start.get_or_insert(pos + span.start);
                    pos += span.end;
                }
                Some(Span {
                    start: start.unwrap_or(0),
                    end: pos,
                })
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(text) => write!(f, "contains({:?})", text),
            Pattern::Regex(regex) => write!(f, "regex({:?})", regex.as_str()),
            Pattern::Sequence(parts) => {
                write!(f, "sequence(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}
