//! Channel layer for pattern matching and expect/send dialogue.
//!
//! This module handles the interactive session management:
//! composable prompt patterns, a forward-consumed output buffer and the
//! expect engine that ties them to a shell stream.

mod buffer;
mod expect;
mod patterns;
mod stream;

pub use buffer::PatternBuffer;
pub use expect::{Expect, ExpectConfig, MatchResult};
pub use patterns::{Pattern, PromptMatcher, Span};
pub use stream::{IoStream, ShellStream};

#[cfg(test)]
pub(crate) use expect::tests::SharedSink;
