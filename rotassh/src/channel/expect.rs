//! Expect/send engine over an interactive shell stream.

use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::patterns::Pattern;
use super::stream::ShellStream;
use crate::error::ChannelError;

/// Text echoed in place of hidden input.
const HIDDEN_ECHO: &str = "********";

/// Configuration for expect behavior.
#[derive(Debug, Clone)]
pub struct ExpectConfig {
    /// Default timeout for each `expect` call.
    pub timeout: Duration,

    /// Echo everything received from the shell to the echo sink.
    pub echo_output: bool,

    /// Echo everything sent to the shell to the echo sink.
    pub echo_input: bool,

    /// Strip ANSI escape sequences from received data before matching.
    pub strip_ansi: bool,

    /// Terminator appended by `send`.
    pub line_ending: String,
}

impl Default for ExpectConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            echo_output: true,
            echo_input: false,
            strip_ansi: false,
            line_ending: "\n".to_string(),
        }
    }
}

/// Outcome of a successful `expect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Whether the pattern matched.
    pub matched: bool,

    /// The matched text.
    pub text: String,

    /// Output that preceded the match.
    pub before: String,
}

impl MatchResult {
    fn new(before: &[u8], text: &[u8]) -> Self {
        Self {
            matched: true,
            text: String::from_utf8_lossy(text).into_owned(),
            before: String::from_utf8_lossy(before).into_owned(),
        }
    }

    /// Check if the expect call matched.
    pub fn is_successful(&self) -> bool {
        self.matched
    }
}

/// Pattern-driven dialogue engine.
///
/// Owns the shell stream and a [`PatternBuffer`]. Each [`expect`](Self::expect)
/// reads until the pattern appears, then drops everything up to the end of the
/// match from the buffer.
pub struct Expect<S> {
    stream: S,
    buffer: PatternBuffer,
    config: ExpectConfig,
    echo: Box<dyn AsyncWrite + Send + Unpin>,
}

impl<S: ShellStream> Expect<S> {
    /// Create an engine that echoes to stdout.
    pub fn new(stream: S, config: ExpectConfig) -> Self {
        Self::with_echo_sink(stream, config, Box::new(tokio::io::stdout()))
    }

    /// Create an engine with a custom echo sink.
    pub fn with_echo_sink(
        stream: S,
        config: ExpectConfig,
        echo: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            stream,
            buffer: PatternBuffer::new(config.strip_ansi),
            config,
            echo,
        }
    }

    /// Wait for `pattern` using the default timeout.
    pub async fn expect(&mut self, pattern: &Pattern) -> Result<MatchResult, ChannelError> {
        let timeout = self.config.timeout;
        self.expect_timeout(pattern, timeout).await
    }

    /// Wait for `pattern` for at most `timeout`.
    ///
    /// Already buffered output is searched first. A timeout leaves the buffer
    /// untouched so a later call can still match what arrived.
    pub async fn expect_timeout(
        &mut self,
        pattern: &Pattern,
        timeout: Duration,
    ) -> Result<MatchResult, ChannelError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(span) = self.buffer.search(pattern) {
                let consumed = self.buffer.consume(span.end);
                let result = MatchResult::new(&consumed[..span.start], &consumed[span.start..]);
                trace!("matched {} with {:?}", pattern, result.text);
                return Ok(result);
            }

            let chunk = match tokio::time::timeout_at(deadline, self.stream.recv()).await {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => return Err(ChannelError::Closed),
                Ok(Err(e)) => return Err(ChannelError::Io(e)),
                Err(_) => {
                    debug!(
                        "timed out waiting for {}; unmatched output: {:?}",
                        pattern,
                        self.buffer.as_str_lossy()
                    );
                    return Err(ChannelError::PatternTimeout {
                        pattern: pattern.to_string(),
                        timeout,
                    });
                }
            };

            if self.config.echo_output {
                self.echo(&chunk).await;
            }
            self.buffer.extend(&chunk);
        }
    }

    /// Send a line of input.
    pub async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        debug!("send: {:?}", text);
        if self.config.echo_input {
            self.echo_line(text).await;
        }
        self.write_line(text).await
    }

    /// Send a line of input that must not be logged or echoed (passwords).
    pub async fn send_hidden(&mut self, text: &str) -> Result<(), ChannelError> {
        debug!("send: {}", HIDDEN_ECHO);
        if self.config.echo_input {
            self.echo_line(HIDDEN_ECHO).await;
        }
        self.write_line(text).await
    }

    async fn write_line(&mut self, text: &str) -> Result<(), ChannelError> {
        let mut line = Vec::with_capacity(text.len() + self.config.line_ending.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(self.config.line_ending.as_bytes());
        self.stream.send(&line).await?;
        Ok(())
    }

    async fn echo_line(&mut self, text: &str) {
        let mut line = text.as_bytes().to_vec();
        line.push(b'\n');
        self.echo(&line).await;
    }

    async fn echo(&mut self, data: &[u8]) {
        let result = match self.echo.write_all(data).await {
            Ok(()) => self.echo.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to echo session traffic: {}", e);
        }
    }

    /// Unconsumed output.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Release the engine, returning the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}
