//! Error types for rotassh.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::driver::Step;

/// Main error type for rotassh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Expect channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Password change dialogue errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Credential input errors
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Settings errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Server presented a key that differs from the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Server is not in known_hosts and strict checking is on
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (pattern matching, shell stream I/O).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open the session channel
    #[error("Failed to open session channel: {0}")]
    OpenFailed(#[source] russh::Error),

    /// Failed to allocate a pseudo-terminal
    #[error("Failed to allocate PTY")]
    PtyRequestFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Pattern matching timed out
    #[error("Pattern {pattern} not found within {timeout:?}")]
    PatternTimeout { pattern: String, timeout: Duration },

    /// Remote side closed the channel
    #[error("Channel closed")]
    Closed,

    /// Stream read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// Whether this error is a plain pattern timeout (as opposed to a stream fault).
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::PatternTimeout { .. })
    }
}

/// Failure of one step of the password change dialogue.
#[derive(Error, Debug)]
#[error("step {step} failed: {source}")]
pub struct ProtocolError {
    pub step: Step,
    #[source]
    pub source: ChannelError,
}

/// Credential input errors.
#[derive(Error, Debug)]
pub enum InputError {
    /// Wrong number of fields on a credential line
    #[error(
        "Incorrect data format: expected 'username password new_password [hosts]', got {fields} field(s)"
    )]
    FieldCount { fields: usize },

    /// No hosts given and no default host list configured
    #[error("Hosts must be provided")]
    MissingHosts,

    /// The credential file could not be read
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Settings file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("config IO error: {0}")]
    Io(#[from] io::Error),

    /// Settings file is not valid TOML or has wrong value types
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using rotassh's Error.
pub type Result<T> = std::result::Result<T, Error>;
