//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::config::SshSettings;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    AcceptNew,

    /// Accept all keys without checking (default).
    ///
    /// Any server answering on the target address is trusted with the
    /// credentials. A warning is logged for every connection made this way.
    #[default]
    Disabled,
}

/// SSH connection configuration for one target.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Password for authentication.
    pub password: SecretString,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal type requested for the PTY.
    pub terminal_type: String,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Build the configuration for one host from the shared SSH settings.
    pub fn new(
        settings: &SshSettings,
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port: settings.port,
            username: username.into(),
            password,
            timeout: settings.connect_timeout(),
            terminal_type: settings.terminal_type.clone(),
            terminal_width: settings.terminal_width,
            terminal_height: settings.terminal_height,
            host_key_verification: settings.host_key_verification,
            known_hosts_path: settings.known_hosts_path.clone(),
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
