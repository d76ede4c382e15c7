//! Settings loaded from a TOML file.
//!
//! Every key is optional. A missing file yields the defaults; a present but
//! malformed file is an error.
//!
//! ```toml
//! ignore_errors = false
//! hosts = "10.18.40.30,10.18.40.31"
//! enable_echo_output = true
//! enable_echo_input = false
//! expect_timeout = 5000
//!
//! [ssh]
//! port = 22
//! host_key_verification = "accept_new"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::batch::{ErrorPolicy, split_hosts};
use crate::channel::ExpectConfig;
use crate::error::ConfigError;
use crate::transport::HostKeyVerification;

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.toml";

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Keep going after a failed target.
    pub ignore_errors: bool,

    /// Comma separated hosts used when a credential line names none.
    pub hosts: Option<String>,

    /// Echo what the remote shell prints.
    pub enable_echo_output: bool,

    /// Echo what is sent to the remote shell (passwords are masked).
    pub enable_echo_input: bool,

    /// Timeout of each expect step, in milliseconds.
    pub expect_timeout: u64,

    /// Strip ANSI escape sequences from shell output before matching.
    pub strip_ansi: bool,

    /// SSH connection settings.
    pub ssh: SshSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            hosts: None,
            enable_echo_output: true,
            enable_echo_input: false,
            expect_timeout: 3000,
            strip_ansi: false,
            ssh: SshSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load settings from `path`, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Error policy derived from `ignore_errors`.
    pub fn error_policy(&self) -> ErrorPolicy {
        if self.ignore_errors {
            ErrorPolicy::ContinueOnError
        } else {
            ErrorPolicy::StopOnError
        }
    }

    /// Default host list.
    pub fn default_hosts(&self) -> Vec<String> {
        self.hosts.as_deref().map(split_hosts).unwrap_or_default()
    }

    /// Expect engine configuration.
    pub fn expect_config(&self) -> ExpectConfig {
        ExpectConfig {
            timeout: Duration::from_millis(self.expect_timeout),
            echo_output: self.enable_echo_output,
            echo_input: self.enable_echo_input,
            strip_ansi: self.strip_ansi,
            ..Default::default()
        }
    }
}

/// Settings shared by every SSH connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// SSH port.
    pub port: u16,

    /// Connect/handshake timeout, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// known_hosts file used instead of the user's default.
    pub known_hosts_path: Option<PathBuf>,

    /// Terminal type requested for the PTY.
    pub terminal_type: String,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl SshSettings {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout_ms: 10_000,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            terminal_type: "xterm".to_string(),
            terminal_width: 511,
            terminal_height: 24,
        }
    }
}
