//! Remote session management.
//!
//! A [`SessionFactory`] opens one authenticated connection per target; the
//! resulting [`RemoteSession`] starts the interactive shell and is closed
//! exactly once when the target is done.

use std::future::Future;

use secrecy::SecretString;

use crate::channel::ShellStream;
use crate::config::SshSettings;
use crate::error::Result;
use crate::transport::{SshConfig, SshShell, SshTransport};

/// Opens authenticated sessions.
pub trait SessionFactory {
    /// Session type produced by this factory.
    type Session: RemoteSession;

    /// Connect to `host` and authenticate.
    fn open(
        &self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<Self::Session>>;
}

/// An authenticated connection that can host an interactive shell.
pub trait RemoteSession {
    /// Shell stream type.
    type Shell: ShellStream;

    /// Allocate a PTY and start a shell.
    fn start_shell(&mut self) -> impl Future<Output = Result<Self::Shell>>;

    /// Tear down the connection.
    fn close(self) -> impl Future<Output = Result<()>>;
}

/// [`SessionFactory`] for real SSH connections.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    settings: SshSettings,
}

impl SshConnector {
    /// Create a connector using the given SSH settings.
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }
}

impl SessionFactory for SshConnector {
    type Session = SshTransport;

    async fn open(
        &self,
        host: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<SshTransport> {
        let config = SshConfig::new(&self.settings, host, username, password.clone());
        SshTransport::connect(config).await
    }
}

impl RemoteSession for SshTransport {
    type Shell = SshShell;

    async fn start_shell(&mut self) -> Result<SshShell> {
        self.open_shell().await
    }

    async fn close(self) -> Result<()> {
        SshTransport::close(self).await
    }
}
