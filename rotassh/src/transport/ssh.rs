//! SSH transport implementation using russh.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::config::{HostKeyVerification, SshConfig};
use crate::channel::ShellStream;
use crate::error::{ChannelError, Result, TransportError};

/// Extended data stream number of stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// SSH transport wrapping a russh client session.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client_config());

        if config.host_key_verification == HostKeyVerification::Disabled {
            warn!(
                "Host key verification is disabled, trusting any key presented by {}",
                config.socket_addr()
            );
        }

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification,
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("Connecting to {}", config.socket_addr());

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // If check_server_key stored a detailed error, use that instead
            // of the generic russh::Error::UnknownKey
            let stored = host_key_error
                .lock()
                .ok()
                .and_then(|mut slot| slot.take());
            match (stored, e) {
                (Some(hk_err), _) => hk_err,
                (None, russh::Error::IO(source)) => TransportError::ConnectionFailed {
                    host: config.host.clone(),
                    port: config.port,
                    source,
                },
                (None, e) => TransportError::Ssh(e),
            }
        })?;

        Self::authenticate(&mut session, &config).await?;

        Ok(Self { session, config })
    }

    /// Open a session channel, allocate a PTY and start a shell on it.
    pub async fn open_shell(&self) -> Result<SshShell> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(ChannelError::OpenFailed)?;

        channel
            .request_pty(
                true,
                &self.config.terminal_type,
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|_| ChannelError::PtyRequestFailed)?;

        channel
            .request_shell(true)
            .await
            .map_err(|_| ChannelError::ShellRequestFailed)?;

        Ok(SshShell { channel })
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = session
            .authenticate_password(&config.username, config.password.expose_secret())
            .await
            .map_err(TransportError::Ssh)?
            .success();

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// russh client configuration for one connection.
///
/// The connect timeout bounds the handshake only. The session has no
/// inactivity limit; silence on the shell is bounded by each expect timeout.
fn client_config() -> client::Config {
    client::Config {
        inactivity_timeout: None,
        ..Default::default()
    }
}

/// Interactive shell running on an SSH channel.
///
/// Output on the stderr extended data stream is merged with stdout.
pub struct SshShell {
    channel: Channel<Msg>,
}

impl ShellStream for SshShell {
    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(Bytes::copy_from_slice(&data[..])));
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == SSH_EXTENDED_DATA_STDERR => {
                    return Ok(Some(Bytes::copy_from_slice(&data[..])));
                }
                Some(ChannelMsg::Failure) => {
                    return Err(io::Error::other("server refused a channel request"));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("Remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => {}
            }
        }
    }

    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.channel.data(data).await.map_err(io::Error::other)
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.channel.eof().await.map_err(io::Error::other)?;
        self.channel.close().await.map_err(io::Error::other)
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, err: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(err);
        }
        false
    }

    /// Apply the verification mode to the key presented by the server.
    fn verify_host_key(&self, pubkey: &PublicKey) -> bool {
        match self.host_key_verification {
            HostKeyVerification::Disabled => true,

            HostKeyVerification::AcceptNew => match self.check_known_hosts(pubkey) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(pubkey) {
                        warn!("Failed to save host key: {}", e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(pubkey) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify_host_key(server_public_key))
    }
}
