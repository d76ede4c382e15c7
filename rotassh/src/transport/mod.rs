//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management,
//! handling connection setup, authentication, and PTY shell creation.

pub mod config;
mod ssh;

pub use config::{HostKeyVerification, SshConfig};
pub use ssh::{SshShell, SshTransport};
