//! # Rotassh
//!
//! Batch SSH password rotation.
//!
//! Rotassh logs into each target host over SSH, allocates a PTY, and drives
//! the interactive `passwd` dialogue with an expect-style engine: wait for a
//! prompt, answer it, wait for the next one.
//!
//! ## Layers
//!
//! - [`channel`]: composable prompt patterns and the expect/send engine
//! - [`transport`]: russh connection, password authentication, PTY shell
//! - [`session`]: per-target session lifecycle
//! - [`driver`]: the `passwd` dialogue as a step machine with per-step failure policies
//! - [`batch`]: credential records and the stop/continue batch runner
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rotassh::batch::{CredentialRecord, Orchestrator};
//! use rotassh::config::Settings;
//! use rotassh::driver::CredentialChanger;
//! use rotassh::session::SshConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rotassh::Error> {
//!     let settings = Settings::default();
//!     let changer = CredentialChanger::new(
//!         SshConnector::new(settings.ssh.clone()),
//!         settings.expect_config(),
//!     );
//!     let mut orchestrator = Orchestrator::new(changer, settings.error_policy());
//!
//!     let record = CredentialRecord::from_fields(
//!         &["admin", "old-secret", "new-secret", "192.168.1.1,192.168.1.2"],
//!         &[],
//!     )?;
//!     let outcome = orchestrator.run(record.targets()).await;
//!     println!("{} changed, {} failed", outcome.success_count(), outcome.failure_count());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use batch::{BatchOutcome, ErrorPolicy, Orchestrator, PasswordChanger, Target};
pub use channel::{Expect, ExpectConfig, MatchResult, Pattern};
pub use config::Settings;
pub use driver::CredentialChanger;
pub use error::Error;
pub use session::SshConnector;
pub use transport::{HostKeyVerification, SshConfig};
