//! Per-target password change: session, shell, dialogue, teardown.

use log::{debug, warn};

use super::protocol::{PasswordChange, PolicyTable, Prompts, Transcript};
use crate::batch::{PasswordChanger, Target};
use crate::channel::{Expect, ExpectConfig, ShellStream};
use crate::error::Result;
use crate::session::{RemoteSession, SessionFactory};

/// [`PasswordChanger`] that runs the `passwd` dialogue over sessions from `F`.
///
/// Every target gets a fresh session. The session is closed after the
/// dialogue whether it succeeded or not.
pub struct CredentialChanger<F> {
    factory: F,
    expect_config: ExpectConfig,
    prompts: Prompts,
    policies: PolicyTable,
}

impl<F: SessionFactory> CredentialChanger<F> {
    /// Create a changer with the default prompts and step policies.
    pub fn new(factory: F, expect_config: ExpectConfig) -> Self {
        Self {
            factory,
            expect_config,
            prompts: Prompts::default(),
            policies: PolicyTable::default(),
        }
    }

    /// Replace the step policy table.
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Replace the prompts.
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Get the session factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    async fn drive(&self, session: &mut F::Session, target: &Target) -> Result<Transcript> {
        let shell = session.start_shell().await?;
        let mut expect = Expect::new(shell, self.expect_config.clone());

        let result = PasswordChange::new(
            &target.password,
            &target.new_password,
            &self.prompts,
            &self.policies,
        )
        .run(&mut expect)
        .await;

        let mut shell = expect.into_inner();
        if let Err(err) = shell.shutdown().await {
            debug!("Shell shutdown for {} failed: {}", target, err);
        }

        Ok(result?)
    }
}

impl<F: SessionFactory> PasswordChanger for CredentialChanger<F> {
    async fn change(&self, target: &Target) -> Result<()> {
        let mut session = self
            .factory
            .open(&target.host, &target.username, &target.password)
            .await?;

        let result = self.drive(&mut session, target).await;

        if let Err(err) = session.close().await {
            warn!("Failed to close session for {}: {}", target, err);
        }

        let transcript = result?;
        debug!("{}: dialogue finished after {} steps", target, transcript.steps.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use secrecy::SecretString;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::channel::IoStream;
    use crate::driver::Step;
    use crate::driver::protocol::tests::{Line, SUCCESSFUL_DIALOGUE, serve, test_config};
    use crate::error::{Error, TransportError};

    #[derive(Default)]
    struct FakeFactory {
        script: Vec<Line>,
        reject_auth: bool,
        opens: AtomicUsize,
        closes: Arc<AtomicUsize>,
    }

    struct FakeSession {
        script: Vec<Line>,
        closes: Arc<AtomicUsize>,
        server: Option<JoinHandle<()>>,
    }

    impl SessionFactory for FakeFactory {
        type Session = FakeSession;

        async fn open(
            &self,
            _host: &str,
            username: &str,
            _password: &SecretString,
        ) -> Result<FakeSession> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.reject_auth {
                return Err(TransportError::AuthenticationFailed {
                    user: username.to_string(),
                }
                .into());
            }
            Ok(FakeSession {
                script: self.script.clone(),
                closes: self.closes.clone(),
                server: None,
            })
        }
    }

    impl RemoteSession for FakeSession {
        type Shell = IoStream<DuplexStream>;

        async fn start_shell(&mut self) -> Result<Self::Shell> {
            let (client, server) = tokio::io::duplex(1024);
            self.server = Some(serve(server, self.script.clone()));
            Ok(IoStream::new(client))
        }

        async fn close(self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if let Some(server) = self.server {
                server.await.unwrap();
            }
            Ok(())
        }
    }

    fn target() -> Target {
        Target {
            host: "10.0.0.7".to_string(),
            username: "alice".to_string(),
            password: SecretString::from("old-pw".to_string()),
            new_password: SecretString::from("new-pw".to_string()),
        }
    }

    #[tokio::test]
    async fn test_success_closes_session_once() {
        let factory = FakeFactory {
            script: SUCCESSFUL_DIALOGUE.to_vec(),
            ..Default::default()
        };
        let changer = CredentialChanger::new(factory, test_config(1000));

        changer.change(&target()).await.unwrap();

        assert_eq!(changer.factory().opens.load(Ordering::SeqCst), 1);
        assert_eq!(changer.factory().closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_protocol_failure_still_closes_session() {
        let factory = FakeFactory {
            script: vec![Line::Say("alice@host:~$ "), Line::Hear("passwd")],
            ..Default::default()
        };
        let changer = CredentialChanger::new(factory, test_config(100));

        let err = changer.change(&target()).await.unwrap_err();

        match err {
            Error::Protocol(err) => assert_eq!(err.step, Step::AwaitPasswordPrompt),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(changer.factory().closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_credentials_never_start_a_shell() {
        let factory = FakeFactory {
            reject_auth: true,
            ..Default::default()
        };
        let changer = CredentialChanger::new(factory, test_config(100));

        let err = changer.change(&target()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(TransportError::AuthenticationFailed { .. })
        ));
        assert_eq!(changer.factory().closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_each_change_opens_a_fresh_session() {
        let factory = FakeFactory {
            script: SUCCESSFUL_DIALOGUE.to_vec(),
            ..Default::default()
        };
        let changer = CredentialChanger::new(factory, test_config(1000));

        changer.change(&target()).await.unwrap();
        changer.change(&target()).await.unwrap();

        assert_eq!(changer.factory().opens.load(Ordering::SeqCst), 2);
        assert_eq!(changer.factory().closes.load(Ordering::SeqCst), 2);
    }
}
