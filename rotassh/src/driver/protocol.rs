//! The `passwd` dialogue as a fixed sequence of expect/send steps.
//!
//! ```text
//! AwaitShellPrompt ──match──▶ SendChangeCommand ──▶ AwaitPasswordPrompt
//!        │                                                ▲
//!        └──────────────timeout (tolerated)───────────────┘
//! AwaitPasswordPrompt ▶ SendCurrentPassword ▶ AwaitNewPasswordPrompt
//!   ▶ SendNewPassword ▶ AwaitRetypePrompt ▶ ResendNewPassword
//!   ▶ AwaitSuccessConfirmation ▶ Succeeded
//! ```
//!
//! Whether a failed await step ends the dialogue is decided by a
//! [`PolicyTable`], not by the step code itself.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::channel::{Expect, Pattern, ShellStream};
use crate::error::{ChannelError, ProtocolError};

/// Command that starts the dialogue.
pub const CHANGE_COMMAND: &str = "passwd";

/// One step of the dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    AwaitShellPrompt,
    SendChangeCommand,
    AwaitPasswordPrompt,
    SendCurrentPassword,
    AwaitNewPasswordPrompt,
    SendNewPassword,
    AwaitRetypePrompt,
    ResendNewPassword,
    AwaitSuccessConfirmation,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::AwaitShellPrompt => "await-shell-prompt",
            Step::SendChangeCommand => "send-change-command",
            Step::AwaitPasswordPrompt => "await-password-prompt",
            Step::SendCurrentPassword => "send-current-password",
            Step::AwaitNewPasswordPrompt => "await-new-password-prompt",
            Step::SendNewPassword => "send-new-password",
            Step::AwaitRetypePrompt => "await-retype-prompt",
            Step::ResendNewPassword => "resend-new-password",
            Step::AwaitSuccessConfirmation => "await-success-confirmation",
        };
        f.write_str(name)
    }
}

/// How a step failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Log it and carry on with the next await step.
    Tolerate,

    /// End the dialogue with a [`ProtocolError`].
    Fatal,
}

/// Escalation per failure class for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    pub on_timeout: Escalation,
    pub on_io_error: Escalation,
}

impl StepPolicy {
    /// Every failure ends the dialogue.
    pub const FATAL: StepPolicy = StepPolicy {
        on_timeout: Escalation::Fatal,
        on_io_error: Escalation::Fatal,
    };

    /// A missing prompt is skipped; a broken stream still ends the dialogue.
    pub const TOLERATE_TIMEOUT: StepPolicy = StepPolicy {
        on_timeout: Escalation::Tolerate,
        on_io_error: Escalation::Fatal,
    };

    /// Classify `err` under this policy.
    pub fn escalation(&self, err: &ChannelError) -> Escalation {
        if err.is_timeout() {
            self.on_timeout
        } else {
            self.on_io_error
        }
    }
}

/// Per-step failure policies. Steps without an entry are fatal.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<Step, StepPolicy>,
}

impl PolicyTable {
    /// Table where every step is fatal.
    pub fn strict() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Override the policy of one step.
    pub fn with(mut self, step: Step, policy: StepPolicy) -> Self {
        self.policies.insert(step, policy);
        self
    }

    /// Policy for `step`.
    pub fn get(&self, step: Step) -> StepPolicy {
        self.policies.get(&step).copied().unwrap_or(StepPolicy::FATAL)
    }
}

impl Default for PolicyTable {
    /// Only the initial shell prompt may be missing: a login that lands
    /// directly on a password-expiry prompt never shows one.
    fn default() -> Self {
        Self::strict().with(Step::AwaitShellPrompt, StepPolicy::TOLERATE_TIMEOUT)
    }
}

/// What happened at a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The awaited prompt appeared.
    Matched,

    /// Input was written.
    Sent,

    /// The step failed and the policy let the dialogue continue.
    Tolerated(String),
}

/// Steps the dialogue went through, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub steps: Vec<(Step, StepOutcome)>,
}

impl Transcript {
    fn push(&mut self, step: Step, outcome: StepOutcome) {
        debug!("{}: {:?}", step, outcome);
        self.steps.push((step, outcome));
    }

    /// Step names only.
    pub fn step_names(&self) -> Vec<Step> {
        self.steps.iter().map(|(step, _)| *step).collect()
    }
}

/// Prompts the dialogue waits for.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub shell: Pattern,
    pub password: Pattern,
    pub new_password: Pattern,
    pub retype: Pattern,
    pub success: Pattern,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            shell: Pattern::contains("$"),
            password: prompt_regex("(?i)password:"),
            new_password: Pattern::sequence([
                prompt_regex("(?i)new"),
                prompt_regex("(?i)password:"),
            ]),
            retype: Pattern::sequence([
                prompt_regex("(?i)retype"),
                prompt_regex("(?i)new"),
                prompt_regex("(?i)password:"),
            ]),
            success: Pattern::contains("updated successfully"),
        }
    }
}

fn prompt_regex(expr: &str) -> Pattern {
    Pattern::regex(expr).expect("built-in prompt pattern is valid")
}

/// Result of an await step that did not end the dialogue.
enum Awaited {
    Matched,
    Tolerated,
}

/// Password change dialogue for one account.
pub struct PasswordChange<'a> {
    password: &'a SecretString,
    new_password: &'a SecretString,
    prompts: &'a Prompts,
    policies: &'a PolicyTable,
}

impl<'a> PasswordChange<'a> {
    /// Create a dialogue changing `password` to `new_password`.
    pub fn new(
        password: &'a SecretString,
        new_password: &'a SecretString,
        prompts: &'a Prompts,
        policies: &'a PolicyTable,
    ) -> Self {
        Self {
            password,
            new_password,
            prompts,
            policies,
        }
    }

    /// Drive the dialogue to completion.
    pub async fn run<S: ShellStream>(
        &self,
        expect: &mut Expect<S>,
    ) -> Result<Transcript, ProtocolError> {
        let mut transcript = Transcript::default();

        let shell = self
            .await_prompt(expect, Step::AwaitShellPrompt, &self.prompts.shell, &mut transcript)
            .await?;
        if let Awaited::Matched = shell {
            self.send(expect, Step::SendChangeCommand, CHANGE_COMMAND, &mut transcript)
                .await?;
        }

        self.await_prompt(expect, Step::AwaitPasswordPrompt, &self.prompts.password, &mut transcript)
            .await?;
        self.send_secret(expect, Step::SendCurrentPassword, self.password, &mut transcript)
            .await?;

        self.await_prompt(
            expect,
            Step::AwaitNewPasswordPrompt,
            &self.prompts.new_password,
            &mut transcript,
        )
        .await?;
        self.send_secret(expect, Step::SendNewPassword, self.new_password, &mut transcript)
            .await?;

        self.await_prompt(expect, Step::AwaitRetypePrompt, &self.prompts.retype, &mut transcript)
            .await?;
        self.send_secret(expect, Step::ResendNewPassword, self.new_password, &mut transcript)
            .await?;

        self.await_prompt(
            expect,
            Step::AwaitSuccessConfirmation,
            &self.prompts.success,
            &mut transcript,
        )
        .await?;

        Ok(transcript)
    }

    async fn await_prompt<S: ShellStream>(
        &self,
        expect: &mut Expect<S>,
        step: Step,
        pattern: &Pattern,
        transcript: &mut Transcript,
    ) -> Result<Awaited, ProtocolError> {
        match expect.expect(pattern).await {
            Ok(_) => {
                transcript.push(step, StepOutcome::Matched);
                Ok(Awaited::Matched)
            }
            Err(err) => match self.policies.get(step).escalation(&err) {
                Escalation::Tolerate => {
                    warn!("{} did not complete ({}), continuing", step, err);
                    transcript.push(step, StepOutcome::Tolerated(err.to_string()));
                    Ok(Awaited::Tolerated)
                }
                Escalation::Fatal => Err(ProtocolError { step, source: err }),
            },
        }
    }

    async fn send<S: ShellStream>(
        &self,
        expect: &mut Expect<S>,
        step: Step,
        text: &str,
        transcript: &mut Transcript,
    ) -> Result<(), ProtocolError> {
        expect
            .send(text)
            .await
            .map_err(|source| ProtocolError { step, source })?;
        transcript.push(step, StepOutcome::Sent);
        Ok(())
    }

    async fn send_secret<S: ShellStream>(
        &self,
        expect: &mut Expect<S>,
        step: Step,
        secret: &SecretString,
        transcript: &mut Transcript,
    ) -> Result<(), ProtocolError> {
        expect
            .send_hidden(secret.expose_secret())
            .await
            .map_err(|source| ProtocolError { step, source })?;
        transcript.push(step, StepOutcome::Sent);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;

    use super::*;
    use crate::channel::{ExpectConfig, IoStream};

    /// One line of a scripted remote shell.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Line {
        /// Remote prints this.
        Say(&'static str),
        /// Remote reads a line and checks it equals this.
        Hear(&'static str),
    }

    /// Run a scripted shell on the server half of a duplex pipe.
    ///
    /// The server keeps the pipe open until the client side goes away, so an
    /// unfinished script shows up as a timeout rather than a closed stream.
    pub(crate) fn serve(io: DuplexStream, script: Vec<Line>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut io = BufReader::new(io);
            for line in script {
                match line {
                    Line::Say(text) => io.write_all(text.as_bytes()).await.unwrap(),
                    Line::Hear(expected) => {
                        let mut got = String::new();
                        io.read_line(&mut got).await.unwrap();
                        assert_eq!(got, format!("{expected}\n"));
                    }
                }
            }
            let mut rest = Vec::new();
            let _ = io.read_to_end(&mut rest).await;
        })
    }

    pub(crate) fn test_config(timeout_ms: u64) -> ExpectConfig {
        ExpectConfig {
            timeout: Duration::from_millis(timeout_ms),
            echo_output: false,
            echo_input: false,
            ..Default::default()
        }
    }

    pub(crate) const SUCCESSFUL_DIALOGUE: [Line; 9] = [
        Line::Say("Last login: Mon Oct  5 10:00:00 2026\r\nalice@host:~$ "),
        Line::Hear("passwd"),
        Line::Say("passwd\r\nChanging password for alice.\r\nCurrent password: "),
        Line::Hear("old-pw"),
        Line::Say("\r\nNew password: "),
        Line::Hear("new-pw"),
        Line::Say("\r\nRetype new password: "),
        Line::Hear("new-pw"),
        Line::Say("\r\npasswd: password updated successfully\r\nalice@host:~$ "),
    ];

    fn secrets() -> (SecretString, SecretString) {
        (
            SecretString::from("old-pw".to_string()),
            SecretString::from("new-pw".to_string()),
        )
    }

    async fn run_against(
        script: Vec<Line>,
        policies: PolicyTable,
        timeout_ms: u64,
    ) -> (Result<Transcript, ProtocolError>, JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(1024);
        let handle = serve(server, script);
        let mut expect = Expect::new(IoStream::new(client), test_config(timeout_ms));

        let (old, new) = secrets();
        let prompts = Prompts::default();
        let result = PasswordChange::new(&old, &new, &prompts, &policies)
            .run(&mut expect)
            .await;
        drop(expect);
        (result, handle)
    }

    #[tokio::test]
    async fn test_full_dialogue_in_order() {
        let (result, server) =
            run_against(SUCCESSFUL_DIALOGUE.to_vec(), PolicyTable::default(), 1000).await;
        server.await.unwrap();

        let transcript = result.unwrap();
        assert_eq!(
            transcript.step_names(),
            vec![
                Step::AwaitShellPrompt,
                Step::SendChangeCommand,
                Step::AwaitPasswordPrompt,
                Step::SendCurrentPassword,
                Step::AwaitNewPasswordPrompt,
                Step::SendNewPassword,
                Step::AwaitRetypePrompt,
                Step::ResendNewPassword,
                Step::AwaitSuccessConfirmation,
            ]
        );
        assert!(
            transcript
                .steps
                .iter()
                .all(|(_, outcome)| !matches!(outcome, StepOutcome::Tolerated(_)))
        );
    }

    #[tokio::test]
    async fn test_expired_password_login_skips_command() {
        let script = vec![
            Line::Say(
                "WARNING: Your password has expired.\r\nYou must change your password now and login again!\r\nChanging password for alice.\r\n(current) UNIX password: ",
            ),
            Line::Hear("old-pw"),
            Line::Say("Enter new UNIX password: "),
            Line::Hear("new-pw"),
            Line::Say("Retype new UNIX password: "),
            Line::Hear("new-pw"),
            Line::Say("passwd: all authentication tokens updated successfully.\r\n"),
        ];

        let (result, server) = run_against(script, PolicyTable::default(), 100).await;
        server.await.unwrap();

        let transcript = result.unwrap();
        assert!(matches!(
            transcript.steps[0],
            (Step::AwaitShellPrompt, StepOutcome::Tolerated(_))
        ));
        assert!(!transcript.step_names().contains(&Step::SendChangeCommand));
        assert_eq!(transcript.steps.len(), 8);
    }

    #[tokio::test]
    async fn test_password_prompt_timeout_is_fatal() {
        let script = vec![Line::Say("alice@host:~$ "), Line::Hear("passwd")];

        let (result, server) = run_against(script, PolicyTable::default(), 100).await;
        server.await.unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.step, Step::AwaitPasswordPrompt);
        assert!(err.source.is_timeout());
    }

    #[tokio::test]
    async fn test_closed_stream_at_shell_prompt_is_fatal() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut expect = Expect::new(IoStream::new(client), test_config(1000));

        let (old, new) = secrets();
        let prompts = Prompts::default();
        let policies = PolicyTable::default();
        let err = PasswordChange::new(&old, &new, &prompts, &policies)
            .run(&mut expect)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::AwaitShellPrompt);
        assert!(matches!(err.source, ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_strict_table_makes_shell_prompt_fatal() {
        let script = vec![Line::Say("(current) UNIX password: ")];

        let (result, server) = run_against(script, PolicyTable::strict(), 50).await;
        server.await.unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.step, Step::AwaitShellPrompt);
    }

    #[tokio::test]
    async fn test_retype_prompt_requires_order() {
        // "new" only appears before "Retype", so the retype sequence never matches
        let script = vec![
            Line::Say("$ "),
            Line::Hear("passwd"),
            Line::Say("Password: "),
            Line::Hear("old-pw"),
            Line::Say("New password: "),
            Line::Hear("new-pw"),
            Line::Say("Retype password: "),
        ];

        let (result, server) = run_against(script, PolicyTable::default(), 100).await;
        server.await.unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.step, Step::AwaitRetypePrompt);
    }

    #[test]
    fn test_default_policy_table() {
        let table = PolicyTable::default();
        assert_eq!(table.get(Step::AwaitShellPrompt), StepPolicy::TOLERATE_TIMEOUT);
        for step in [
            Step::AwaitPasswordPrompt,
            Step::AwaitNewPasswordPrompt,
            Step::AwaitRetypePrompt,
            Step::AwaitSuccessConfirmation,
            Step::SendChangeCommand,
        ] {
            assert_eq!(table.get(step), StepPolicy::FATAL);
        }
    }

    #[test]
    fn test_policy_escalation() {
        let timeout = ChannelError::PatternTimeout {
            pattern: "contains(\"$\")".to_string(),
            timeout: Duration::from_millis(1),
        };
        let policy = StepPolicy::TOLERATE_TIMEOUT;
        assert_eq!(policy.escalation(&timeout), Escalation::Tolerate);
        assert_eq!(policy.escalation(&ChannelError::Closed), Escalation::Fatal);
    }
}
