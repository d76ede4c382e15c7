//! Sequential batch runner with a stop/continue error policy.

use log::{error, info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::target::{CredentialEntry, Target};
use super::{ErrorPolicy, PasswordChanger};

/// Result of one attempted target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    /// `username@host`.
    pub target: String,

    /// Failure cause, if the change failed.
    pub error: Option<String>,
}

impl TargetReport {
    /// Check if the password was changed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A credential entry that was rejected before any connection was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFailure {
    /// 1-based line number, when read from a file.
    pub line: Option<usize>,
    pub message: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Every attempted target, in order.
    pub reports: Vec<TargetReport>,

    /// Rejected credential entries.
    pub input_failures: Vec<InputFailure>,

    /// Processing halted at a failure because of [`ErrorPolicy::StopOnError`].
    pub stopped_early: bool,
}

impl BatchOutcome {
    /// True only if nothing failed.
    pub fn is_success(&self) -> bool {
        self.input_failures.is_empty() && self.reports.iter().all(TargetReport::is_success)
    }

    /// Number of failures, input and per-target.
    pub fn failure_count(&self) -> usize {
        self.input_failures.len() + self.reports.iter().filter(|r| !r.is_success()).count()
    }

    /// Number of targets whose password was changed.
    pub fn success_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    /// Number of targets a change was attempted on.
    pub fn attempted(&self) -> usize {
        self.reports.len()
    }
}

/// Runs a [`PasswordChanger`] over targets one at a time.
///
/// Progress lines go to the console sink (stdout by default) and to the log.
pub struct Orchestrator<C> {
    changer: C,
    policy: ErrorPolicy,
    console: Box<dyn AsyncWrite + Send + Unpin>,
}

impl<C: PasswordChanger> Orchestrator<C> {
    /// Create an orchestrator that reports progress on stdout.
    pub fn new(changer: C, policy: ErrorPolicy) -> Self {
        Self::with_console(changer, policy, Box::new(tokio::io::stdout()))
    }

    /// Create an orchestrator with a custom progress sink.
    pub fn with_console(
        changer: C,
        policy: ErrorPolicy,
        console: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        Self {
            changer,
            policy,
            console,
        }
    }

    /// Get the password changer.
    pub fn changer(&self) -> &C {
        &self.changer
    }

    /// Process targets in order.
    pub async fn run(&mut self, targets: impl IntoIterator<Item = Target>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        self.process_targets(targets, &mut outcome).await;
        outcome
    }

    /// Process credential entries in order, expanding each record into its targets.
    ///
    /// Rejected entries count as failures without any connection attempt.
    pub async fn run_records(
        &mut self,
        entries: impl IntoIterator<Item = CredentialEntry>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for entry in entries {
            let keep_going = match entry.record {
                Ok(record) => self.process_targets(record.targets(), &mut outcome).await,
                Err(err) => {
                    match entry.line {
                        Some(line) => error!("Line #{}: {}", line, err),
                        None => error!("{}", err),
                    }
                    outcome.input_failures.push(InputFailure {
                        line: entry.line,
                        message: err.to_string(),
                    });
                    self.on_failure(&mut outcome)
                }
            };

            if !keep_going {
                break;
            }
        }

        outcome
    }

    /// Returns false when the policy says to stop.
    async fn process_targets(
        &mut self,
        targets: impl IntoIterator<Item = Target>,
        outcome: &mut BatchOutcome,
    ) -> bool {
        for target in targets {
            self.progress(&format!("Is about to change password for {}", target))
                .await;

            match self.changer.change(&target).await {
                Ok(()) => {
                    info!("Password changed for {}", target);
                    outcome.reports.push(TargetReport {
                        target: target.to_string(),
                        error: None,
                    });
                }
                Err(err) => {
                    error!(
                        "An error occurred while changing password for {}: {}",
                        target, err
                    );
                    outcome.reports.push(TargetReport {
                        target: target.to_string(),
                        error: Some(err.to_string()),
                    });
                    if !self.on_failure(outcome) {
                        return false;
                    }
                }
            }
        }
        true
    }

    async fn progress(&mut self, message: &str) {
        info!("{}", message);
        let line = format!("{}\n", message);
        let result = match self.console.write_all(line.as_bytes()).await {
            Ok(()) => self.console.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to write progress: {}", e);
        }
    }

    fn on_failure(&self, outcome: &mut BatchOutcome) -> bool {
        match self.policy {
            ErrorPolicy::ContinueOnError => true,
            ErrorPolicy::StopOnError => {
                outcome.stopped_early = true;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::batch::parse_credentials;
    use crate::channel::SharedSink;
    use crate::error::{Result, TransportError};

    /// Changer that fails for a fixed set of hosts and records every attempt.
    #[derive(Default)]
    struct ScriptedChanger {
        failing_hosts: HashSet<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedChanger {
        fn failing(hosts: &[&str]) -> Self {
            Self {
                failing_hosts: hosts.iter().map(|h| h.to_string()).collect(),
                ..Default::default()
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl PasswordChanger for ScriptedChanger {
        async fn change(&self, target: &Target) -> Result<()> {
            self.attempts.lock().unwrap().push(target.to_string());
            if self.failing_hosts.contains(&target.host) {
                return Err(TransportError::AuthenticationFailed {
                    user: target.username.clone(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn targets(line: &str) -> Vec<Target> {
        crate::batch::parse_line(line, &[])
            .unwrap()
            .unwrap()
            .targets()
            .collect()
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_remaining_targets() {
        let mut orchestrator =
            Orchestrator::new(ScriptedChanger::failing(&["a"]), ErrorPolicy::StopOnError);

        let outcome = orchestrator.run(targets("alice p n a,b")).await;

        assert_eq!(orchestrator.changer().attempts(), vec!["alice@a"]);
        assert!(!outcome.is_success());
        assert!(outcome.stopped_early);
        assert_eq!(outcome.attempted(), 1);
    }

    #[tokio::test]
    async fn test_continue_on_error_records_later_success() {
        let mut orchestrator = Orchestrator::new(
            ScriptedChanger::failing(&["a"]),
            ErrorPolicy::ContinueOnError,
        );

        let outcome = orchestrator.run(targets("alice p n a,b")).await;

        assert_eq!(orchestrator.changer().attempts(), vec!["alice@a", "alice@b"]);
        assert!(!outcome.is_success());
        assert!(!outcome.stopped_early);
        assert_eq!(outcome.failure_count(), 1);
        assert_eq!(outcome.success_count(), 1);
        assert_eq!(
            outcome.reports[1],
            TargetReport {
                target: "alice@b".to_string(),
                error: None,
            }
        );
        assert!(
            outcome.reports[0]
                .error
                .as_deref()
                .unwrap()
                .contains("Authentication failed for user 'alice'")
        );
    }

    #[tokio::test]
    async fn test_all_targets_succeed() {
        let mut orchestrator =
            Orchestrator::new(ScriptedChanger::default(), ErrorPolicy::StopOnError);
        let outcome = orchestrator.run(targets("alice p n a,b,c")).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.success_count(), 3);
        assert!(!outcome.stopped_early);
    }

    #[tokio::test]
    async fn test_malformed_line_fails_without_connecting() {
        let mut orchestrator = Orchestrator::new(
            ScriptedChanger::default(),
            ErrorPolicy::ContinueOnError,
        );

        let outcome = orchestrator
            .run_records(parse_credentials("alice bob\n", &[]))
            .await;

        assert!(orchestrator.changer().attempts().is_empty());
        assert_eq!(outcome.failure_count(), 1);
        assert_eq!(outcome.input_failures[0].line, Some(1));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_comments_and_blank_lines_are_not_attempted() {
        let mut orchestrator = Orchestrator::new(
            ScriptedChanger::default(),
            ErrorPolicy::StopOnError,
        );

        let outcome = orchestrator
            .run_records(parse_credentials("# alice bob charlie\n\n   \n", &[]))
            .await;

        assert!(orchestrator.changer().attempts().is_empty());
        assert_eq!(outcome.failure_count(), 0);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_the_file() {
        let mut orchestrator =
            Orchestrator::new(ScriptedChanger::default(), ErrorPolicy::StopOnError);
        let contents = "alice a1 a2 h1\nbob b1\ncarol c1 c2 h2\n";

        let outcome = orchestrator
            .run_records(parse_credentials(contents, &[]))
            .await;

        assert_eq!(orchestrator.changer().attempts(), vec!["alice@h1"]);
        assert!(outcome.stopped_early);
        assert_eq!(outcome.input_failures[0].line, Some(2));
    }

    #[tokio::test]
    async fn test_failure_inside_a_line_stops_following_lines() {
        let mut orchestrator =
            Orchestrator::new(ScriptedChanger::failing(&["h1"]), ErrorPolicy::StopOnError);
        let contents = "alice a1 a2 h1,h2\ncarol c1 c2 h3\n";

        let outcome = orchestrator
            .run_records(parse_credentials(contents, &[]))
            .await;

        assert_eq!(orchestrator.changer().attempts(), vec!["alice@h1"]);
        assert!(outcome.stopped_early);
    }

    #[tokio::test]
    async fn test_continue_across_lines() {
        let mut orchestrator = Orchestrator::new(
            ScriptedChanger::failing(&["h1"]),
            ErrorPolicy::ContinueOnError,
        );
        let contents = "alice a1 a2 h1,h2\nbob b1\ncarol c1 c2 h3\n";

        let outcome = orchestrator
            .run_records(parse_credentials(contents, &[]))
            .await;

        assert_eq!(
            orchestrator.changer().attempts(),
            vec!["alice@h1", "alice@h2", "carol@h3"]
        );
        assert_eq!(outcome.failure_count(), 2);
        assert_eq!(outcome.success_count(), 2);
    }

    #[tokio::test]
    async fn test_progress_is_printed_for_each_target() {
        let console = SharedSink::default();
        let mut orchestrator = Orchestrator::with_console(
            ScriptedChanger::failing(&["a"]),
            ErrorPolicy::ContinueOnError,
            Box::new(console.clone()),
        );

        orchestrator.run(targets("alice p n a,b")).await;

        assert_eq!(
            console.contents(),
            "Is about to change password for alice@a\n\
             Is about to change password for alice@b\n"
        );
    }
}
