//! Batch processing of credential records across hosts.

mod orchestrator;
mod target;

pub use orchestrator::{BatchOutcome, InputFailure, Orchestrator, TargetReport};
pub use target::{
    CredentialEntry, CredentialRecord, Target, parse_credentials, parse_line, read_credentials,
    split_hosts,
};

use std::future::Future;

use crate::error::Result;

/// What to do after a target fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the remaining targets.
    StopOnError,

    /// Record the failure and move on.
    ContinueOnError,
}

/// Changes the password for one target, end to end.
pub trait PasswordChanger {
    /// Connect, run the password change dialogue and disconnect.
    fn change(&self, target: &Target) -> impl Future<Output = Result<()>>;
}
