//! Password change driver.
//!
//! The driver layer turns the channel primitives into the `passwd`
//! dialogue and runs it against one target at a time.

mod changer;
mod protocol;

pub use changer::CredentialChanger;
pub use protocol::{
    CHANGE_COMMAND, Escalation, PasswordChange, PolicyTable, Prompts, Step, StepOutcome,
    StepPolicy, Transcript,
};
