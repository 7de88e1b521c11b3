//! Recovery of a single offending operation
//!
//! A recovery moves through `Requested -> Attempting -> Restored` or ends in
//! `NotRestorable`. Deletions are undone from the trash, overwrites by
//! reverting to the prior version. Creations and renames have no prior good
//! content and are never restorable. A failed restore is reported once and
//! never retried.

use crate::monitor::{Command, FileOperation};
use crate::storage::{Restorer, UserContext};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How an operation can be undone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreAction {
    /// Move the deleted item back out of the trash
    FromTrash,
    /// Put back the version the write replaced
    RevertVersion,
    /// Nothing to go back to
    Unsupported,
}

/// Recovery progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Requested,
    Attempting(RestoreAction),
    Restored,
    NotRestorable,
}

/// Terminal result of a recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Restored,
    NotRestorable,
}

impl RecoveryOutcome {
    pub fn is_success(self) -> bool {
        self == RecoveryOutcome::Restored
    }
}

/// Determine how an operation of the given kind could be undone
pub fn determine_action(command: Command) -> RestoreAction {
    match command {
        Command::Delete => RestoreAction::FromTrash,
        Command::Write => RestoreAction::RevertVersion,
        Command::Create | Command::Rename => RestoreAction::Unsupported,
    }
}

/// Outcome for a command given whether the restoration succeeded
pub fn decide(command: Command, restored: bool) -> RecoveryOutcome {
    match determine_action(command) {
        RestoreAction::Unsupported => RecoveryOutcome::NotRestorable,
        _ if restored => RecoveryOutcome::Restored,
        _ => RecoveryOutcome::NotRestorable,
    }
}

/// One recovery request for a historical operation
#[derive(Debug)]
pub struct Recovery<'a> {
    op: &'a FileOperation,
    state: RecoveryState,
}

impl<'a> Recovery<'a> {
    pub fn new(op: &'a FileOperation) -> Self {
        Self {
            op,
            state: RecoveryState::Requested,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Run the restore once and settle on a terminal state
    pub fn run(&mut self, ctx: &UserContext, restorer: &dyn Restorer) -> RecoveryOutcome {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }

        let action = determine_action(self.op.command);
        let restored = match action {
            RestoreAction::Unsupported => {
                warn!(
                    "{:?} of {} has no prior version to restore",
                    self.op.command, self.op.path
                );
                false
            }
            RestoreAction::FromTrash | RestoreAction::RevertVersion => {
                self.state = RecoveryState::Attempting(action);
                let attempt = match action {
                    RestoreAction::FromTrash => restorer.restore_from_trash(ctx, self.op),
                    _ => restorer.revert_to_version(ctx, self.op),
                };
                attempt.unwrap_or_else(|e| {
                    warn!("Restoring {} failed: {}", self.op.path, e);
                    false
                })
            }
        };

        let outcome = decide(self.op.command, restored);
        self.state = match outcome {
            RecoveryOutcome::Restored => RecoveryState::Restored,
            RecoveryOutcome::NotRestorable => RecoveryState::NotRestorable,
        };
        info!(
            "Recovery of {:?} {} (id {:?}): {:?}",
            self.op.command, self.op.path, self.op.id, outcome
        );
        outcome
    }

    fn outcome(&self) -> Option<RecoveryOutcome> {
        match self.state {
            RecoveryState::Restored => Some(RecoveryOutcome::Restored),
            RecoveryState::NotRestorable => Some(RecoveryOutcome::NotRestorable),
            _ => None,
        }
    }
}
