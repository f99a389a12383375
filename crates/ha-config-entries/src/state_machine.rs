//! Config entry lifecycle
//!
//! ```text
//! NotLoaded -> SetupInProgress -> Loaded
//!                              -> SetupError     -> SetupInProgress
//!                              -> SetupRetry     -> SetupInProgress
//!                              -> MigrationError (terminal)
//!
//! Loaded | SetupError | SetupRetry -> UnloadInProgress -> NotLoaded
//!                                                      -> FailedUnload (terminal)
//! ```

use crate::entry::ConfigEntryState;
use thiserror::Error;

/// A lifecycle move that is not allowed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
    pub reason: &'static str,
}

impl ConfigEntryState {
    /// The target state if the move is allowed
    pub fn try_transition(
        self,
        to: ConfigEntryState,
    ) -> Result<ConfigEntryState, InvalidTransition> {
        use ConfigEntryState::*;

        let valid = matches!(
            (self, to),
            (NotLoaded, SetupInProgress)
                | (SetupInProgress, Loaded | SetupError | SetupRetry | MigrationError)
                | (SetupError | SetupRetry, SetupInProgress)
                | (Loaded | SetupError | SetupRetry, UnloadInProgress)
                | (UnloadInProgress, NotLoaded | FailedUnload)
        );

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: rejection_reason(self, to),
            })
        }
    }

    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.try_transition(to).is_ok()
    }
}

fn rejection_reason(from: ConfigEntryState, to: ConfigEntryState) -> &'static str {
    use ConfigEntryState::*;

    match (from, to) {
        (MigrationError | FailedUnload, _) => "state is terminal",
        (Loaded, SetupInProgress) => "already loaded, unload first",
        (NotLoaded, _) => "setup has not started",
        (_, Loaded | SetupError | SetupRetry) => "setup is not in progress",
        (_, NotLoaded) => "unload is not in progress",
        _ => "not a lifecycle step",
    }
}

/// Seconds to wait before setup attempt `tries` is retried
///
/// `2^min(tries, 4) * 5`, i.e. 5, 10, 20, 40 and then 80 seconds, plus up to
/// 100ms of jitter.
pub fn calculate_retry_delay(tries: u32) -> f64 {
    let base_delay = 2_u32.pow(tries.min(4)) * 5;
    let jitter = rand::random::<f64>() * 0.1;
    base_delay as f64 + jitter
}
