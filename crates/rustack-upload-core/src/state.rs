//! Transfer lifecycle state machine.
//!
//! ```text
//! Idle --start--> Initiating --provider_ack--> Uploading --all_parts_done--> Completing
//!                                              |     ^                            |
//!                                         pause|     |resume               finalize_ack
//!                                              v     |                            v
//!                                              Paused                         Completed
//!
//! any non-terminal --cancel--> Canceled
//! any non-terminal --fail----> Failed(kind)
//! ```
//!
//! Transitions are a pure function of `(state, event)`; the caller owns the
//! state and applies the returned value.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Lifecycle state of one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// Created, nothing sent yet.
    #[default]
    Idle,
    /// Creating the multipart upload (no-op for single-shot uploads).
    Initiating,
    /// Parts are being dispatched.
    Uploading,
    /// Dispatch suspended; in-flight parts drain.
    Paused,
    /// Canceled by the caller. Terminal.
    Canceled,
    /// Finalize request in flight.
    Completing,
    /// Object finalized. Terminal.
    Completed,
    /// Stopped with an error. Terminal.
    Failed(ErrorKind),
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// The transfer was started.
    Start,
    /// The provider acknowledged initiation.
    ProviderAck,
    /// Every part has a recorded result.
    AllPartsDone,
    /// The provider acknowledged finalization.
    FinalizeAck,
    /// The caller paused the transfer.
    Pause,
    /// The caller resumed the transfer.
    Resume,
    /// The caller canceled the transfer.
    Cancel,
    /// A fatal error occurred.
    Fail(ErrorKind),
}

/// A transition that is not allowed from the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event} in state {state}")]
pub struct InvalidTransition {
    /// Name of the current state.
    pub state: &'static str,
    /// Name of the rejected event.
    pub event: &'static str,
}

impl TransferState {
    /// Whether no further parts may be dispatched.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed(_))
    }

    /// Short state name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Initiating => "Initiating",
            Self::Uploading => "Uploading",
            Self::Paused => "Paused",
            Self::Canceled => "Canceled",
            Self::Completing => "Completing",
            Self::Completed => "Completed",
            Self::Failed(_) => "Failed",
        }
    }

    /// Compute the state after `event`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `event` is not accepted in this state.
    pub fn transition(&self, event: TransferEvent) -> Result<Self, InvalidTransition> {
        use TransferEvent as E;

        let next = match (self, &event) {
            (Self::Idle, E::Start) => Self::Initiating,
            (Self::Initiating, E::ProviderAck) | (Self::Paused, E::Resume) => Self::Uploading,
            (Self::Uploading, E::Pause) => Self::Paused,
            (Self::Uploading, E::AllPartsDone) => Self::Completing,
            (Self::Completing, E::FinalizeAck) => Self::Completed,
            (state, E::Cancel) if !state.is_terminal() => Self::Canceled,
            (state, E::Fail(kind)) if !state.is_terminal() => Self::Failed(kind.clone()),
            _ => {
                return Err(InvalidTransition {
                    state: self.name(),
                    event: event.name(),
                });
            }
        };
        Ok(next)
    }
}

impl TransferEvent {
    /// Short event name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ProviderAck => "provider_ack",
            Self::AllPartsDone => "all_parts_done",
            Self::FinalizeAck => "finalize_ack",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::Fail(_) => "fail",
        }
    }
}
