use crate::*;

use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("aggregator: invalid payload: {0}")]
    InvalidPayload(String),

    #[error("aggregator: invalid request: {0}")]
    InvalidRequest(String),

    #[error("aggregator: election {0} not found or not initialized")]
    ElectionNotFound(ElectionId),

    #[error("aggregator: simulation {0} not found")]
    SimulationNotFound(SimulationId),

    #[error("aggregator: election {0} is concluded and accepts no more ballots")]
    ElectionConcluded(ElectionId),

    #[error("aggregator: no votes recorded for election {0}")]
    NoVotesYet(ElectionId),

    #[error("aggregator: election {election} has {count} of {expected} ballots")]
    NotConcluded {
        election: ElectionId,
        count: u64,
        expected: u64,
    },

    #[error("aggregator: ballot exponent {found} does not match accumulator exponent {expected}")]
    ExponentMismatch { expected: i64, found: i64 },

    #[error("aggregator: {collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("aggregator: {collaborator} rejected the request: {reason}")]
    Collaborator {
        collaborator: &'static str,
        reason: String,
    },

    #[error("aggregator: decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("aggregator: simulation {simulation_id} failed: {cause}")]
    SimulationFailed {
        simulation_id: SimulationId,
        #[source]
        cause: Box<Error>,
    },

    #[error("aggregator: storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("aggregator: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the same call may succeed if it is simply retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::CollaboratorUnavailable { .. } => true,
            Error::SimulationFailed { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn unavailable(collaborator: &'static str, reason: impl ToString) -> Self {
        Error::CollaboratorUnavailable {
            collaborator,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn rejected(collaborator: &'static str, reason: impl ToString) -> Self {
        Error::Collaborator {
            collaborator,
            reason: reason.to_string(),
        }
    }
}
