use crate::state::vote::VoteWindowKey;
use crate::types::{Phase, TABLE_SIZE};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while driving a session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Identity could not be established: {0}")]
    AuthFailure(String),

    #[error("Room {0} does not exist")]
    RoomNotFound(String),

    #[error("Store write failed: {0}")]
    WriteFailure(String),

    /// A resolver was invoked in a state it must never observe
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Only the coordinator can {0}")]
    NotCoordinator(&'static str),

    #[error("Cannot {action} during {phase:?}")]
    WrongPhase { action: &'static str, phase: Phase },

    #[error("Room already has {} participants", TABLE_SIZE)]
    RoomFull,

    #[error("Session needs exactly {} participants, found {}", TABLE_SIZE, .0)]
    NotEnoughParticipants(usize),

    #[error("Unknown participant {0}")]
    UnknownParticipant(String),

    #[error("Participant {0} may not vote in the current window")]
    NotEligible(String),

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Voting window {0:?} is not open")]
    AlreadyResolved(VoteWindowKey),

    #[error("Session is over")]
    SessionOver,
}

impl SessionError {
    /// Stable code sent to clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::AuthFailure(_) => "AUTH_FAILURE",
            SessionError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            SessionError::WriteFailure(_) => "WRITE_FAILURE",
            SessionError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            SessionError::NotCoordinator(_) => "NOT_COORDINATOR",
            SessionError::WrongPhase { .. } => "WRONG_PHASE",
            SessionError::RoomFull => "ROOM_FULL",
            SessionError::NotEnoughParticipants(_) => "NOT_ENOUGH_PARTICIPANTS",
            SessionError::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
            SessionError::NotEligible(_) => "NOT_ELIGIBLE",
            SessionError::InvalidVote(_) => "INVALID_VOTE",
            SessionError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            SessionError::SessionOver => "SESSION_OVER",
        }
    }

    /// Whether the client may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::AuthFailure(_))
    }
}
