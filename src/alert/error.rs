use thiserror::Error;

use super::state::{AlertStatus, SessionId};

#[derive(Debug, Error)]
pub enum AlertError {
    /// Caller must prompt the user instead of defaulting.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot {action} alert {session_id} while it is {status:?}")]
    InvalidState {
        session_id: SessionId,
        status: AlertStatus,
        action: String,
    },

    #[error("an alert is already counting down ({0})")]
    AlreadyActive(SessionId),

    #[error("alert {0} not found")]
    SessionNotFound(SessionId),

    /// Non-fatal: the session stays dispatched.
    #[error("alert {session_id} could not be delivered: {reason}")]
    DeliveryFailure {
        session_id: SessionId,
        reason: String,
    },
}

impl AlertError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            AlertError::InvalidState { .. } | AlertError::AlreadyActive(_)
        )
    }
}

pub type AlertResult<T> = Result<T, AlertError>;
