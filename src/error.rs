use crate::state::TicketStatus;

/// Error taxonomy returned by every core workflow operation.
///
/// Everything except notification delivery aborts the operation with no
/// state change. `Conflict` carries the persisted status so the caller can
/// refresh and retry the user's intent instead of blindly resubmitting.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("invalid `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("not permitted: {reason}")]
    Authorization { reason: String },
    #[error("expected status `{expected}` but ticket is `{actual}`")]
    Conflict {
        expected: TicketStatus,
        actual: TicketStatus,
    },
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error("codec failure: {0}")]
    Codec(String),
}

impl WorkflowError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
