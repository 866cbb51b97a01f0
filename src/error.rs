// Error taxonomy shared by every command path.

use crate::models::CompetitionStatus;
use crate::rate_limit::RateLimitError;
use crate::stats::StatsError;
use crate::store::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Malformed or out-of-range input. Never persisted.
    #[error("{0}")]
    Validation(String),

    /// A manager refused the request (duplicate join, full, ineligible, bad progress).
    #[error("{0}")]
    Rejected(String),

    #[error("you are not allowed to do that")]
    Unauthorized,

    #[error("competition {id} is {status}: {reason}")]
    InvalidState {
        id: String,
        status: CompetitionStatus,
        reason: String,
    },

    #[error("this server already has the maximum of {limit} active competitions")]
    LimitExceeded { limit: usize },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("unknown competition type '{tag}' (supported: {supported})")]
    UnknownType { tag: String, supported: String },

    /// Account-link bijection violated.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("stats provider unavailable: {0}")]
    ExternalUnavailable(String),
}

impl BotError {
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind, used by the transport adapter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Rejected(_) => "rejected",
            Self::Unauthorized => "unauthorized",
            Self::InvalidState { .. } => "invalid_state",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::NotFound { .. } => "not_found",
            Self::UnknownType { .. } => "unknown_type",
            Self::Conflict(_) => "conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::Storage(_) => "storage_failure",
            Self::ExternalUnavailable(_) => "external_unavailable",
        }
    }

    /// Text safe to show the actor. Storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage(_) => "Something went wrong saving that. Please try again later.".into(),
            Self::ExternalUnavailable(_) => {
                "The stats service is unavailable right now. Please try again shortly.".into()
            }
            other => other.to_string(),
        }
    }

    /// Whether the triggering command can be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::ExternalUnavailable(_) | Self::RateLimited(_)
        )
    }
}

impl From<StatsError> for BotError {
    fn from(e: StatsError) -> Self {
        match e {
            StatsError::NotFound(name) => Self::NotFound {
                what: "player",
                id: name,
            },
            other => Self::ExternalUnavailable(other.to_string()),
        }
    }
}
