use thiserror::Error;
use validator::ValidationErrors;

use crate::database::{ScoreId, StoreError};

pub type ClaimResult<T> = Result<T, ClaimError>;

#[derive(Debug, Error)]
pub enum ClaimError {
    /// The input never reached the store.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    /// Another score is still waiting for its name; retry shortly.
    #[error("a score is already waiting for a name, try again shortly")]
    ClaimInProgress,
    /// The record was named or expired by someone else first.
    #[error("score {id} has already been resolved")]
    AlreadyResolved { id: ScoreId },
    #[error("name is empty")]
    EmptyName,
    #[error("no score with id {id}")]
    NotFound { id: ScoreId },
    #[error("score store failure")]
    Store(#[from] StoreError),
}

impl ClaimError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::ClaimInProgress => "CLAIM_IN_PROGRESS",
            Self::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            Self::EmptyName => "EMPTY_NAME",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Store(_) => "STORE_FAILURE",
        }
    }

    /// Contention errors are expected under races and safe to retry or ignore.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::ClaimInProgress | Self::AlreadyResolved { .. })
    }
}
