use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::{json::Json, Serialize};
use rocket::Request;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::claim::ClaimError;

/// Seconds a device should wait before resubmitting after `CLAIM_IN_PROGRESS`.
const RETRY_AFTER_SECS: u32 = 5;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unauthorized request")]
    Unauthorized,
    #[error("api key does not grant access to this operation")]
    Forbidden,
    #[error("invalid timestamp {value:?}, expected RFC 3339")]
    InvalidTimestamp { value: String },
    #[error("invalid limit {value:?}, expected a whole number")]
    InvalidLimit { value: String },
    #[error(transparent)]
    Claim(#[from] ClaimError),
}

impl RequestError {
    fn status(&self) -> Status {
        match self {
            Self::Unauthorized => Status::Unauthorized,
            Self::Forbidden => Status::Forbidden,
            Self::InvalidTimestamp { .. } | Self::InvalidLimit { .. } => Status::BadRequest,
            Self::Claim(err) => match err {
                ClaimError::Validation(_) | ClaimError::EmptyName => Status::BadRequest,
                ClaimError::ClaimInProgress | ClaimError::AlreadyResolved { .. } => {
                    Status::Conflict
                }
                ClaimError::NotFound { .. } => Status::NotFound,
                ClaimError::Store(_) => Status::InternalServerError,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidTimestamp { .. } | Self::InvalidLimit { .. } => "VALIDATION",
            Self::Claim(err) => err.code(),
        }
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl<'r> Responder<'r, 'static> for RequestError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        match &self {
            Self::Claim(ClaimError::Store(source)) => {
                error!(uri = %request.uri(), error = %source, "score store failure")
            }
            Self::Claim(err) if err.is_contention() => {
                debug!(uri = %request.uri(), code = err.code(), "request lost a claim race")
            }
            other => info!(uri = %request.uri(), error = %other, "request rejected"),
        }

        let status = self.status();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };

        let mut response = Response::build_from(Json(body).respond_to(request)?);
        response.status(status);
        if matches!(self, Self::Claim(ClaimError::ClaimInProgress)) {
            response.raw_header("Retry-After", RETRY_AFTER_SECS.to_string());
        }
        response.ok()
    }
}

pub type RequestResult<T, E = RequestError> = std::result::Result<T, E>;
