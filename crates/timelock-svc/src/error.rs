//! Error responses

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use timelock_api::{ErrorBody, CAUSE_DECRYPTION, CAUSE_INTERNAL, CAUSE_MALFORMED, CAUSE_TOO_EARLY};
use timelock_core::ErrorCategory;
use tracing::{debug, warn};

/// Request failure, answered with 400 and a `{cause, message}` body
#[derive(Debug)]
pub struct ApiError {
    cause: &'static str,
    message: String,
}

impl ApiError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            cause: CAUSE_MALFORMED,
            message: message.into(),
        }
    }
}

impl From<timelock_core::Error> for ApiError {
    fn from(e: timelock_core::Error) -> Self {
        let cause = match e.category() {
            ErrorCategory::Malformed => CAUSE_MALFORMED,
            ErrorCategory::TooEarly => CAUSE_TOO_EARLY,
            ErrorCategory::Crypto => CAUSE_DECRYPTION,
            ErrorCategory::Internal => {
                warn!(error = %e, "Internal error while serving request");
                CAUSE_INTERNAL
            }
        };
        Self {
            cause,
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(cause = self.cause, message = %self.message, "Request rejected");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                cause: self.cause.to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}
