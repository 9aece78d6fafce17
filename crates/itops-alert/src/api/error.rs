// ── HTTP error mapping ──
//
// Handlers return `Result<_, ApiError>`; every failure leaves as
// `{"error": <code>, "message": <text>}` with a status per error class.

use axum::Json;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use itops_alert_core::CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed path parameter or body content.
    #[error("{0}")]
    BadRequest(String),

    /// Body could not be read or decoded by an extractor.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::Core(err) => match err {
                CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                CoreError::PreconditionViolated { .. } | CoreError::Normalize { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CoreError::Cancelled | CoreError::TransientIo { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Rejected { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            Self::Rejected { .. } => "invalid_body",
            Self::Core(err) => match err {
                CoreError::NotFound { .. } => "not_found",
                CoreError::PreconditionViolated { .. } => "precondition_violated",
                CoreError::Normalize { .. } => "invalid_event",
                CoreError::Cancelled | CoreError::TransientIo { .. } => "unavailable",
                _ => "internal",
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Decode failures are client errors regardless of axum's 422.
        let status = match rejection.status() {
            StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
            other => other,
        };
        Self::Rejected {
            status,
            message: rejection.body_text(),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        } else {
            warn!(%status, error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (
                CoreError::NotFound {
                    entity_type: "problem",
                    identifier: "7".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::PreconditionViolated {
                    message: "problem 7 is not open".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (CoreError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
            (
                CoreError::PermanentIo {
                    message: "mapping conflict".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn not_found_code() {
        let err = ApiError::from(CoreError::NotFound {
            entity_type: "problem",
            identifier: "7".into(),
        });
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "Not found: problem 7");
    }
}
