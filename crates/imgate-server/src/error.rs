//! Gateway error type.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use imgate_auth::AuthError;
use imgate_auth::middleware::operation_outcome_json;

/// Errors raised by the gateway's routes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Authorization, capability, or upstream failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Study lookup by MRN was requested for a patient without one.
    #[error("Patient has no medical record number identifier")]
    MissingMrn,

    /// Malformed request (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, diagnostics) = match self {
            Self::Auth(err) => return err.into_response(),
            Self::MissingMrn => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "processing",
                self.to_string(),
            ),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid", self.to_string()),
            Self::Internal(ref message) => {
                tracing::error!(error = %message, "Internal gateway error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "exception",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = operation_outcome_json("error", code, &diagnostics);
        (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/fhir+json"),
            )],
            Json(body),
        )
            .into_response()
    }
}
