//! `IntoResponse` for [`AuthError`].
//!
//! Errors become FHIR OperationOutcome bodies. Authorization denials and
//! upstream failures carry fixed diagnostics; the detailed cause is logged
//! and never sent to the caller.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const REALM: &str = "imgate";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, issue_code, diagnostics) = error_details(&self);

        if self.is_upstream() || status.is_server_error() {
            tracing::warn!(category = %self.category(), error = %self, "Request failed");
        } else {
            tracing::info!(category = %self.category(), error = %self, "Request denied");
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json"),
        );
        if status == StatusCode::UNAUTHORIZED
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer realm=\"{REALM}\""))
        {
            headers.insert(header::WWW_AUTHENTICATE, value);
        }

        let body = operation_outcome_json("error", issue_code, diagnostics);
        (status, headers, Json(body)).into_response()
    }
}

/// Returns (HTTP status, FHIR issue code, diagnostics).
fn error_details(error: &AuthError) -> (StatusCode, &'static str, &'static str) {
    match error {
        AuthError::MissingCredential => (
            StatusCode::UNAUTHORIZED,
            "login",
            "Cannot authorize without an access token",
        ),
        AuthError::InactiveToken
        | AuthError::InsufficientScope
        | AuthError::UnresolvedPatient
        | AuthError::CapabilityMismatch { .. } => (
            StatusCode::FORBIDDEN,
            "forbidden",
            "Access to the requested imaging is not permitted",
        ),
        AuthError::UpstreamDiscovery { .. }
        | AuthError::UpstreamToken { .. }
        | AuthError::UpstreamIntrospection { .. }
        | AuthError::UpstreamPatient { .. }
        | AuthError::UpstreamProxy { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "transient",
            "An upstream service is unavailable",
        ),
        AuthError::Configuration { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "exception",
            "Server configuration error",
        ),
        AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "exception",
            "Internal server error",
        ),
    }
}

/// Creates a FHIR OperationOutcome JSON with a single issue.
#[must_use]
pub fn operation_outcome_json(severity: &str, code: &str, diagnostics: &str) -> serde_json::Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": severity,
            "code": code,
            "diagnostics": diagnostics
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_response() {
        let response = AuthError::MissingCredential.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "application/fhir+json"
        );
        assert_eq!(
            headers.get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"imgate\""
        );
    }

    #[tokio::test]
    async fn test_denials_are_forbidden_and_generic() {
        for error in [
            AuthError::InactiveToken,
            AuthError::InsufficientScope,
            AuthError::UnresolvedPatient,
            AuthError::capability_mismatch("token was issued for a different patient"),
        ] {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));

            let json = body_json(response).await;
            assert_eq!(json["issue"][0]["code"], "forbidden");
            assert!(
                !json["issue"][0]["diagnostics"]
                    .as_str()
                    .unwrap()
                    .contains("patient")
            );
        }
    }

    #[tokio::test]
    async fn test_upstream_errors_hide_detail() {
        let response =
            AuthError::upstream_introspection("connect to 10.0.0.5:443 refused").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let json = body_json(response).await;
        assert_eq!(json["resourceType"], "OperationOutcome");
        assert_eq!(json["issue"][0]["severity"], "error");
        assert_eq!(json["issue"][0]["code"], "transient");
        assert!(!json.to_string().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_configuration_error_response() {
        let response = AuthError::configuration("bad key").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_operation_outcome_json() {
        let json = operation_outcome_json("error", "processing", "Patient has no MRN");
        assert_eq!(json["issue"][0]["code"], "processing");
        assert_eq!(json["issue"][0]["diagnostics"], "Patient has no MRN");
    }
}
