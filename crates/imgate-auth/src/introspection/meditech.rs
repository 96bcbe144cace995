//! Meditech-style quirks.
//!
//! This server cannot issue backend-services tokens or bind a patient to an
//! introspected token, so the trust model is weaker:
//!
//! - introspection is authenticated with the client id and secret over HTTP
//!   Basic, which only works when the viewer and the gateway share a client;
//! - the patient comes from the caller's `patient` query parameter and
//!   overwrites whatever the introspection response says;
//! - the patient is fetched with the caller's own token, so the EHR's access
//!   checks on that token are the only proof the binding is legitimate.
//!
//! Requests without a `patient` parameter, such as an image viewer following
//! a WADO-RS link with its bearer token, establish no patient at all; the
//! capability token's own binding then stands alone.

use crate::AuthResult;
use crate::error::AuthError;

use super::client::{IntrospectionAuth, SmartBackendClient};
use super::types::{AuthorizationContext, AuthorizationRequest};

/// Takes the last `/` segment of a `patient` hint, so `Patient/123` is `123`.
#[must_use]
pub fn patient_id_from_hint(hint: &str) -> Option<&str> {
    hint.rsplit('/').next().filter(|id| !id.is_empty())
}

pub(super) async fn authorization_context(
    client: &SmartBackendClient,
    request: &AuthorizationRequest,
    caller_token: &str,
) -> AuthResult<AuthorizationContext> {
    let smart = client.smart_configuration().await?;
    let endpoint = smart.introspection_endpoint.as_deref().ok_or_else(|| {
        AuthError::upstream_discovery("SMART configuration has no introspection_endpoint")
    })?;

    let mut introspected = client
        .introspect(endpoint, caller_token, IntrospectionAuth::ClientBasic)
        .await?;

    let patient_id = request
        .patient_hint
        .as_deref()
        .and_then(patient_id_from_hint)
        .map(str::to_string);
    introspected.patient = patient_id;

    let patient = match introspected.patient.as_deref() {
        Some(id) if introspected.active => {
            tracing::debug!(patient_id = id, "Fetching caller-asserted patient");
            client
                .fetch_patient(&client.patient_url(id), caller_token)
                .await?
        }
        _ => None,
    };

    Ok(AuthorizationContext {
        introspected,
        patient,
    })
}
