//! Epic-style quirks.
//!
//! The discovery document does not advertise an introspection endpoint; it
//! sits next to the token endpoint. The token's `sub` is a complete Patient
//! URL rather than a user id.

use imgate_core::Patient;

use crate::AuthResult;
use crate::error::AuthError;

use super::client::SmartBackendClient;
use super::types::IntrospectionResult;

/// Derives the introspection endpoint by replacing a trailing `/token` with
/// `/introspect`.
///
/// # Errors
///
/// Returns `AuthError::UpstreamDiscovery` if the token endpoint does not end
/// in `/token`.
pub fn derive_introspection_endpoint(token_endpoint: &str) -> AuthResult<String> {
    token_endpoint
        .strip_suffix("/token")
        .map(|base| format!("{base}/introspect"))
        .ok_or_else(|| {
            AuthError::upstream_discovery(format!(
                "cannot derive introspection endpoint from token endpoint {token_endpoint}"
            ))
        })
}

/// Resolves the patient by fetching the `sub` URL with the backend token.
pub(super) async fn resolve_patient(
    client: &SmartBackendClient,
    introspected: &IntrospectionResult,
    access_token: &str,
) -> AuthResult<Option<Patient>> {
    match introspected.sub.as_deref().filter(|sub| !sub.is_empty()) {
        Some(sub) => client.fetch_patient(sub, access_token).await,
        None => Ok(None),
    }
}
