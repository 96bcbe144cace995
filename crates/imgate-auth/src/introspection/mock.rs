//! Network-free engine for tests and demos.

use crate::AuthResult;
use crate::config::MockBackendConfig;
use crate::error::AuthError;

use super::types::{
    AuthorizationAssignment, AuthorizationContext, IntrospectionResult, PatientAuthorization,
};

/// Scope reported for every mock introspection.
pub const MOCK_SCOPE: &str = "patient/ImagingStudy.rs";

pub(super) fn authorization_context(config: &MockBackendConfig) -> AuthorizationContext {
    let patient = config.patient.clone();
    AuthorizationContext {
        introspected: IntrospectionResult {
            active: true,
            scope: MOCK_SCOPE.to_string(),
            patient: patient
                .as_ref()
                .and_then(|p| p.resolved_id())
                .map(str::to_string),
            sub: None,
        },
        patient,
    }
}

pub(super) fn assign_authorization(
    config: &MockBackendConfig,
) -> AuthResult<AuthorizationAssignment> {
    if config.disabled {
        return Ok(AuthorizationAssignment::AccessControlDisabled);
    }

    let context = authorization_context(config);
    let patient = context.patient.ok_or(AuthError::UnresolvedPatient)?;
    PatientAuthorization::new(patient, context.introspected, config.fhir_base_url.clone())
        .map(AuthorizationAssignment::Authorized)
}
