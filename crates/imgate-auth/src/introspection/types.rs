//! Values passed through the introspection flow.

use imgate_core::Patient;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;

/// Response of an RFC 7662 token introspection call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    /// Whether the token is currently active.
    #[serde(default)]
    pub active: bool,

    /// Space-delimited granted scopes.
    #[serde(default)]
    pub scope: String,

    /// Patient in context (SMART launch context).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Subject of the token. Epic-style servers put a full resource URL here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Response of the client-credentials grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    /// Bearer token for calls to the EHR and the introspection endpoint.
    pub access_token: String,

    /// Lifetime in seconds. The token is used once and never cached.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// The request-scoped inputs an engine needs.
///
/// Built by the middleware from the inbound HTTP request; the engine never
/// looks at the request itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Bearer token presented by the caller, if any.
    pub bearer_token: Option<String>,

    /// Raw value of the `patient` query parameter, if any.
    pub patient_hint: Option<String>,
}

impl AuthorizationRequest {
    /// Creates a request carrying only a bearer token.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            patient_hint: None,
        }
    }

    /// Sets the `patient` query parameter value.
    #[must_use]
    pub fn with_patient_hint(mut self, hint: impl Into<String>) -> Self {
        self.patient_hint = Some(hint.into());
        self
    }

    /// Extracts the `patient` parameter from a raw query string.
    #[must_use]
    pub fn patient_hint_from_query(query: Option<&str>) -> Option<String> {
        url::form_urlencoded::parse(query?.as_bytes())
            .find(|(key, _)| key == "patient")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    }
}

/// What an engine learned about the caller's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    /// Introspection response (after any variant-specific rewriting).
    pub introspected: IntrospectionResult,
    /// Patient resolved for the token, if any.
    pub patient: Option<Patient>,
}

/// A grant of imaging access for one patient.
///
/// Can only be built around a patient with a non-empty id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientAuthorization {
    patient: Patient,
    patient_id: String,
    introspected: IntrospectionResult,
    ehr_base_url: String,
}

impl PatientAuthorization {
    /// Binds an introspection result to a resolved patient.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnresolvedPatient` if the patient has no id.
    pub fn new(
        patient: Patient,
        introspected: IntrospectionResult,
        ehr_base_url: impl Into<String>,
    ) -> AuthResult<Self> {
        let patient_id = patient
            .resolved_id()
            .ok_or(AuthError::UnresolvedPatient)?
            .to_string();

        Ok(Self {
            patient,
            patient_id,
            introspected,
            ehr_base_url: ehr_base_url.into(),
        })
    }

    /// The authorized patient.
    #[must_use]
    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    /// The authorized patient's logical id. Never empty.
    #[must_use]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    #[must_use]
    pub fn introspected(&self) -> &IntrospectionResult {
        &self.introspected
    }

    #[must_use]
    pub fn ehr_base_url(&self) -> &str {
        &self.ehr_base_url
    }
}

/// The authorization decision attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationAssignment {
    /// The caller may see imaging for exactly this patient.
    Authorized(PatientAuthorization),
    /// Access control is switched off (mock deployments only).
    AccessControlDisabled,
}

impl AuthorizationAssignment {
    /// Returns the authorized patient id, or `None` when access control is off.
    #[must_use]
    pub fn patient_id(&self) -> Option<&str> {
        match self {
            Self::Authorized(grant) => Some(grant.patient_id()),
            Self::AccessControlDisabled => None,
        }
    }

    /// Returns the authorized patient, or `None` when access control is off.
    #[must_use]
    pub fn patient(&self) -> Option<&Patient> {
        match self {
            Self::Authorized(grant) => Some(grant.patient()),
            Self::AccessControlDisabled => None,
        }
    }

    #[must_use]
    pub fn is_access_control_disabled(&self) -> bool {
        matches!(self, Self::AccessControlDisabled)
    }
}
