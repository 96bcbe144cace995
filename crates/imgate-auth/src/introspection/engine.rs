//! The introspection engine.
//!
//! One engine is built at startup from [`AuthorizationBackendConfig`] and
//! shared by every request. The flow for the network-backed variants is:
//!
//! 1. obtain a backend access token (client credentials + signed assertion)
//! 2. introspect the caller's bearer token
//! 3. resolve the patient the token is bound to
//! 4. check the token is active, carries an imaging scope and has a patient
//!
//! Each variant overrides only the steps its vendor gets wrong.

use imgate_core::Patient;

use crate::AuthResult;
use crate::config::{AuthorizationBackendConfig, DiscoveryConfig, MockBackendConfig};
use crate::error::AuthError;
use crate::smart::ImagingScopePolicy;

use super::client::{IntrospectionAuth, SmartBackendClient};
use super::types::{
    AuthorizationAssignment, AuthorizationContext, AuthorizationRequest, IntrospectionResult,
    PatientAuthorization,
};
use super::{epic, meditech, mock};

/// Authorization engine, one variant per supported authorization server.
pub enum IntrospectionEngine {
    /// Standards-conformant SMART backend services.
    Standard(SmartBackendClient),
    /// Epic-style server.
    Epic(SmartBackendClient),
    /// Meditech-style server (caller-asserted patient).
    Meditech(SmartBackendClient),
    /// No network; fixed patient or access control disabled.
    Mock(MockBackendConfig),
}

impl IntrospectionEngine {
    /// Builds the engine selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the configuration is invalid for
    /// the selected variant or the client key cannot be loaded.
    pub fn from_config(
        config: &AuthorizationBackendConfig,
        http: reqwest::Client,
        discovery: DiscoveryConfig,
    ) -> AuthResult<Self> {
        config.validate()?;

        let engine = match config {
            AuthorizationBackendConfig::SmartOnFhir(c) => {
                Self::Standard(SmartBackendClient::from_config(c, http, discovery)?)
            }
            AuthorizationBackendConfig::SmartOnFhirWithEpicBugfixes(c) => {
                Self::Epic(SmartBackendClient::from_config(c, http, discovery)?)
            }
            AuthorizationBackendConfig::SmartOnFhirWithMeditechBugfixes(c) => {
                tracing::warn!(
                    fhir_base_url = %c.fhir_base_url,
                    "Meditech-style authorization: the patient binding is asserted by the caller \
                     and not verified by the authorization server"
                );
                Self::Meditech(SmartBackendClient::from_config(c, http, discovery)?)
            }
            AuthorizationBackendConfig::Mock(c) => {
                tracing::warn!(
                    disabled = c.disabled,
                    "Mock authorization engine in use; tokens are not checked"
                );
                Self::Mock(c.clone())
            }
        };

        tracing::info!(variant = engine.variant(), "Authorization engine initialized");
        Ok(engine)
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Standard(_) => "smart-on-fhir",
            Self::Epic(_) => "smart-on-fhir-with-epic-bugfixes",
            Self::Meditech(_) => "smart-on-fhir-with-meditech-bugfixes",
            Self::Mock(_) => "mock",
        }
    }

    /// Returns `false` for engines that authorize without a bearer token.
    #[must_use]
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, Self::Mock(_))
    }

    /// Returns `true` when the patient can only come from the caller's
    /// `patient` query parameter.
    #[must_use]
    pub fn requires_patient_hint(&self) -> bool {
        matches!(self, Self::Meditech(_))
    }

    /// The scope allow-list this variant applies.
    #[must_use]
    pub fn scope_policy(&self) -> ImagingScopePolicy {
        match self {
            Self::Standard(_) | Self::Mock(_) => ImagingScopePolicy::STANDARD,
            Self::Epic(_) | Self::Meditech(_) => ImagingScopePolicy::VENDOR,
        }
    }

    /// Returns `true` if the introspected scopes grant imaging access.
    #[must_use]
    pub fn allows_imaging(&self, introspected: &IntrospectionResult) -> bool {
        self.scope_policy().allows(&introspected.scope)
    }

    /// The EHR backend client, absent for the mock engine.
    #[must_use]
    pub fn backend(&self) -> Option<&SmartBackendClient> {
        match self {
            Self::Standard(c) | Self::Epic(c) | Self::Meditech(c) => Some(c),
            Self::Mock(_) => None,
        }
    }

    /// Resolves the introspection endpoint for this variant.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamDiscovery` if discovery fails or yields no
    /// usable endpoint, and `AuthError::Configuration` for the mock engine.
    pub async fn introspection_endpoint(&self) -> AuthResult<String> {
        match self {
            Self::Standard(c) | Self::Meditech(c) => c
                .smart_configuration()
                .await?
                .introspection_endpoint
                .clone()
                .ok_or_else(|| {
                    AuthError::upstream_discovery(
                        "SMART configuration has no introspection_endpoint",
                    )
                }),
            Self::Epic(c) => {
                let smart = c.smart_configuration().await?;
                epic::derive_introspection_endpoint(&smart.token_endpoint)
            }
            Self::Mock(_) => Err(AuthError::configuration(
                "mock engine has no introspection endpoint",
            )),
        }
    }

    /// Resolves the patient an introspected token is bound to.
    ///
    /// `bearer` is the credential for the Patient read: the backend access
    /// token, or the caller's own token for the Meditech variant.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamPatient` if the EHR cannot be reached.
    pub async fn resolve_patient(
        &self,
        introspected: &IntrospectionResult,
        bearer: &str,
    ) -> AuthResult<Option<Patient>> {
        match self {
            Self::Standard(c) | Self::Meditech(c) => {
                match introspected.patient.as_deref().filter(|id| !id.is_empty()) {
                    Some(id) => c.fetch_patient(&c.patient_url(id), bearer).await,
                    None => Ok(None),
                }
            }
            Self::Epic(c) => epic::resolve_patient(c, introspected, bearer).await,
            Self::Mock(c) => Ok(c.patient.clone()),
        }
    }

    /// Introspects the caller's token and resolves its patient.
    ///
    /// The patient is only looked up for active tokens.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredential` if a network-backed engine gets
    /// no bearer token, or any upstream error from the individual steps.
    pub async fn authorization_context(
        &self,
        request: &AuthorizationRequest,
    ) -> AuthResult<AuthorizationContext> {
        let client = match self {
            Self::Mock(c) => return Ok(mock::authorization_context(c)),
            Self::Standard(c) | Self::Epic(c) | Self::Meditech(c) => c,
        };

        let caller_token = request
            .bearer_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        if let Self::Meditech(_) = self {
            return meditech::authorization_context(client, request, caller_token).await;
        }

        let access_token = client.get_access_token().await?;
        let endpoint = self.introspection_endpoint().await?;
        let introspected = client
            .introspect(&endpoint, caller_token, IntrospectionAuth::Bearer(&access_token))
            .await?;

        let patient = if introspected.active {
            self.resolve_patient(&introspected, &access_token).await?
        } else {
            None
        };

        Ok(AuthorizationContext {
            introspected,
            patient,
        })
    }

    /// Decides whether the request may see imaging, and for which patient.
    ///
    /// # Errors
    ///
    /// - `MissingCredential` if no bearer token was presented
    /// - `InactiveToken` if introspection reports the token inactive
    /// - `InsufficientScope` if no imaging scope was granted
    /// - `UnresolvedPatient` if no patient with an id could be resolved
    /// - any upstream error from discovery, token exchange, introspection or
    ///   the patient lookup
    pub async fn assign_authorization(
        &self,
        request: &AuthorizationRequest,
    ) -> AuthResult<AuthorizationAssignment> {
        let client = match self {
            Self::Mock(c) => return mock::assign_authorization(c),
            Self::Standard(c) | Self::Epic(c) | Self::Meditech(c) => c,
        };

        let context = self.authorization_context(request).await?;

        if !context.introspected.active {
            tracing::info!(variant = self.variant(), "Rejected inactive access token");
            return Err(AuthError::InactiveToken);
        }
        if !self.allows_imaging(&context.introspected) {
            tracing::info!(
                variant = self.variant(),
                scope = %context.introspected.scope,
                "Rejected access token without imaging scope"
            );
            return Err(AuthError::InsufficientScope);
        }
        let patient = context.patient.ok_or(AuthError::UnresolvedPatient)?;
        let grant = PatientAuthorization::new(
            patient,
            context.introspected,
            client.fhir_base_url().to_string(),
        )?;

        tracing::debug!(
            variant = self.variant(),
            patient_id = grant.patient_id(),
            "Authorized imaging access"
        );
        Ok(AuthorizationAssignment::Authorized(grant))
    }
}
