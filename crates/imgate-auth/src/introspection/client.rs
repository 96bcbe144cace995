//! HTTP calls shared by the network-backed engine variants.

use std::sync::Arc;

use imgate_core::Patient;

use crate::AuthResult;
use crate::config::{ClientIdentity, DiscoveryConfig, SmartBackendConfig};
use crate::error::AuthError;
use crate::smart::{SmartConfiguration, SmartDiscoveryCache};
use crate::token::{CLIENT_ASSERTION_TYPE, ClientAssertionSigner};

use super::types::{AccessTokenResponse, IntrospectionResult};

/// How the gateway proves its identity to the authorization server.
enum BackendCredentials {
    Assertion(ClientAssertionSigner),
    Basic {
        client_id: String,
        client_secret: String,
    },
}

/// Authentication for an introspection call.
#[derive(Debug, Clone, Copy)]
pub enum IntrospectionAuth<'a> {
    /// `Authorization: Bearer` with a backend-services access token.
    Bearer(&'a str),
    /// `Authorization: Basic` with the configured client id and secret.
    ClientBasic,
}

/// Client for the EHR and its authorization server.
pub struct SmartBackendClient {
    http: reqwest::Client,
    fhir_base_url: String,
    scope: String,
    credentials: BackendCredentials,
    discovery: SmartDiscoveryCache,
}

impl SmartBackendClient {
    /// Builds a client from backend configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the client key cannot be loaded.
    pub fn from_config(
        config: &SmartBackendConfig,
        http: reqwest::Client,
        discovery: DiscoveryConfig,
    ) -> AuthResult<Self> {
        let credentials = match &config.client {
            ClientIdentity::PrivateKeyJwt { .. } => {
                BackendCredentials::Assertion(ClientAssertionSigner::from_identity(&config.client)?)
            }
            ClientIdentity::ClientSecret {
                client_id,
                client_secret,
            } => BackendCredentials::Basic {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            },
        };

        let fhir_base_url = config.fhir_base_url.trim_end_matches('/').to_string();
        let discovery = SmartDiscoveryCache::new(http.clone(), &fhir_base_url, discovery);

        Ok(Self {
            http,
            fhir_base_url,
            scope: config.scope.clone(),
            credentials,
            discovery,
        })
    }

    /// FHIR base URL without a trailing slash.
    #[must_use]
    pub fn fhir_base_url(&self) -> &str {
        &self.fhir_base_url
    }

    /// The discovery cache backing this client.
    #[must_use]
    pub fn discovery(&self) -> &SmartDiscoveryCache {
        &self.discovery
    }

    /// Returns the (cached) SMART configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamDiscovery` if discovery fails.
    pub async fn smart_configuration(&self) -> AuthResult<Arc<SmartConfiguration>> {
        self.discovery.get().await
    }

    /// Obtains a fresh access token with the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamDiscovery` if the token endpoint is unknown,
    /// `AuthError::UpstreamToken` if the exchange fails, and
    /// `AuthError::Configuration` if the client has no signing key.
    pub async fn get_access_token(&self) -> AuthResult<String> {
        let BackendCredentials::Assertion(signer) = &self.credentials else {
            return Err(AuthError::configuration(
                "client-credentials grant requires an asymmetric client key",
            ));
        };

        let smart = self.smart_configuration().await?;
        let assertion = signer.sign(&smart.token_endpoint)?;

        let response = self
            .http
            .post(&smart.token_endpoint)
            .form(&[
                ("scope", self.scope.as_str()),
                ("grant_type", "client_credentials"),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::upstream_token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                token_endpoint = %smart.token_endpoint,
                status = status.as_u16(),
                "Client-credentials grant rejected"
            );
            return Err(AuthError::upstream_token(format!(
                "status {}",
                status.as_u16()
            )));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::upstream_token(format!("invalid token response: {e}")))?;

        tracing::debug!(expires_in = ?token.expires_in, "Obtained backend access token");
        Ok(token.access_token)
    }

    /// Introspects `token` at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamIntrospection` on transport failures,
    /// non-success status, or an unparseable response, and
    /// `AuthError::Configuration` for basic auth without a client secret.
    pub async fn introspect(
        &self,
        endpoint: &str,
        token: &str,
        auth: IntrospectionAuth<'_>,
    ) -> AuthResult<IntrospectionResult> {
        let request = self.http.post(endpoint).form(&[("token", token)]);
        let request = match auth {
            IntrospectionAuth::Bearer(access_token) => request.bearer_auth(access_token),
            IntrospectionAuth::ClientBasic => match &self.credentials {
                BackendCredentials::Basic {
                    client_id,
                    client_secret,
                } => request.basic_auth(client_id, Some(client_secret)),
                BackendCredentials::Assertion(_) => {
                    return Err(AuthError::configuration(
                        "basic introspection requires a client secret",
                    ));
                }
            },
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::upstream_introspection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint, status = status.as_u16(), "Introspection call failed");
            return Err(AuthError::upstream_introspection(format!(
                "status {}",
                status.as_u16()
            )));
        }

        response.json().await.map_err(|e| {
            AuthError::upstream_introspection(format!("invalid introspection response: {e}"))
        })
    }

    /// Returns `{fhir_base_url}/Patient/{id}`.
    #[must_use]
    pub fn patient_url(&self, id: &str) -> String {
        format!("{}/Patient/{}", self.fhir_base_url, id)
    }

    /// Fetches a Patient resource with `bearer` as credential.
    ///
    /// A non-success status means the token does not resolve to a patient and
    /// yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamPatient` on transport failures or an
    /// unparseable body.
    pub async fn fetch_patient(&self, url: &str, bearer: &str) -> AuthResult<Option<Patient>> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/fhir+json")
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| AuthError::upstream_patient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::info!(url, status = status.as_u16(), "Patient lookup returned no patient");
            return Ok(None);
        }

        let patient = response
            .json::<Patient>()
            .await
            .map_err(|e| AuthError::upstream_patient(format!("invalid Patient resource: {e}")))?;

        Ok(Some(patient))
    }
}
