//! Capability tokens for the imaging proxy.
//!
//! When a study is listed, its WADO-RS address embeds a compact HS256 JWT
//! binding the URL to one study and one patient. The proxy verifies the token
//! against the study in the request path and the patient established for the
//! request before forwarding anything to the archive.
//!
//! The key is 32 random bytes generated once per process, so tokens do not
//! survive a restart and are not shared between instances.

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;

/// Lifetime of an issued capability token.
pub const CAPABILITY_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Claims embedded in a capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Study instance UID the token grants access to.
    pub uid: String,
    /// Patient id the study belongs to.
    pub patient: String,
    /// Issued-at as Unix timestamp.
    pub iat: i64,
    /// Expiration as Unix timestamp.
    pub exp: i64,
}

/// Issues and verifies capability tokens with one symmetric key.
#[derive(Clone)]
pub struct CapabilityTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl CapabilityTokens {
    /// Creates an issuer with a fresh random 32-byte key.
    #[must_use]
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::from_secret(&secret)
    }

    /// Creates an issuer from an explicit key.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issues a token for `study_uid` of `patient_id`, valid for 24 hours.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn issue(&self, study_uid: &str, patient_id: &str) -> AuthResult<String> {
        self.issue_at(study_uid, patient_id, OffsetDateTime::now_utc())
    }

    /// Issues a token as if the current time were `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn issue_at(
        &self,
        study_uid: &str,
        patient_id: &str,
        issued_at: OffsetDateTime,
    ) -> AuthResult<String> {
        let iat = issued_at.unix_timestamp();
        let claims = CapabilityClaims {
            uid: study_uid.to_string(),
            patient: patient_id.to_string(),
            iat,
            exp: iat + CAPABILITY_TOKEN_LIFETIME.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("failed to sign capability token: {e}")))
    }

    /// Verifies `token` for a request to `claimed_study_uid`.
    ///
    /// The signature and expiry are always checked, with no leeway, and the
    /// embedded study must equal `claimed_study_uid`. The embedded patient
    /// must equal `established_patient` when one is given; `None` means the
    /// request has no established patient and the signed binding stands alone.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::CapabilityMismatch` on any failure.
    pub fn verify(
        &self,
        token: &str,
        claimed_study_uid: &str,
        established_patient: Option<&str>,
    ) -> AuthResult<CapabilityClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;

        let claims = decode::<CapabilityClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::capability_mismatch(e.to_string()))?
            .claims;

        if claims.uid != claimed_study_uid {
            return Err(AuthError::capability_mismatch(
                "token was issued for a different study",
            ));
        }

        if let Some(patient) = established_patient
            && claims.patient != patient
        {
            return Err(AuthError::capability_mismatch(
                "token was issued for a different patient",
            ));
        }

        Ok(claims)
    }
}

impl fmt::Debug for CapabilityTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CapabilityTokens { key: <redacted> }")
    }
}
