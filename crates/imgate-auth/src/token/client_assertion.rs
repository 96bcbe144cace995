//! JWT client assertions for SMART Backend Services.
//!
//! The gateway authenticates to the authorization server's token endpoint with
//! a signed assertion (RFC 7523) instead of a shared secret:
//!
//! - `iss` and `sub`: the client id
//! - `aud`: the token endpoint URL
//! - `exp`: three minutes from now
//! - `jti`: a random UUID per assertion
//!
//! The header carries `alg` (ES384 or RS384), `kid` and `typ: JWT`.

use std::fmt;
use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::{ClientIdentity, SigningAlgorithm};
use crate::error::AuthError;

/// `client_assertion_type` value for JWT bearer assertions.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// How long a signed assertion stays valid.
pub const CLIENT_ASSERTION_LIFETIME: Duration = Duration::from_secs(180);

/// Claims of an outgoing client assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Issuer, the client id.
    pub iss: String,
    /// Subject, the client id.
    pub sub: String,
    /// Audience, the token endpoint.
    pub aud: String,
    /// Expiration as Unix timestamp.
    pub exp: i64,
    /// Issued-at as Unix timestamp.
    pub iat: i64,
    /// Unique assertion id.
    pub jti: String,
}

/// Signs client assertions with the gateway's private key.
pub struct ClientAssertionSigner {
    client_id: String,
    algorithm: SigningAlgorithm,
    kid: String,
    encoding_key: EncodingKey,
}

impl ClientAssertionSigner {
    /// Creates a signer from a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the key cannot be parsed for
    /// the given algorithm.
    pub fn from_pem(
        client_id: impl Into<String>,
        algorithm: SigningAlgorithm,
        kid: impl Into<String>,
        pem: &[u8],
    ) -> AuthResult<Self> {
        let encoding_key = match algorithm {
            SigningAlgorithm::ES384 => EncodingKey::from_ec_pem(pem),
            SigningAlgorithm::RS384 => EncodingKey::from_rsa_pem(pem),
        }
        .map_err(|e| {
            AuthError::configuration(format!("invalid {algorithm} client private key: {e}"))
        })?;

        Ok(Self {
            client_id: client_id.into(),
            algorithm,
            kid: kid.into(),
            encoding_key,
        })
    }

    /// Creates a signer from a key-based client identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` for secret-based identities, missing
    /// keys, or keys that do not parse.
    pub fn from_identity(identity: &ClientIdentity) -> AuthResult<Self> {
        match identity {
            ClientIdentity::PrivateKeyJwt {
                client_id,
                alg,
                kid,
                ..
            } => {
                let pem = identity.private_key_pem()?;
                Self::from_pem(client_id.clone(), *alg, kid.clone(), pem.as_bytes())
            }
            ClientIdentity::ClientSecret { .. } => Err(AuthError::configuration(
                "client assertions require an asymmetric client key",
            )),
        }
    }

    /// Returns the client id used as issuer and subject.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Signs a fresh assertion addressed to `audience` (the token endpoint).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn sign(&self, audience: &str) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = ClientAssertionClaims {
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            aud: audience.to_string(),
            exp: now + CLIENT_ASSERTION_LIFETIME.as_secs() as i64,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(self.algorithm.to_jwt_algorithm());
        header.kid = Some(self.kid.clone());
        header.typ = Some("JWT".to_string());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("failed to sign client assertion: {e}")))
    }
}

impl fmt::Debug for ClientAssertionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAssertionSigner")
            .field("client_id", &self.client_id)
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
    use p384::SecretKey;
    use p384::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rand::rngs::OsRng;

    fn ec_key_pair() -> (String, String) {
        let secret = SecretKey::random(&mut OsRng);
        let private_pem = secret.to_pkcs8_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = secret.public_key().to_public_key_pem(LineEnding::LF).unwrap();
        (private_pem, public_pem)
    }

    #[test]
    fn test_sign_produces_verifiable_assertion() {
        let (private_pem, public_pem) = ec_key_pair();
        let signer = ClientAssertionSigner::from_pem(
            "imaging-gateway",
            SigningAlgorithm::ES384,
            "key-1",
            private_pem.as_bytes(),
        )
        .unwrap();

        let token = signer.sign("https://auth.example/oauth/token").unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES384);
        assert_eq!(header.kid.as_deref(), Some("key-1"));
        assert_eq!(header.typ.as_deref(), Some("JWT"));

        let mut validation = Validation::new(Algorithm::ES384);
        validation.set_audience(&["https://auth.example/oauth/token"]);
        let data = decode::<ClientAssertionClaims>(
            &token,
            &DecodingKey::from_ec_pem(public_pem.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims.iss, "imaging-gateway");
        assert_eq!(data.claims.sub, "imaging-gateway");
        assert_eq!(data.claims.exp - data.claims.iat, 180);
        assert!(uuid::Uuid::parse_str(&data.claims.jti).is_ok());
    }

    #[test]
    fn test_each_assertion_has_unique_jti() {
        let (private_pem, public_pem) = ec_key_pair();
        let signer = ClientAssertionSigner::from_pem(
            "gw",
            SigningAlgorithm::ES384,
            "k",
            private_pem.as_bytes(),
        )
        .unwrap();

        let mut validation = Validation::new(Algorithm::ES384);
        validation.set_audience(&["aud"]);
        let key = DecodingKey::from_ec_pem(public_pem.as_bytes()).unwrap();
        let first = decode::<ClientAssertionClaims>(&signer.sign("aud").unwrap(), &key, &validation)
            .unwrap();
        let second =
            decode::<ClientAssertionClaims>(&signer.sign("aud").unwrap(), &key, &validation)
                .unwrap();

        assert_ne!(first.claims.jti, second.claims.jti);
    }

    #[test]
    fn test_invalid_pem_is_configuration_error() {
        let err = ClientAssertionSigner::from_pem(
            "gw",
            SigningAlgorithm::RS384,
            "k",
            b"not a key",
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[test]
    fn test_secret_identity_cannot_sign() {
        let identity = ClientIdentity::ClientSecret {
            client_id: "gw".to_string(),
            client_secret: "s".to_string(),
        };
        assert!(matches!(
            ClientAssertionSigner::from_identity(&identity),
            Err(AuthError::Configuration { .. })
        ));
    }

    #[test]
    fn test_debug_omits_key() {
        let (private_pem, _) = ec_key_pair();
        let signer = ClientAssertionSigner::from_pem(
            "gw",
            SigningAlgorithm::ES384,
            "k",
            private_pem.as_bytes(),
        )
        .unwrap();
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("gw"));
        assert!(!rendered.contains("BEGIN"));
    }
}
