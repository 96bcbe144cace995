//! Authorization error types.
//!
//! Every failure in the introspection flow, the capability-token check and
//! the imaging proxy ends up as one of these variants. Authorization
//! decisions and upstream transport failures are kept apart so the HTTP
//! layer can answer "access denied" and "service unavailable" differently.

use std::fmt;

/// Errors that can occur while authorizing or forwarding an imaging request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The SMART discovery document could not be fetched or parsed.
    #[error("SMART discovery failed: {message}")]
    UpstreamDiscovery {
        /// Description of the discovery failure.
        message: String,
    },

    /// The client-credentials token exchange failed.
    #[error("Token exchange failed: {message}")]
    UpstreamToken {
        /// Description of the token endpoint failure.
        message: String,
    },

    /// The introspection call failed at the transport or parsing level.
    #[error("Token introspection failed: {message}")]
    UpstreamIntrospection {
        /// Description of the introspection failure.
        message: String,
    },

    /// The patient resource could not be fetched from the EHR.
    #[error("Patient lookup failed: {message}")]
    UpstreamPatient {
        /// Description of the patient lookup failure.
        message: String,
    },

    /// The imaging archive could not be reached or returned garbage.
    #[error("Imaging archive request failed: {message}")]
    UpstreamProxy {
        /// Description of the archive failure.
        message: String,
    },

    /// The request carried no bearer token.
    #[error("Cannot authorize without an access token")]
    MissingCredential,

    /// Introspection reported the token as inactive.
    #[error("Access token is not active")]
    InactiveToken,

    /// The token carries none of the imaging scope aliases.
    #[error("Access token does not grant imaging access")]
    InsufficientScope,

    /// No patient with a non-empty id could be resolved for the token.
    #[error("Access token is not bound to a patient")]
    UnresolvedPatient,

    /// The capability token is invalid, expired, or bound to another study/patient.
    #[error("Capability token rejected: {message}")]
    CapabilityMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// The authorization backend configuration is unusable.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `UpstreamDiscovery` error.
    #[must_use]
    pub fn upstream_discovery(message: impl Into<String>) -> Self {
        Self::UpstreamDiscovery {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamToken` error.
    #[must_use]
    pub fn upstream_token(message: impl Into<String>) -> Self {
        Self::UpstreamToken {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamIntrospection` error.
    #[must_use]
    pub fn upstream_introspection(message: impl Into<String>) -> Self {
        Self::UpstreamIntrospection {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamPatient` error.
    #[must_use]
    pub fn upstream_patient(message: impl Into<String>) -> Self {
        Self::UpstreamPatient {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamProxy` error.
    #[must_use]
    pub fn upstream_proxy(message: impl Into<String>) -> Self {
        Self::UpstreamProxy {
            message: message.into(),
        }
    }

    /// Creates a new `CapabilityMismatch` error.
    #[must_use]
    pub fn capability_mismatch(message: impl Into<String>) -> Self {
        Self::CapabilityMismatch {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an authorization decision (the caller is denied).
    #[must_use]
    pub fn is_authorization_denial(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential
                | Self::InactiveToken
                | Self::InsufficientScope
                | Self::UnresolvedPatient
                | Self::CapabilityMismatch { .. }
        )
    }

    /// Returns `true` if this is an upstream transport failure.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamDiscovery { .. }
                | Self::UpstreamToken { .. }
                | Self::UpstreamIntrospection { .. }
                | Self::UpstreamPatient { .. }
                | Self::UpstreamProxy { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCredential | Self::InactiveToken => ErrorCategory::Authentication,
            Self::InsufficientScope | Self::UnresolvedPatient => ErrorCategory::Authorization,
            Self::CapabilityMismatch { .. } => ErrorCategory::Capability,
            Self::UpstreamDiscovery { .. }
            | Self::UpstreamToken { .. }
            | Self::UpstreamIntrospection { .. }
            | Self::UpstreamPatient { .. }
            | Self::UpstreamProxy { .. } => ErrorCategory::Upstream,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authorization errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The caller's credential is missing or dead.
    Authentication,
    /// The credential is valid but does not cover imaging for a patient.
    Authorization,
    /// The capability token on a proxy URL failed verification.
    Capability,
    /// An upstream service (EHR, authorization server, archive) failed.
    Upstream,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Capability => write!(f, "capability"),
            Self::Upstream => write!(f, "upstream"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::upstream_token("status 400");
        assert_eq!(err.to_string(), "Token exchange failed: status 400");

        let err = AuthError::MissingCredential;
        assert_eq!(err.to_string(), "Cannot authorize without an access token");

        let err = AuthError::capability_mismatch("study uid differs");
        assert_eq!(
            err.to_string(),
            "Capability token rejected: study uid differs"
        );
    }

    #[test]
    fn test_error_predicates() {
        for err in [
            AuthError::MissingCredential,
            AuthError::InactiveToken,
            AuthError::InsufficientScope,
            AuthError::UnresolvedPatient,
            AuthError::capability_mismatch("x"),
        ] {
            assert!(err.is_authorization_denial(), "{err}");
            assert!(!err.is_upstream(), "{err}");
        }

        for err in [
            AuthError::upstream_discovery("x"),
            AuthError::upstream_token("x"),
            AuthError::upstream_introspection("x"),
            AuthError::upstream_patient("x"),
            AuthError::upstream_proxy("x"),
        ] {
            assert!(err.is_upstream(), "{err}");
            assert!(!err.is_authorization_denial(), "{err}");
        }

        let err = AuthError::configuration("bad key");
        assert!(!err.is_upstream());
        assert!(!err.is_authorization_denial());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::InactiveToken.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::InsufficientScope.category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::capability_mismatch("x").category(),
            ErrorCategory::Capability
        );
        assert_eq!(
            AuthError::upstream_proxy("x").category(),
            ErrorCategory::Upstream
        );
        assert_eq!(ErrorCategory::Upstream.to_string(), "upstream");
    }
}
