//! # imgate-auth
//!
//! Authorization for the imgate imaging gateway.
//!
//! This crate provides:
//! - SMART discovery document fetching and caching
//! - A token-introspection engine with standard, Epic-style, Meditech-style
//!   and mock variants
//! - HS256 capability tokens that bind a proxy URL to one study and patient
//! - Axum middleware and extractors that attach the authorization decision
//!   to the request
//!
//! ## Modules
//!
//! - [`config`] - Authorization backend configuration
//! - [`smart`] - SMART discovery and imaging scope policies
//! - [`token`] - Client assertions and capability tokens
//! - [`introspection`] - The introspection engine and its variants
//! - [`middleware`] - HTTP middleware for request authorization

pub mod config;
pub mod error;
pub mod introspection;
pub mod middleware;
pub mod smart;
pub mod token;

pub use config::{
    AuthorizationBackendConfig, ClientIdentity, DiscoveryConfig, MockBackendConfig,
    SigningAlgorithm, SmartBackendConfig,
};
pub use error::{AuthError, ErrorCategory};
pub use introspection::{
    AuthorizationAssignment, AuthorizationRequest, IntrospectionEngine, IntrospectionResult,
    PatientAuthorization, SmartBackendClient,
};
pub use middleware::{AuthState, Authorized, MaybeAuthorized, require_authorization};
pub use smart::{ImagingScopePolicy, SmartConfiguration, SmartDiscoveryCache};
pub use token::{CapabilityClaims, CapabilityTokens, ClientAssertionSigner};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;
