//! Token introspection and patient binding.
//!
//! [`IntrospectionEngine`] turns a caller's bearer token into an
//! [`AuthorizationAssignment`]. The vendor variants live in their own modules
//! and only replace the steps that differ from standard SMART backend services.

mod client;
mod engine;
pub mod epic;
pub mod meditech;
pub mod mock;
mod types;

pub use client::{IntrospectionAuth, SmartBackendClient};
pub use engine::IntrospectionEngine;
pub use types::{
    AccessTokenResponse, AuthorizationAssignment, AuthorizationContext, AuthorizationRequest,
    IntrospectionResult, PatientAuthorization,
};
