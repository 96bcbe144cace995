//! HTTP middleware for request authorization.
//!
//! - [`require_authorization`] runs the introspection engine before a handler
//! - [`Authorized`] and [`MaybeAuthorized`] hand the decision to handlers
//! - [`AuthError`](crate::AuthError) renders as a FHIR OperationOutcome

pub mod auth;
pub mod error;

pub use auth::{
    AuthState, Authorized, MaybeAuthorized, authorization_request, bearer_token,
    require_authorization,
};
pub use error::{REALM, operation_outcome_json};
