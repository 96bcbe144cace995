//! Request authorization middleware and extractors.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use imgate_auth::middleware::{AuthState, Authorized, require_authorization};
//!
//! async fn studies(Authorized(assignment): Authorized) -> String {
//!     format!("{:?}", assignment.patient_id())
//! }
//!
//! let app = Router::new()
//!     .route("/ImagingStudy", get(studies))
//!     .route_layer(middleware::from_fn_with_state(auth_state.clone(), require_authorization))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::introspection::{AuthorizationAssignment, AuthorizationRequest, IntrospectionEngine};

/// State required by the authorization middleware and extractors.
///
/// Include it in the application state and expose it through `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    /// The engine shared by every request.
    pub engine: Arc<IntrospectionEngine>,
}

impl AuthState {
    /// Creates a new auth state.
    #[must_use]
    pub fn new(engine: Arc<IntrospectionEngine>) -> Self {
        Self { engine }
    }

    /// Runs the engine for the request described by `parts`.
    ///
    /// # Errors
    ///
    /// Propagates the engine's decision or upstream failure.
    pub async fn authorize(&self, parts: &Parts) -> Result<AuthorizationAssignment, AuthError> {
        let request = authorization_request(parts);
        let result = self.engine.assign_authorization(&request).await;
        if let Err(e) = &result {
            tracing::debug!(
                category = %e.category(),
                path = %parts.uri.path(),
                "Authorization failed"
            );
        }
        result
    }
}

/// Extracts the bearer token from an `Authorization` header.
///
/// The scheme is matched case-insensitively. An empty token counts as absent.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Builds the engine input from request parts.
#[must_use]
pub fn authorization_request(parts: &Parts) -> AuthorizationRequest {
    AuthorizationRequest {
        bearer_token: bearer_token(&parts.headers),
        patient_hint: AuthorizationRequest::patient_hint_from_query(parts.uri.query()),
    }
}

/// Middleware that authorizes the request and stores the
/// [`AuthorizationAssignment`] in the request extensions.
///
/// Rejections are returned as OperationOutcome responses and the handler is
/// never called.
pub async fn require_authorization(
    State(state): State<AuthState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = req.into_parts();
    let assignment = state.authorize(&parts).await?;
    parts.extensions.insert(assignment);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Extractor for the authorization decision of the current request.
///
/// Reuses the assignment stored by [`require_authorization`] if that
/// middleware ran, otherwise runs the engine itself.
pub struct Authorized(pub AuthorizationAssignment);

impl<S> FromRequestParts<S> for Authorized
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(assignment) = parts.extensions.get::<AuthorizationAssignment>() {
            return Ok(Self(assignment.clone()));
        }
        let auth_state = AuthState::from_ref(state);
        auth_state.authorize(parts).await.map(Self)
    }
}

/// Extractor that authorizes only when the request can be authorized.
///
/// Yields `None` for a request without a bearer token when the engine needs
/// one, and for a request without a `patient` parameter when the engine can
/// only learn the patient from it. Image viewers forward their bearer token
/// but never add query parameters of their own. A request that carries
/// everything the engine needs and is still rejected is an error.
pub struct MaybeAuthorized(pub Option<AuthorizationAssignment>);

impl<S> FromRequestParts<S> for MaybeAuthorized
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let engine = AuthState::from_ref(state).engine;
        if engine.requires_credentials() {
            let request = authorization_request(parts);
            if request.bearer_token.is_none() {
                return Ok(Self(None));
            }
            if engine.requires_patient_hint() && request.patient_hint.is_none() {
                tracing::debug!(
                    variant = engine.variant(),
                    "No patient parameter; continuing without an established patient"
                );
                return Ok(Self(None));
            }
        }
        Authorized::from_request_parts(parts, state)
            .await
            .map(|Authorized(assignment)| Self(Some(assignment)))
    }
}
