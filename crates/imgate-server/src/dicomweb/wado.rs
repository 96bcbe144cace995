//! Capability-gated WADO-RS passthrough.
//!
//! Every request under `/wado/{token}/studies/{uid}` is verified against the
//! capability token before anything is forwarded to the archive. The study
//! UID and any trailing resource path must be plain path segments: once
//! decoded they may not climb out of `studies/{uid}`.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Uri, header},
    response::Response,
};
use imgate_auth::MaybeAuthorized;

use crate::error::GatewayError;
use crate::server::AppState;

/// `GET /wado/{token}/studies/{uid}`
pub async fn retrieve_study(
    State(state): State<AppState>,
    MaybeAuthorized(assignment): MaybeAuthorized,
    Path((token, uid)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let established = assignment.as_ref().and_then(|a| a.patient_id());
    forward(&state, &token, &uid, None, established, &uri, &headers).await
}

/// `GET /wado/{token}/studies/{uid}/{*rest}`
pub async fn retrieve_study_resource(
    State(state): State<AppState>,
    MaybeAuthorized(assignment): MaybeAuthorized,
    Path((token, uid, rest)): Path<(String, String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let established = assignment.as_ref().and_then(|a| a.patient_id());
    forward(&state, &token, &uid, Some(&rest), established, &uri, &headers).await
}

async fn forward(
    state: &AppState,
    token: &str,
    uid: &str,
    rest: Option<&str>,
    established_patient: Option<&str>,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, GatewayError> {
    let claims = state
        .capabilities
        .verify(token, uid, established_patient)
        .inspect_err(|e| tracing::info!(study_uid = %uid, error = %e, "Capability check failed"))?;

    tracing::debug!(
        study_uid = %claims.uid,
        patient_bound = established_patient.is_some(),
        "Capability verified"
    );

    let segments = match rest {
        Some(rest) => resource_segments(rest)?,
        None => Vec::new(),
    };
    check_segment(uid)?;

    state
        .provider
        .retrieve(uid, &segments, uri.query(), headers.get(header::ACCEPT))
        .await
}

/// Splits the decoded `{*rest}` capture into archive path segments.
fn resource_segments(rest: &str) -> Result<Vec<&str>, GatewayError> {
    let segments: Vec<&str> = rest.strip_prefix('/').unwrap_or(rest).split('/').collect();
    for segment in &segments {
        check_segment(segment)?;
    }
    Ok(segments)
}

fn check_segment(segment: &str) -> Result<(), GatewayError> {
    let valid = !matches!(segment, "" | "." | "..")
        && !segment.contains(['\\', '%', '/', '?', '#']);
    if valid {
        Ok(())
    } else {
        tracing::info!(segment = %segment, "Rejected WADO-RS path segment");
        Err(GatewayError::bad_request("invalid WADO-RS resource path"))
    }
}
