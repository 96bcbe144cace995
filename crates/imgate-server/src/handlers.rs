use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use imgate_auth::Authorized;
use imgate_auth::introspection::meditech::patient_id_from_hint;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::server::AppState;

/// Patient id bound into capability tokens when access control is disabled
/// and the request names no patient.
pub const ANONYMOUS_PATIENT: &str = "anonymous";

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ImagingStudySearch {
    pub patient: Option<String>,
}

/// `GET /ImagingStudy?patient=...`
pub async fn search_imaging_studies(
    State(state): State<AppState>,
    Authorized(assignment): Authorized,
    Query(search): Query<ImagingStudySearch>,
) -> Result<impl IntoResponse, GatewayError> {
    let binding_patient_id = match assignment.patient_id() {
        Some(id) => id.to_string(),
        None => search
            .patient
            .as_deref()
            .and_then(patient_id_from_hint)
            .unwrap_or(ANONYMOUS_PATIENT)
            .to_string(),
    };

    let bundle = state
        .provider
        .lookup_studies(
            assignment.patient(),
            &binding_patient_id,
            state.formatter.as_ref(),
        )
        .await?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json"),
        )],
        Json(bundle),
    ))
}
