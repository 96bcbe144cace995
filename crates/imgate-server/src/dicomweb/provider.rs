//! DICOMweb archive client.
//!
//! Study lookup goes through QIDO-RS and retrieval through WADO-RS, both
//! under the gateway's own service credentials. Callers never reach the
//! archive directly.

use axum::{
    body::Body,
    http::{HeaderValue, header},
    response::Response,
};
use imgate_auth::AuthError;
use imgate_core::{Bundle, ImagingStudy, Patient};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::format::ImagingResourceFormatter;
use super::qido::QidoStudy;
use crate::config::{ArchiveAuthentication, ImagingConfig, LookupMode};
use crate::error::GatewayError;

pub const DICOM_JSON: &str = "application/dicom+json";

/// Accept value used for WADO-RS when the caller sends none.
pub const DEFAULT_WADO_ACCEPT: &str = "multipart/related; type=application/dicom; transfer-syntax=*";

/// Client for one DICOMweb archive.
#[derive(Debug, Clone)]
pub struct DicomWebProvider {
    http: reqwest::Client,
    endpoint: String,
    authentication: Option<ArchiveAuthentication>,
    lookup: LookupMode,
}

impl DicomWebProvider {
    pub fn new(http: reqwest::Client, config: &ImagingConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            authentication: config.authentication.clone(),
            lookup: config.lookup,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn lookup_mode(&self) -> LookupMode {
        self.lookup
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.authentication {
            Some(ArchiveAuthentication::HttpBasic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        }
    }

    fn study_url(
        &self,
        study_uid: &str,
        segments: &[&str],
        query: Option<&str>,
    ) -> Result<Url, GatewayError> {
        // Dot segments are dropped by the segment setter instead of being encoded.
        if std::iter::once(study_uid)
            .chain(segments.iter().copied())
            .any(|segment| matches!(segment, "" | "." | ".."))
        {
            return Err(GatewayError::bad_request("invalid WADO-RS resource path"));
        }

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| GatewayError::internal(format!("invalid archive endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::internal("archive endpoint cannot be a base"))?
            .pop_if_empty()
            .push("studies")
            .push(study_uid);
        let study_path = url.path().to_string();

        url.path_segments_mut()
            .map_err(|()| GatewayError::internal("archive endpoint cannot be a base"))?
            .extend(segments);
        url.set_query(query.filter(|q| !q.is_empty()));

        let path = url.path();
        let inside_study = path == study_path
            || path
                .strip_prefix(study_path.as_str())
                .is_some_and(|tail| tail.starts_with('/'));
        if !inside_study {
            return Err(GatewayError::bad_request("invalid WADO-RS resource path"));
        }
        Ok(url)
    }

    /// Lists the studies of `patient` as a searchset Bundle.
    ///
    /// Capability tokens are bound to `binding_patient_id`. Without a patient
    /// (access control disabled) no `PatientID` filter is applied.
    ///
    /// # Errors
    ///
    /// `GatewayError::MissingMrn` in MRN lookup mode when the patient has no
    /// medical record number; `AuthError::UpstreamProxy` for archive failures.
    #[instrument(skip_all, fields(lookup = ?self.lookup))]
    pub async fn lookup_studies(
        &self,
        patient: Option<&Patient>,
        binding_patient_id: &str,
        formatter: &ImagingResourceFormatter,
    ) -> Result<Bundle<ImagingStudy>, GatewayError> {
        let url = format!("{}/studies", self.endpoint);
        let mut request = self.get(&url).header(header::ACCEPT, DICOM_JSON);

        if let (LookupMode::StudiesByMrn, Some(patient)) = (self.lookup, patient) {
            let mrn = patient.mrn().ok_or(GatewayError::MissingMrn)?;
            request = request.query(&[("PatientID", mrn)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::upstream_proxy(format!("study query failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::upstream_proxy(format!(
                "study query returned HTTP {status}"
            ))
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::upstream_proxy(format!("study query body: {e}")))?;

        // Archives answer an empty match with 204 or an empty body.
        let records: Vec<QidoStudy> = if body.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| AuthError::upstream_proxy(format!("invalid QIDO-RS response: {e}")))?
        };

        let mut studies = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(study) = formatter.format_study(record, binding_patient_id)? {
                studies.push(study);
            }
        }

        info!(
            matched = records.len(),
            returned = studies.len(),
            "Study lookup completed"
        );
        Ok(Bundle::searchset(studies))
    }

    /// Streams `{endpoint}/studies/{study_uid}/{segments...}` back to the caller.
    ///
    /// Each segment is pushed as one encoded path segment, so a segment can
    /// never address anything outside the study. The archive status is passed
    /// through. Only `content-type` and `content-length` are copied from the
    /// archive response. Dropping the returned body drops the upstream stream.
    ///
    /// # Errors
    ///
    /// `GatewayError::BadRequest` when the resulting URL leaves the study;
    /// `AuthError::UpstreamProxy` when the archive cannot be reached.
    #[instrument(skip(self, accept))]
    pub async fn retrieve(
        &self,
        study_uid: &str,
        segments: &[&str],
        query: Option<&str>,
        accept: Option<&HeaderValue>,
    ) -> Result<Response, GatewayError> {
        let url = self.study_url(study_uid, segments, query)?;

        let accept = accept
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_WADO_ACCEPT));

        let upstream = self
            .get(url.as_str())
            .header(header::ACCEPT, accept)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::upstream_proxy("retrieve timed out")
                } else if e.is_connect() {
                    AuthError::upstream_proxy(format!("failed to connect to archive: {e}"))
                } else {
                    AuthError::upstream_proxy(format!("retrieve failed: {e}"))
                }
            })?;

        let status = upstream.status();
        if status.is_server_error() {
            warn!(status = %status, "Archive returned an error for retrieve");
        } else {
            debug!(status = %status, "Archive retrieve started");
        }

        let mut builder = Response::builder().status(status);
        for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH] {
            if let Some(value) = upstream.headers().get(&name) {
                builder = builder.header(name, value);
            }
        }

        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| GatewayError::internal(format!("failed to build response: {e}")))
    }
}
