//! QIDO-RS study record to FHIR ImagingStudy.

use std::sync::Arc;

use imgate_auth::{AuthError, CapabilityTokens};
use imgate_core::{CodeableConcept, Coding, Endpoint, Identifier, ImagingStudy, Reference};
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, PrimitiveDateTime, Time};

use super::qido::{QidoStudy, tags};

pub const DICOM_UID_SYSTEM: &str = "urn:dicom:uid";
pub const DCM_SYSTEM: &str = "http://dicom.nema.org/resources/ontology/DCM";
pub const ENDPOINT_CONNECTION_TYPE_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/endpoint-connection-type";
pub const WADO_RS_CONNECTION_TYPE: &str = "dicom-wado-rs";

/// Id of the contained WADO-RS Endpoint in every formatted study.
const ENDPOINT_ID: &str = "e";

/// Builds ImagingStudy resources whose endpoint points at the capability-gated proxy.
#[derive(Debug, Clone)]
pub struct ImagingResourceFormatter {
    tokens: Arc<CapabilityTokens>,
    wado_base: String,
}

impl ImagingResourceFormatter {
    pub fn new(tokens: Arc<CapabilityTokens>, wado_base: impl Into<String>) -> Self {
        Self {
            tokens,
            wado_base: wado_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn wado_base(&self) -> &str {
        &self.wado_base
    }

    /// Formats one study for `patient_id`, issuing a fresh capability token.
    ///
    /// Returns `Ok(None)` for records without a study instance UID.
    pub fn format_study(
        &self,
        record: &QidoStudy,
        patient_id: &str,
    ) -> Result<Option<ImagingStudy>, AuthError> {
        let Some(uid) = record.study_instance_uid() else {
            tracing::warn!("Skipping QIDO record without StudyInstanceUID");
            return Ok(None);
        };

        let token = self.tokens.issue(uid, patient_id)?;

        Ok(Some(ImagingStudy {
            resource_type: "ImagingStudy".to_string(),
            id: uid.to_string(),
            status: "available".to_string(),
            identifier: vec![Identifier {
                type_: None,
                system: Some(DICOM_UID_SYSTEM.to_string()),
                value: Some(format!("urn:oid:{uid}")),
            }],
            subject: Reference::display(
                record
                    .person_name(tags::PATIENT_NAME)
                    .and_then(format_name),
            ),
            started: record
                .string(tags::STUDY_DATE)
                .and_then(|date| format_date(date, record.string(tags::STUDY_TIME))),
            referrer: record
                .person_name(tags::REFERRING_PHYSICIAN_NAME)
                .and_then(format_name)
                .map(|name| Reference::display(Some(name))),
            description: record
                .string(tags::STUDY_DESCRIPTION)
                .or_else(|| record.string(tags::STUDY_ID))
                .map(str::to_string),
            number_of_series: record.integer(tags::NUMBER_OF_STUDY_RELATED_SERIES),
            number_of_instances: record.integer(tags::NUMBER_OF_STUDY_RELATED_INSTANCES),
            modality: record
                .strings(tags::MODALITIES_IN_STUDY)
                .into_iter()
                .map(|code| Coding::new(DCM_SYSTEM, code))
                .collect(),
            contained: vec![Endpoint {
                resource_type: "Endpoint".to_string(),
                id: ENDPOINT_ID.to_string(),
                status: "active".to_string(),
                connection_type: Coding::new(
                    ENDPOINT_CONNECTION_TYPE_SYSTEM,
                    WADO_RS_CONNECTION_TYPE,
                ),
                payload_type: vec![CodeableConcept {
                    coding: Vec::new(),
                    text: Some("DICOM".to_string()),
                }],
                address: format!("{}/{}", self.wado_base, token),
            }],
            endpoint: vec![Reference::to(format!("#{ENDPOINT_ID}"))],
        }))
    }
}

/// Formats a DICOM person name (`Family^Given^Middle^Prefix^Suffix`).
pub fn format_name(name: &str) -> Option<String> {
    let joined = name
        .split('^')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// Combines a DICOM DA (`YYYYMMDD`) and optional TM (`HHMMSS.FFFFFF`) into an
/// RFC 3339 instant. Archives send local times without an offset; they are
/// read as UTC. A missing or unreadable TM means midnight.
pub fn format_date(date: &str, time: Option<&str>) -> Option<String> {
    let date = parse_da(date)?;
    let time = time
        .and_then(|tm| {
            let parsed = parse_tm(tm);
            if parsed.is_none() {
                tracing::debug!(study_time = tm, "Ignoring malformed study time");
            }
            parsed
        })
        .unwrap_or(Time::MIDNIGHT);
    PrimitiveDateTime::new(date, time)
        .assume_utc()
        .format(&Rfc3339)
        .ok()
}

fn parse_da(value: &str) -> Option<Date> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 8 {
        return None;
    }
    let year = digits[0..4].parse().ok()?;
    let month = Month::try_from(digits[4..6].parse::<u8>().ok()?).ok()?;
    let day = digits[6..8].parse().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn parse_tm(value: &str) -> Option<Time> {
    let value = value.trim().replace(':', "");
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value.as_str(), None),
    };
    if whole.len() < 2 || whole.len() % 2 != 0 || whole.len() > 6 {
        return None;
    }
    let field = |range: std::ops::Range<usize>| -> Option<u8> {
        whole.get(range).map_or(Some(0), |s| s.parse().ok())
    };
    let hour = field(0..2)?;
    let minute = field(2..4)?;
    let second = field(4..6)?;
    let nanos = match fraction {
        Some(f) if !f.is_empty() && f.len() <= 6 && f.chars().all(|c| c.is_ascii_digit()) => {
            format!("{f:0<9}").parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };
    Time::from_hms_nano(hour, minute, second, nanos).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn formatter() -> (ImagingResourceFormatter, Arc<CapabilityTokens>) {
        let tokens = Arc::new(CapabilityTokens::generate());
        (
            ImagingResourceFormatter::new(Arc::clone(&tokens), "https://gw.example/wado/"),
            tokens,
        )
    }

    #[test]
    fn test_format_name() {
        assert_eq!(format_name("Doe^Jane"), Some("Doe Jane".to_string()));
        assert_eq!(
            format_name(" Doe ^^ Jane ^^Dr"),
            Some("Doe Jane Dr".to_string())
        );
        assert_eq!(format_name("^^"), None);
        assert_eq!(format_name(""), None);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date("20230115", Some("103000")).as_deref(),
            Some("2023-01-15T10:30:00Z")
        );
        assert_eq!(
            format_date("20230115", None).as_deref(),
            Some("2023-01-15T00:00:00Z")
        );
        assert_eq!(
            format_date("20230115", Some("1030")).as_deref(),
            Some("2023-01-15T10:30:00Z")
        );
        assert!(
            format_date("20230115", Some("103000.25"))
                .unwrap()
                .starts_with("2023-01-15T10:30:00.25")
        );
        assert_eq!(format_date("2023011", None), None);
        assert_eq!(format_date("20231301", None), None);
        assert_eq!(
            format_date("20230115", Some("25")).as_deref(),
            Some("2023-01-15T00:00:00Z")
        );
        assert_eq!(format_date("2023011", Some("103000")), None);
    }

    #[test]
    fn test_format_study() {
        let (formatter, tokens) = formatter();
        let record: QidoStudy = serde_json::from_value(json!({
            "0020000D": {"vr": "UI", "Value": ["1.2.840.1"]},
            "00080020": {"vr": "DA", "Value": ["20230115"]},
            "00080030": {"vr": "TM", "Value": ["103000"]},
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^Jane"}]},
            "00080090": {"vr": "PN", "Value": [{"Alphabetic": "House^Gregory^^Dr"}]},
            "00200010": {"vr": "SH", "Value": ["S42"]},
            "00201206": {"vr": "IS", "Value": [2]},
            "00201208": {"vr": "IS", "Value": [57]},
            "00080061": {"vr": "CS", "Value": ["MR", "SR"]}
        }))
        .unwrap();

        let study = formatter.format_study(&record, "p1").unwrap().unwrap();
        let value = serde_json::to_value(&study).unwrap();

        assert_eq!(value["resourceType"], "ImagingStudy");
        assert_eq!(value["id"], "1.2.840.1");
        assert_eq!(value["status"], "available");
        assert_eq!(value["identifier"][0]["system"], "urn:dicom:uid");
        assert_eq!(value["identifier"][0]["value"], "urn:oid:1.2.840.1");
        assert_eq!(value["subject"]["display"], "Doe Jane");
        assert_eq!(value["referrer"]["display"], "House Gregory Dr");
        assert_eq!(value["started"], "2023-01-15T10:30:00Z");
        assert_eq!(value["description"], "S42");
        assert_eq!(value["numberOfSeries"], 2);
        assert_eq!(value["numberOfInstances"], 57);
        assert_eq!(value["modality"][1]["system"], DCM_SYSTEM);
        assert_eq!(value["modality"][1]["code"], "SR");
        assert_eq!(value["endpoint"][0]["reference"], "#e");
        assert_eq!(value["contained"][0]["resourceType"], "Endpoint");
        assert_eq!(value["contained"][0]["connectionType"]["code"], "dicom-wado-rs");

        let address = value["contained"][0]["address"].as_str().unwrap();
        let token = address
            .strip_prefix("https://gw.example/wado/")
            .expect("address under the wado base");
        let claims = tokens.verify(token, "1.2.840.1", Some("p1")).unwrap();
        assert_eq!(claims.patient, "p1");
    }

    #[test]
    fn test_description_prefers_study_description() {
        let (formatter, _) = formatter();
        let record: QidoStudy = serde_json::from_value(json!({
            "0020000D": {"vr": "UI", "Value": ["1.2.840.2"]},
            "00081030": {"vr": "LO", "Value": ["CT CHEST W/O CONTRAST"]},
            "00200010": {"vr": "SH", "Value": ["S43"]}
        }))
        .unwrap();

        let study = formatter.format_study(&record, "p1").unwrap().unwrap();
        assert_eq!(study.description.as_deref(), Some("CT CHEST W/O CONTRAST"));
        assert!(study.started.is_none());
        assert!(study.referrer.is_none());
        assert!(study.modality.is_empty());
    }

    #[test]
    fn test_record_without_uid_is_skipped() {
        let (formatter, _) = formatter();
        let record: QidoStudy =
            serde_json::from_value(json!({"00100010": {"vr": "PN"}})).unwrap();
        assert!(formatter.format_study(&record, "p1").unwrap().is_none());
    }
}
