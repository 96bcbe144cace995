//! QIDO-RS study records in the DICOM JSON model.
//!
//! A record maps an eight-digit tag to `{"vr": .., "Value": [..]}`. Only the
//! study-level attributes needed for an ImagingStudy are read.

use serde::Deserialize;
use serde_json::{Map, Value};

/// DICOM tags read from study-level QIDO results.
pub mod tags {
    pub const STUDY_DATE: &str = "00080020";
    pub const STUDY_TIME: &str = "00080030";
    pub const MODALITIES_IN_STUDY: &str = "00080061";
    pub const REFERRING_PHYSICIAN_NAME: &str = "00080090";
    pub const STUDY_DESCRIPTION: &str = "00081030";
    pub const PATIENT_NAME: &str = "00100010";
    pub const STUDY_INSTANCE_UID: &str = "0020000D";
    pub const STUDY_ID: &str = "00200010";
    pub const NUMBER_OF_STUDY_RELATED_SERIES: &str = "00201206";
    pub const NUMBER_OF_STUDY_RELATED_INSTANCES: &str = "00201208";
}

/// One study in a QIDO-RS response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct QidoStudy(pub Map<String, Value>);

impl QidoStudy {
    fn values(&self, tag: &str) -> Option<&Vec<Value>> {
        self.0.get(tag)?.get("Value")?.as_array()
    }

    fn first(&self, tag: &str) -> Option<&Value> {
        self.values(tag)?.first()
    }

    /// First value of a string-valued attribute, if non-empty.
    pub fn string(&self, tag: &str) -> Option<&str> {
        self.first(tag)?.as_str().filter(|s| !s.trim().is_empty())
    }

    /// All string values of a multi-valued attribute.
    pub fn strings(&self, tag: &str) -> Vec<&str> {
        self.values(tag)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Alphabetic representation of the first person name value.
    pub fn person_name(&self, tag: &str) -> Option<&str> {
        self.first(tag)?.get("Alphabetic")?.as_str()
    }

    /// First value of an integer string (IS) attribute.
    ///
    /// Archives encode IS as either a JSON number or a string.
    pub fn integer(&self, tag: &str) -> Option<u32> {
        match self.first(tag)? {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn study_instance_uid(&self) -> Option<&str> {
        self.string(tags::STUDY_INSTANCE_UID)
    }
}
