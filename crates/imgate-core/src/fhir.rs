use serde::{Deserialize, Serialize};

/// Text marker used by EHRs on the identifier type of a medical record number.
pub const MRN_TYPE_TEXT: &str = "Medical Record Number";

fn resource_type_patient() -> String {
    "Patient".to_string()
}

/// FHIR Coding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    /// Creates a coding from a system and code.
    #[must_use]
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            display: None,
        }
    }
}

/// FHIR CodeableConcept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// FHIR Identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Identifier {
    /// Returns `true` if the identifier type text mentions a medical record number.
    #[must_use]
    pub fn is_mrn(&self) -> bool {
        self.type_
            .as_ref()
            .and_then(|t| t.text.as_deref())
            .is_some_and(|text| text.contains(MRN_TYPE_TEXT))
    }
}

/// FHIR Reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// A reference that only carries a display string.
    #[must_use]
    pub fn display(display: Option<String>) -> Self {
        Self {
            reference: None,
            display,
        }
    }

    /// A literal reference (e.g. `#e` for a contained resource).
    #[must_use]
    pub fn to(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            display: None,
        }
    }
}

/// The subset of a FHIR Patient the gateway needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "resourceType", default = "resource_type_patient")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,
}

impl Patient {
    /// Creates a patient with the given logical id and no identifiers.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type_patient(),
            id: Some(id.into()),
            identifier: Vec::new(),
        }
    }

    /// Returns the logical id if present and non-empty.
    #[must_use]
    pub fn resolved_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns the first medical record number identifier value.
    #[must_use]
    pub fn mrn(&self) -> Option<&str> {
        self.identifier
            .iter()
            .filter(|i| i.is_mrn())
            .find_map(|i| i.value.as_deref())
    }
}

/// A contained FHIR Endpoint pointing at a DICOMweb base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub resource_type: String,
    pub id: String,
    pub status: String,
    pub connection_type: Coding,
    pub payload_type: Vec<CodeableConcept>,
    pub address: String,
}

/// A minimal FHIR ImagingStudy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagingStudy {
    pub resource_type: String,
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,
    pub subject: Reference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_series: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_instances: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modality: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<Endpoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint: Vec<Reference>,
}

/// An entry in a [`Bundle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry<R> {
    pub resource: R,
}

/// A FHIR Bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle<R> {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    pub entry: Vec<BundleEntry<R>>,
}

impl<R> Bundle<R> {
    /// Wraps resources in a `searchset` bundle.
    #[must_use]
    pub fn searchset(resources: Vec<R>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            type_: "searchset".to_string(),
            total: Some(resources.len()),
            entry: resources
                .into_iter()
                .map(|resource| BundleEntry { resource })
                .collect(),
        }
    }
}
