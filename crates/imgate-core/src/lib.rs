//! # imgate-core
//!
//! FHIR resource shapes used by the imaging gateway. Only the elements the
//! gateway reads or produces are modelled; everything else in upstream
//! resources is ignored on deserialization.

pub mod fhir;

pub use fhir::{
    Bundle, BundleEntry, CodeableConcept, Coding, Endpoint, Identifier, ImagingStudy, Patient,
    Reference,
};
