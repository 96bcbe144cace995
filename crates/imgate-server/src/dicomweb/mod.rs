//! DICOMweb side of the gateway: QIDO-RS lookup, ImagingStudy formatting and
//! the capability-gated WADO-RS proxy.

pub mod format;
pub mod provider;
pub mod qido;
pub mod wado;

pub use format::{ImagingResourceFormatter, format_date, format_name};
pub use provider::{DEFAULT_WADO_ACCEPT, DICOM_JSON, DicomWebProvider};
pub use qido::QidoStudy;
