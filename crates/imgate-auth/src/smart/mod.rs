//! SMART on FHIR support.
//!
//! - Discovery of the authorization server via `/.well-known/smart-configuration`
//! - Scope policies deciding whether an introspected token covers imaging

pub mod discovery;
pub mod scopes;

pub use discovery::{SmartConfiguration, SmartDiscoveryCache};
pub use scopes::ImagingScopePolicy;
