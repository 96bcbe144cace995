//! Token handling.
//!
//! - [`client_assertion`] signs the `private_key_jwt` assertions the gateway
//!   presents to the authorization server.
//! - [`capability`] issues and verifies the short-lived tokens embedded in
//!   WADO-RS proxy URLs.

pub mod capability;
pub mod client_assertion;

pub use capability::{CAPABILITY_TOKEN_LIFETIME, CapabilityClaims, CapabilityTokens};
pub use client_assertion::{
    CLIENT_ASSERTION_LIFETIME, CLIENT_ASSERTION_TYPE, ClientAssertionClaims,
    ClientAssertionSigner,
};
