//! Imaging scope policies.
//!
//! An introspected token grants imaging access when its space-delimited
//! `scope` contains at least one alias from the policy's allow-list. Matching
//! is exact membership; no wildcard expansion is performed.

/// An allow-list of scopes that grant read access to imaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagingScopePolicy {
    aliases: &'static [&'static str],
}

impl ImagingScopePolicy {
    /// Scopes accepted from a standards-conformant SMART server.
    pub const STANDARD: Self = Self {
        aliases: &[
            "patient/*.*",
            "patient/*.read",
            "patient/*.rs",
            "patient/ImagingStudy.read",
            "patient/ImagingStudy.*",
            "patient/ImagingStudy.rs",
        ],
    };

    /// Scopes accepted from the vendor servers, which do not issue the
    /// wildcard or v2 forms.
    pub const VENDOR: Self = Self {
        aliases: &["patient/DiagnosticReport.read", "patient/ImagingStudy.read"],
    };

    /// Returns the allow-listed scope strings.
    #[must_use]
    pub fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    /// Returns `true` if any scope in `scope` is on the allow-list.
    #[must_use]
    pub fn allows(&self, scope: &str) -> bool {
        scope
            .split_whitespace()
            .any(|granted| self.aliases.contains(&granted))
    }
}
