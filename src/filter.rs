//! Issuer filtering for scan candidates

use crate::types::Certificate;

/// Selects certificates from one issuer that have not yet expired
#[derive(Debug, Clone)]
pub struct IssuerFilter {
    issuer_cn: String,
    now: i64,
}

impl IssuerFilter {
    /// Create a filter evaluated against the current time
    pub fn new(issuer_cn: impl Into<String>) -> Self {
        Self::at(issuer_cn, chrono::Utc::now().timestamp())
    }

    /// Create a filter evaluated against a fixed Unix timestamp
    pub fn at(issuer_cn: impl Into<String>, now: i64) -> Self {
        Self {
            issuer_cn: issuer_cn.into(),
            now,
        }
    }

    /// Check if a certificate should be scanned.
    ///
    /// The issuer common name must match exactly (case sensitive) and the
    /// certificate must not be past its `not_after`.
    pub fn matches(&self, cert: &Certificate) -> bool {
        if cert.issuer.as_deref() != Some(self.issuer_cn.as_str()) {
            return false;
        }

        self.now <= cert.not_after
    }

    pub fn issuer(&self) -> &str {
        &self.issuer_cn
    }
}
