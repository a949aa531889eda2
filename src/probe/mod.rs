//! Probing subject names and classifying what they serve
//!
//! A [`Prober`] connects to one name and reports a [`ProbeOutcome`]. The
//! TLS implementation lives in [`tls`]; everything here is independent of
//! the TLS library so the decision tree can be tested on its own.

pub mod tls;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{Fingerprint, ProbeOutcome};

pub use tls::TlsProber;

/// Port every name is probed on
pub const HTTPS_PORT: u16 = 443;

/// Connects to a subject name and reports what it serves.
///
/// Failures are outcomes, not errors: every call yields exactly one
/// [`ProbeOutcome`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, name: &str, expected: &Fingerprint, dial_timeout: Duration)
        -> ProbeOutcome;
}

/// Why a certificate failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidityReason {
    Expired,
    /// A CA certificate used as a leaf, or a leaf used as a CA
    NotAuthorizedToSign,
    Other,
}

/// Where in the connection a probe failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Resolution or TCP connect
    Network,
    /// TLS handshake failed before the certificate could be judged
    Protocol,
    /// Chain does not lead to a trusted root
    UnknownAuthority,
    NameMismatch,
    Invalid(InvalidityReason),
}

/// Library-neutral description of a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeFailure {
    pub category: FailureCategory,
    pub timeout: bool,
    pub temporary: bool,
}

impl ProbeFailure {
    pub fn network(timeout: bool, temporary: bool) -> Self {
        Self {
            category: FailureCategory::Network,
            timeout,
            temporary,
        }
    }

    pub fn tls(category: FailureCategory) -> Self {
        Self {
            category,
            timeout: false,
            temporary: false,
        }
    }
}

/// Map a failure to its outcome; the first matching rule wins
pub fn classify(failure: &ProbeFailure) -> ProbeOutcome {
    match failure.category {
        FailureCategory::Network if failure.timeout || failure.temporary => ProbeOutcome::Skipped,
        FailureCategory::Network => ProbeOutcome::Unavailable,
        FailureCategory::Protocol => ProbeOutcome::TlsError,
        FailureCategory::UnknownAuthority => ProbeOutcome::IncompleteChain,
        FailureCategory::NameMismatch => ProbeOutcome::WrongCert,
        FailureCategory::Invalid(InvalidityReason::Expired) => ProbeOutcome::ExpiredCert,
        FailureCategory::Invalid(InvalidityReason::NotAuthorizedToSign) => {
            ProbeOutcome::SelfSignedCert
        }
        FailureCategory::Invalid(InvalidityReason::Other) => ProbeOutcome::MiscInvalidCert,
    }
}

/// Judge a completed handshake.
///
/// `Valid` when any presented certificate hashes to `expected`; the SCT flag
/// comes from the matching certificate itself.
pub fn evaluate_presented<'a, I>(presented: I, expected: &Fingerprint, ocsp_response: &[u8]) -> ProbeOutcome
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let matched = presented
        .into_iter()
        .find(|der| Fingerprint::of(der) == *expected);

    match matched {
        Some(der) => ProbeOutcome::Valid {
            ocsp_stapled: !ocsp_response.is_empty(),
            sct_present: crate::cert_parser::CertificateParser::has_embedded_scts(der),
        },
        None => ProbeOutcome::CertNotPresented,
    }
}
