// src/types.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a certificate's DER encoding
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint the given DER bytes
    pub fn of(der: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(der);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// A certificate drawn from the CT log, ready to be scanned
#[derive(Debug, Clone)]
pub struct Certificate {
    /// DER encoding as logged
    pub raw: Vec<u8>,

    /// SHA-256 of `raw`, compared against what hosts present
    pub fingerprint: Fingerprint,

    /// Subject alternative DNS names, in certificate order
    pub dns_names: Vec<String>,

    /// Validity start (Unix timestamp)
    pub not_before: i64,

    /// Validity end (Unix timestamp)
    pub not_after: i64,

    /// Issuer common name, or the full issuer DN when it has none
    pub issuer: Option<String>,
}

/// Result of probing one subject name of one certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Transient failure (timeout, temporary DNS error); not judged
    Skipped,
    /// Host refused, unreachable, or does not resolve
    Unavailable,
    /// TLS handshake failed at the protocol level
    TlsError,
    /// Presented chain does not lead to a trusted root
    IncompleteChain,
    /// Presented certificate does not cover the name
    WrongCert,
    /// Presented certificate is expired
    ExpiredCert,
    /// A certificate in the chain is not authorized to sign
    SelfSignedCert,
    /// Certificate rejected for any other validity reason
    MiscInvalidCert,
    /// Handshake succeeded but the expected certificate was not presented
    CertNotPresented,
    /// The expected certificate was presented
    Valid { ocsp_stapled: bool, sct_present: bool },
}

impl ProbeOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ProbeOutcome::Skipped => OutcomeKind::Skipped,
            ProbeOutcome::Unavailable => OutcomeKind::Unavailable,
            ProbeOutcome::TlsError => OutcomeKind::TlsError,
            ProbeOutcome::IncompleteChain => OutcomeKind::IncompleteChain,
            ProbeOutcome::WrongCert => OutcomeKind::WrongCert,
            ProbeOutcome::ExpiredCert => OutcomeKind::ExpiredCert,
            ProbeOutcome::SelfSignedCert => OutcomeKind::SelfSignedCert,
            ProbeOutcome::MiscInvalidCert => OutcomeKind::MiscInvalidCert,
            ProbeOutcome::CertNotPresented => OutcomeKind::CertNotPresented,
            ProbeOutcome::Valid { .. } => OutcomeKind::Valid,
        }
    }

    /// Whether the name is serving the certificate it was issued
    pub fn is_used(&self) -> bool {
        matches!(self, ProbeOutcome::Valid { .. })
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Valid {
                ocsp_stapled,
                sct_present,
            } => write!(f, "valid (ocsp={}, sct={})", ocsp_stapled, sct_present),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Fieldless discriminant of [`ProbeOutcome`], used for labels and report rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Skipped,
    Unavailable,
    TlsError,
    IncompleteChain,
    WrongCert,
    ExpiredCert,
    SelfSignedCert,
    MiscInvalidCert,
    CertNotPresented,
    Valid,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 10] = [
        OutcomeKind::Skipped,
        OutcomeKind::Unavailable,
        OutcomeKind::TlsError,
        OutcomeKind::IncompleteChain,
        OutcomeKind::WrongCert,
        OutcomeKind::ExpiredCert,
        OutcomeKind::SelfSignedCert,
        OutcomeKind::MiscInvalidCert,
        OutcomeKind::CertNotPresented,
        OutcomeKind::Valid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Unavailable => "unavailable",
            OutcomeKind::TlsError => "tls_error",
            OutcomeKind::IncompleteChain => "incomplete_chain",
            OutcomeKind::WrongCert => "wrong_cert",
            OutcomeKind::ExpiredCert => "expired_cert",
            OutcomeKind::SelfSignedCert => "self_signed_cert",
            OutcomeKind::MiscInvalidCert => "misc_invalid_cert",
            OutcomeKind::CertNotPresented => "cert_not_presented",
            OutcomeKind::Valid => "valid",
        }
    }
}

/// How many of a certificate's names serve it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSummary {
    Unused,
    PartiallyUsed,
    FullyUsed,
}

impl CertificateSummary {
    pub const ALL: [CertificateSummary; 3] = [
        CertificateSummary::Unused,
        CertificateSummary::PartiallyUsed,
        CertificateSummary::FullyUsed,
    ];

    /// Classify from the number of names serving the certificate.
    ///
    /// `used == total` is checked first, so a certificate without names
    /// counts as fully used.
    pub fn from_counts(used: usize, total: usize) -> Self {
        debug_assert!(used <= total, "used ({}) exceeds total ({})", used, total);
        if used == total {
            CertificateSummary::FullyUsed
        } else if used == 0 {
            CertificateSummary::Unused
        } else {
            CertificateSummary::PartiallyUsed
        }
    }

    /// Summarize the outcomes of every name of one certificate
    pub fn from_outcomes(outcomes: &[ProbeOutcome]) -> Self {
        let used = outcomes.iter().filter(|o| o.is_used()).count();
        Self::from_counts(used, outcomes.len())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateSummary::Unused => "unused",
            CertificateSummary::PartiallyUsed => "partially_used",
            CertificateSummary::FullyUsed => "fully_used",
        }
    }
}

impl fmt::Display for CertificateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
