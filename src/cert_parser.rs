// src/cert_parser.rs
use anyhow::{Context, Result};
use base64::Engine;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

use crate::types::{Certificate, Fingerprint};

/// MerkleTreeLeaf entry type for a plain X.509 certificate
const X509_ENTRY: u16 = 0;
/// MerkleTreeLeaf entry type for a precertificate
const PRECERT_ENTRY: u16 = 1;

/// Certificate parser for CT log entries
pub struct CertificateParser;

impl CertificateParser {
    /// Parse a CT log entry's `leaf_input` into a scannable certificate.
    ///
    /// Only `x509_entry` leaves are accepted. A precertificate carries the
    /// poison extension and is never what a host presents, so it can't be
    /// matched by fingerprint and is rejected here.
    pub fn parse_log_entry(base64_leaf_input: &str) -> Result<Certificate> {
        let leaf_bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_leaf_input)
            .context("Failed to decode base64 leaf_input")?;

        if leaf_bytes.len() < 12 {
            anyhow::bail!("Leaf input too short: {} bytes", leaf_bytes.len());
        }

        // version(1) leaf_type(1) timestamp(8) entry_type(2)
        let entry_type = ((leaf_bytes[10] as u16) << 8) | (leaf_bytes[11] as u16);

        match entry_type {
            X509_ENTRY => {
                if leaf_bytes.len() < 15 {
                    anyhow::bail!("x509_entry too short");
                }

                let cert_len = ((leaf_bytes[12] as usize) << 16)
                    | ((leaf_bytes[13] as usize) << 8)
                    | (leaf_bytes[14] as usize);

                if leaf_bytes.len() < 15 + cert_len {
                    anyhow::bail!("x509_entry truncated: expected {} bytes", 15 + cert_len);
                }

                Self::parse_der(&leaf_bytes[15..15 + cert_len])
            }
            PRECERT_ENTRY => anyhow::bail!("Precertificate entries are not scannable"),
            _ => anyhow::bail!("Unknown entry type: {}", entry_type),
        }
    }

    /// Parse a DER-encoded certificate
    pub fn parse_der(der_bytes: &[u8]) -> Result<Certificate> {
        let fingerprint = Fingerprint::of(der_bytes);

        let (_, cert) = X509Certificate::from_der(der_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate from DER: {:?}", e))?;

        Ok(Certificate {
            raw: der_bytes.to_vec(),
            fingerprint,
            dns_names: Self::extract_dns_names(&cert),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            issuer: Self::extract_issuer(&cert),
        })
    }

    /// Whether a DER certificate embeds signed certificate timestamps.
    /// Unparseable input has none.
    pub fn has_embedded_scts(der_bytes: &[u8]) -> bool {
        let Ok((_, cert)) = X509Certificate::from_der(der_bytes) else {
            return false;
        };

        cert.extensions().iter().any(|ext| match ext.parsed_extension() {
            ParsedExtension::SCT(scts) => !scts.is_empty(),
            _ => false,
        })
    }

    /// DNS names from the Subject Alternative Name extension (OID 2.5.29.17).
    /// The subject CN is deliberately not consulted.
    fn extract_dns_names(cert: &X509Certificate) -> Vec<String> {
        let mut names = Vec::new();

        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for general_name in &san.general_names {
                    if let GeneralName::DNSName(dns_name) = general_name {
                        names.push(dns_name.to_string());
                    }
                }
            }
        }

        names
    }

    /// Extract issuer from certificate
    fn extract_issuer(cert: &X509Certificate) -> Option<String> {
        if let Some(cn) = cert
            .issuer()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
        {
            return Some(cn.to_string());
        }

        // Fallback: return full issuer DN as string
        Some(cert.issuer().to_string())
    }
}
