// src/probe/tls.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::{
    classify, evaluate_presented, FailureCategory, InvalidityReason, ProbeFailure, Prober,
    HTTPS_PORT,
};
use crate::types::{Fingerprint, ProbeOutcome};

/// Wraps the WebPKI verifier to keep the stapled OCSP response, which
/// rustls doesn't otherwise expose after the handshake.
#[derive(Debug)]
struct OcspCapturingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    ocsp_response: Arc<Mutex<Vec<u8>>>,
}

impl ServerCertVerifier for OcspCapturingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if !ocsp_response.is_empty() {
            if let Ok(mut stored) = self.ocsp_response.lock() {
                *stored = ocsp_response.to_vec();
            }
        }
        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// What a host sent in a successful handshake
struct Presented {
    certificates: Vec<Vec<u8>>,
    ocsp_response: Vec<u8>,
}

/// Probes names over TLS on port 443, validating against the Mozilla roots
pub struct TlsProber {
    provider: Arc<CryptoProvider>,
    verifier: Arc<WebPkiServerVerifier>,
}

impl TlsProber {
    pub fn new() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let roots = Arc::new(RootCertStore::from_iter(
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
        ));

        let verifier = WebPkiServerVerifier::builder_with_provider(roots, Arc::clone(&provider))
            .build()
            .context("Failed to build certificate verifier")?;

        Ok(Self { provider, verifier })
    }

    /// Fresh config per connection so the OCSP capture isn't shared
    fn client_config(&self, ocsp_response: Arc<Mutex<Vec<u8>>>) -> Result<ClientConfig, rustls::Error> {
        let verifier = OcspCapturingVerifier {
            inner: Arc::clone(&self.verifier),
            ocsp_response,
        };

        Ok(ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth())
    }

    async fn handshake(&self, name: &str, dial_timeout: Duration) -> Result<Presented, ProbeFailure> {
        // Connect and handshake share one deadline
        let deadline = Instant::now() + dial_timeout;

        let server_name = ServerName::try_from(name.to_string()).map_err(|e| {
            debug!("Connection to [{}] failed: invalid server name: {}", name, e);
            ProbeFailure::network(false, false)
        })?;

        let stream = match timeout_at(deadline, TcpStream::connect((name, HTTPS_PORT))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("Connection to [{}] failed: {}", name, e);
                return Err(describe_connect_error(&e));
            }
            Err(_) => {
                debug!("Connection to [{}] failed: i/o timeout", name);
                return Err(ProbeFailure::network(true, false));
            }
        };

        let ocsp_response = Arc::new(Mutex::new(Vec::new()));
        let config = self.client_config(Arc::clone(&ocsp_response)).map_err(|e| {
            debug!("Connection to [{}] failed: {}", name, e);
            ProbeFailure::tls(FailureCategory::Protocol)
        })?;
        let connector = TlsConnector::from(Arc::new(config));

        let tls_stream = match timeout_at(deadline, connector.connect(server_name, stream)).await {
            Ok(Ok(tls_stream)) => tls_stream,
            Ok(Err(e)) => {
                debug!("Connection to [{}] failed: {}", name, e);
                return Err(describe_handshake_error(&e));
            }
            Err(_) => {
                debug!("Connection to [{}] failed: TLS handshake timed out", name);
                return Err(ProbeFailure::tls(FailureCategory::Protocol));
            }
        };

        let (_, connection) = tls_stream.get_ref();
        let certificates = connection
            .peer_certificates()
            .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
            .unwrap_or_default();

        let ocsp_response = ocsp_response
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        Ok(Presented {
            certificates,
            ocsp_response,
        })
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(&self, name: &str, expected: &Fingerprint, dial_timeout: Duration) -> ProbeOutcome {
        match self.handshake(name, dial_timeout).await {
            Ok(presented) => evaluate_presented(
                presented.certificates.iter().map(Vec::as_slice),
                expected,
                &presented.ocsp_response,
            ),
            Err(failure) => classify(&failure),
        }
    }
}

/// Describe a failure to resolve or connect
fn describe_connect_error(e: &io::Error) -> ProbeFailure {
    match e.kind() {
        io::ErrorKind::TimedOut => ProbeFailure::network(true, false),
        io::ErrorKind::WouldBlock
        | io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ProbeFailure::network(false, true),
        _ => {
            // getaddrinfo's EAI_AGAIN only surfaces in the message
            let message = e.to_string().to_lowercase();
            let temporary = message.contains("temporary failure in name resolution")
                || message.contains("try again");
            ProbeFailure::network(false, temporary)
        }
    }
}

/// Describe a failure after the TCP connection was established
fn describe_handshake_error(e: &io::Error) -> ProbeFailure {
    let category = e
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .map(categorize_tls_error)
        .unwrap_or(FailureCategory::Protocol);

    ProbeFailure::tls(category)
}

fn categorize_tls_error(err: &rustls::Error) -> FailureCategory {
    let rustls::Error::InvalidCertificate(cert_err) = err else {
        return FailureCategory::Protocol;
    };

    match cert_err {
        CertificateError::UnknownIssuer => FailureCategory::UnknownAuthority,
        CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
            FailureCategory::NameMismatch
        }
        CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
            FailureCategory::Invalid(InvalidityReason::Expired)
        }
        other => {
            // webpki reports these through CertificateError::Other
            let detail = format!("{:?}", other);
            if detail.contains("CaUsedAsEndEntity") || detail.contains("EndEntityUsedAsCa") {
                FailureCategory::Invalid(InvalidityReason::NotAuthorizedToSign)
            } else {
                FailureCategory::Invalid(InvalidityReason::Other)
            }
        }
    }
}
