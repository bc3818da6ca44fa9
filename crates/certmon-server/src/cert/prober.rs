use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certmon_common::types::CertificateInfo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::extract::certificate_info;
use super::resolve::{select_public_address, HostResolver};
use super::settle::SettleOnce;

/// Why a probe did not yield a certificate.
///
/// The `Display` text is what gets recorded on the domain and in its check
/// history, so it stays short and stable; details are kept in the payload
/// for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("DNS lookup failed")]
    DnsFailure(String),
    #[error("DNS lookup returned no public IPv4 addresses")]
    NoPublicAddress,
    #[error("TLS connection timed out")]
    Timeout,
    #[error("TLS connection failed")]
    ConnectionFailed(String),
    #[error("No certificate received")]
    NoCertificate,
    #[error("Failed to read certificate")]
    ReadFailure(String),
}

impl ProbeError {
    /// Underlying cause, when there is one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ProbeError::DnsFailure(d) | ProbeError::ConnectionFailed(d) | ProbeError::ReadFailure(d) => {
                Some(d)
            }
            _ => None,
        }
    }
}

/// Anything that can fetch the certificate a host presents.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn probe(
        &self,
        hostname: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<CertificateInfo, ProbeError>;
}

/// Accepts every certificate. The prober reports what the server presents,
/// trusted or not.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS prober restricted to public IPv4 targets.
#[derive(Clone)]
pub struct TlsProber {
    resolver: Arc<dyn HostResolver>,
    connector: TlsConnector,
}

impl TlsProber {
    pub fn new(resolver: Arc<dyn HostResolver>) -> anyhow::Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier(provider)))
            .with_no_client_auth();
        Ok(Self {
            resolver,
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn fetch(&self, hostname: &str, port: u16) -> Result<CertificateInfo, ProbeError> {
        let addresses = self
            .resolver
            .lookup_ipv4(hostname)
            .await
            .map_err(ProbeError::DnsFailure)?;
        let ip = select_public_address(&addresses).ok_or(ProbeError::NoPublicAddress)?;

        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|e| ProbeError::ConnectionFailed(e.to_string()))?;
        let tcp = TcpStream::connect(SocketAddr::from((ip, port)))
            .await
            .map_err(|e| ProbeError::ConnectionFailed(e.to_string()))?;
        let remote_ip = tcp
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| ip.to_string());

        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProbeError::ConnectionFailed(e.to_string()))?;
        let (_, connection) = tls.get_ref();
        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(ProbeError::NoCertificate)?;

        let mut info = certificate_info(leaf.as_ref())?;
        info.ip = Some(remote_ip);
        Ok(info)
    }
}

#[async_trait]
impl CertificateSource for TlsProber {
    async fn probe(
        &self,
        hostname: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<CertificateInfo, ProbeError> {
        let (cell, outcome) = SettleOnce::new();
        let cell = Arc::new(cell);

        let timer = {
            let cell = cell.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cell.settle(Err(ProbeError::Timeout));
            })
        };
        let worker = {
            let cell = cell.clone();
            let prober = self.clone();
            let hostname = hostname.to_string();
            tokio::spawn(async move {
                let result = prober.fetch(&hostname, port).await;
                cell.settle(result);
            })
        };

        let result = outcome.await.unwrap_or_else(|_| {
            Err(ProbeError::ConnectionFailed(
                "probe task ended without a result".to_string(),
            ))
        });
        // Whichever side lost is torn down, closing any open socket.
        timer.abort();
        worker.abort();
        result
    }
}
