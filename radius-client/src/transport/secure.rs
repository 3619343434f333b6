//! The RadSec (RFC 6614) connector: a TCP stream wrapped in TLS.

use std::io;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    self, ClientConfig, DigitallySignedStruct, SignatureScheme, SupportedProtocolVersion,
};
use tracing::debug;

use super::stream::StreamConnector;
use crate::config::{TlsOptions, TlsVersion, TrustConfig};
use crate::error::ClientError;

/// Connects a TCP stream and completes the TLS handshake inside `open`, so
/// the session's connection timeout bounds both together.
pub(crate) struct TlsStreamConnector {
    address: String,
    server_name: ServerName<'static>,
    connector: tokio_rustls::TlsConnector,
}

impl TlsStreamConnector {
    pub(crate) fn new(address: String, options: &TlsOptions) -> Result<Self, ClientError> {
        let config = build_client_config(options)?;
        let server_name = ServerName::try_from(options.server_name.clone())
            .map_err(|_| ClientError::InvalidServerName)?;

        Ok(Self {
            address,
            server_name,
            connector: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

impl StreamConnector for TlsStreamConnector {
    type Stream = TlsStream<TcpStream>;

    fn open(&self) -> BoxFuture<'_, io::Result<Self::Stream>> {
        Box::pin(async move {
            let tcp = TcpStream::connect(&*self.address).await?;
            tcp.set_nodelay(true)?;

            let stream = self.connector.connect(self.server_name.clone(), tcp).await?;
            debug!("TLS handshake complete");
            Ok(stream)
        })
    }
}

/// Builds the TLS engine configuration from the caller's options: their
/// trust anchors, and any protocol or cipher suite restrictions, passed
/// through verbatim.
fn build_client_config(options: &TlsOptions) -> Result<ClientConfig, ClientError> {
    let mut provider = aws_lc_rs::default_provider();
    if !options.enabled_cipher_suites.is_empty() {
        provider.cipher_suites = options.enabled_cipher_suites.clone();
    }
    let provider = Arc::new(provider);

    let versions: Vec<&'static SupportedProtocolVersion> = if options.enabled_protocols.is_empty() {
        rustls::DEFAULT_VERSIONS.to_vec()
    } else {
        options
            .enabled_protocols
            .iter()
            .map(|version| match version {
                TlsVersion::Tls12 => &rustls::version::TLS12,
                TlsVersion::Tls13 => &rustls::version::TLS13,
            })
            .collect()
    };

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&versions)?;

    let config = match &options.trust {
        TrustConfig::Roots(roots) => builder
            .with_root_certificates(Arc::clone(roots))
            .with_no_client_auth(),
        TrustConfig::TrustAny => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
            .with_no_client_auth(),
    };

    Ok(config)
}

/// Accepts any server certificate while still checking handshake
/// signatures. Reachable only through
/// [`TlsOptions::insecure_trust_any`](crate::TlsOptions::insecure_trust_any).
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
