//! Connection and TLS configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::rustls::{RootCertStore, SupportedCipherSuite};

/// Options governing a transport session's lifecycle.
///
/// All fields have explicit defaults; construct with struct update syntax or
/// mutate a [`Default`] value.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interval between Status-Server liveness probes on an idle stream
    /// session. `None` disables keep-alive. Ignored by the datagram
    /// transport.
    pub keep_alive_interval: Option<Duration>,

    /// Upper bound on a single connect, TLS handshake included.
    pub connection_timeout: Duration,

    /// Whether broken stream sessions are re-established in the background.
    pub auto_reconnect_enabled: bool,

    /// Cap on consecutive reconnect tries; exceeding it is fatal for the
    /// session.
    pub max_reconnect_attempts: u32,

    /// Pause between reconnect tries.
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: None,
            connection_timeout: Duration::from_secs(10),
            auto_reconnect_enabled: true,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// TLS protocol versions the secure transport may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    /// TLS 1.2.
    Tls12,
    /// TLS 1.3.
    Tls13,
}

/// How the secure transport decides whether to trust the peer.
#[derive(Debug, Clone)]
pub(crate) enum TrustConfig {
    /// Validate the peer chain against the caller's trust anchors.
    Roots(Arc<RootCertStore>),
    /// Accept any certificate. Test servers only.
    TrustAny,
}

/// Configuration for the RadSec (RFC 6614) transport.
///
/// The trust configuration is always supplied by the caller; this crate
/// embeds no certificates and no default validation policy.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    pub(crate) server_name: String,
    pub(crate) trust: TrustConfig,
    pub(crate) enabled_protocols: Vec<TlsVersion>,
    pub(crate) enabled_cipher_suites: Vec<SupportedCipherSuite>,
}

impl TlsOptions {
    /// TLS options validating the peer against the given trust anchors.
    ///
    /// `server_name` is used for SNI and certificate matching.
    pub fn new(server_name: impl Into<String>, roots: RootCertStore) -> Self {
        Self {
            server_name: server_name.into(),
            trust: TrustConfig::Roots(Arc::new(roots)),
            enabled_protocols: Vec::new(),
            enabled_cipher_suites: Vec::new(),
        }
    }

    /// TLS options that accept any server certificate.
    ///
    /// This performs no peer verification whatsoever and exists for test
    /// servers with throwaway certificates. Never use it against a real
    /// RADIUS server.
    pub fn insecure_trust_any(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            trust: TrustConfig::TrustAny,
            enabled_protocols: Vec::new(),
            enabled_cipher_suites: Vec::new(),
        }
    }

    /// Restricts negotiation to the given protocol versions. An empty list
    /// leaves the TLS engine's defaults in place.
    pub fn with_protocols(mut self, protocols: impl IntoIterator<Item = TlsVersion>) -> Self {
        self.enabled_protocols = protocols.into_iter().collect();
        self
    }

    /// Restricts negotiation to the given cipher suites, passed verbatim to
    /// the TLS engine. An empty list leaves the provider defaults in place.
    pub fn with_cipher_suites(
        mut self,
        suites: impl IntoIterator<Item = SupportedCipherSuite>,
    ) -> Self {
        self.enabled_cipher_suites = suites.into_iter().collect();
        self
    }
}
