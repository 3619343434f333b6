use std::io;
use std::time::Duration;

use thiserror::Error;

use radius_proto::{DecodeError, EncodeError};

/// An error during a RADIUS exchange.
///
/// Transient errors are absorbed by the retransmission loop until its attempt
/// budget or total deadline runs out; everything else surfaces to the caller
/// immediately.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The outbound packet could not be serialized.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The server reply failed parsing or authenticator validation.
    #[error("invalid packet received from server: {0}")]
    Decode(#[from] DecodeError),

    /// An error occurred on the local socket.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A stream-transport send reused an identifier that is still in flight.
    #[error("identifier {0} already has a request in flight")]
    DuplicateIdentifier(u8),

    /// Every one of the 256 identifiers has a request in flight.
    #[error("no free identifier after sweeping all 256 slots")]
    NoFreeIdentifier,

    /// Connecting (including any TLS handshake) exceeded the configured
    /// connection timeout.
    #[error("connect and handshake did not finish within {0:?}")]
    ConnectTimeout(Duration),

    /// The session broke mid-exchange.
    #[error("connection to the server was lost")]
    ConnectionLost,

    /// No response arrived within one attempt's timeout.
    #[error("no response within the {0:?} attempt timeout")]
    AttemptTimeout(Duration),

    /// The whole request missed its total deadline.
    #[error("request missed its total deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Every attempt the strategy allowed has failed.
    #[error("request failed after {attempts} attempts")]
    RetriesExhausted {
        /// How many transmissions were made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: Box<ClientError>,
    },

    /// The transport was closed while the request was outstanding.
    #[error("transport closed while the request was outstanding")]
    TransportClosed,

    /// Automatic reconnection gave up after the configured cap.
    #[error("gave up reconnecting after {0} attempts")]
    ReconnectExceeded(u32),

    /// The TLS engine rejected the supplied configuration.
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    /// The TLS server name is not a valid DNS name or IP address.
    #[error("invalid TLS server name")]
    InvalidServerName,

    /// The builder was given an unusable combination of options.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(&'static str),
}

impl ClientError {
    /// Whether the retransmission loop may swallow this error and try again.
    ///
    /// Connection-level failures on stream transports are only worth
    /// retrying when the session is allowed to reconnect.
    pub(crate) fn is_transient(&self, auto_reconnect: bool) -> bool {
        match self {
            Self::AttemptTimeout(_) | Self::Io(_) => true,
            Self::ConnectTimeout(_) | Self::ConnectionLost => auto_reconnect,
            _ => false,
        }
    }
}
