//! The uniform send/receive abstraction over the three wire flavours.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::lookup_host;

use crate::config::TlsOptions;
use crate::error::ClientError;

pub(crate) mod datagram;
pub(crate) mod secure;
pub(crate) mod stream;

/// Which wire flavour a client speaks.
#[derive(Debug, Clone, Default)]
pub enum TransportProtocol {
    /// Classic connectionless RADIUS over UDP (default ports 1812/1813).
    #[default]
    Udp,
    /// RADIUS over a length-prefixed TCP stream.
    Tcp,
    /// RadSec: the TCP stream wrapped in a TLS session (default port 2083).
    Tls(TlsOptions),
}

/// One wire transport instance.
///
/// Implementations own their framing, connection lifecycle and response
/// multiplexing; the retransmission loop above them only ever sees
/// `exchange` plus lifecycle calls. Methods hand back pinned boxed futures
/// so the trait stays object-safe.
pub(crate) trait Transport: Send + Sync {
    /// Brings the transport into a usable state. Idempotent when already
    /// connected; fails once the transport has been closed.
    fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>>;

    /// Terminal teardown. Outstanding exchanges complete with
    /// [`ClientError::TransportClosed`]. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<(), ClientError>>;

    /// Drops the current session, if any, without latching the transport
    /// closed; outstanding exchanges complete with
    /// [`ClientError::ConnectionLost`] and a later `connect` starts fresh.
    fn reset(&self) -> BoxFuture<'_, ()>;

    /// Whether a send can be attempted right now. Always true for the
    /// datagram transport.
    fn is_connected(&self) -> bool;

    /// Whether a request with this identifier is already in flight.
    fn has_pending(&self, identifier: u8) -> bool;

    /// Sends one encoded packet and awaits the matching reply frame, bounded
    /// by the per-attempt timeout.
    fn exchange(
        &self,
        frame: Vec<u8>,
        identifier: u8,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<u8>, ClientError>>;
}

/// Resolves a `host:port` string to the first usable socket address.
pub(crate) async fn resolve(address: &str) -> Result<SocketAddr, ClientError> {
    lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| {
            ClientError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "server address did not resolve",
            ))
        })
}
