//! The connectionless UDP transport.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use radius_proto::MAX_PACKET_LEN;

use super::{resolve, Transport};
use crate::error::ClientError;

/// A one-shot send/await transport over a socket connected to the peer.
///
/// The socket-level connect filters inbound datagrams to the configured
/// remote, so anything received here already comes from the right server.
/// Holding the socket mutex across a whole exchange keeps at most one
/// request in flight, which is all the datagram flavour supports.
pub(crate) struct DatagramTransport {
    address: String,
    socket: Mutex<Option<UdpSocket>>,
}

impl DatagramTransport {
    pub(crate) fn new(address: String) -> Self {
        Self {
            address,
            socket: Mutex::new(None),
        }
    }

    async fn ensure_bound<'a>(
        &self,
        slot: &'a mut Option<UdpSocket>,
    ) -> Result<&'a UdpSocket, ClientError> {
        if slot.is_none() {
            let remote = resolve(&self.address).await?;
            let bind_address: SocketAddr = match remote {
                SocketAddr::V4(_) => "0.0.0.0:0".parse().expect("wildcard v4 address parses"),
                SocketAddr::V6(_) => "[::]:0".parse().expect("wildcard v6 address parses"),
            };

            let socket = UdpSocket::bind(bind_address).await?;
            socket.connect(remote).await?;
            debug!(%remote, "datagram socket bound");

            *slot = Some(socket);
        }

        // the socket was bound just above if it was missing
        Ok(slot.as_ref().unwrap())
    }
}

impl Transport for DatagramTransport {
    fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            let mut slot = self.socket.lock().await;
            self.ensure_bound(&mut slot).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        Box::pin(async move {
            // nothing to drain; dropping the socket unbinds it
            *self.socket.lock().await = None;
            Ok(())
        })
    }

    fn reset(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn has_pending(&self, _identifier: u8) -> bool {
        false
    }

    fn exchange(
        &self,
        frame: Vec<u8>,
        identifier: u8,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Vec<u8>, ClientError>> {
        Box::pin(async move {
            let mut slot = self.socket.lock().await;
            let socket = self.ensure_bound(&mut slot).await?;

            socket.send(&frame).await?;

            let deadline = Instant::now() + timeout;
            let mut buffer = vec![0u8; MAX_PACKET_LEN];
            loop {
                let remaining = deadline.duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ClientError::AttemptTimeout(timeout));
                }

                match tokio::time::timeout(remaining, socket.recv(&mut buffer)).await {
                    Err(_) => return Err(ClientError::AttemptTimeout(timeout)),
                    Ok(Err(error)) => return Err(error.into()),
                    Ok(Ok(received)) => {
                        if received >= 2 && buffer[1] == identifier {
                            return Ok(buffer[..received].to_vec());
                        }
                        // a stray or stale datagram; keep waiting for ours
                        trace!(received, "dropping datagram with unexpected identifier");
                    }
                }
            }
        })
    }
}
