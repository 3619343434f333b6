//! # radius-client
//!
//! An asynchronous RADIUS ([RFC2865]) client over three wire transports:
//! classic UDP datagrams, length-prefixed TCP streams, and RadSec
//! ([RFC6614], the stream wrapped in TLS). On top of the transport sits a
//! configurable retransmission schedule with a total deadline, and both
//! blocking and async entry points.
//!
//! ```no_run
//! use radius_client::proto::attribute::types;
//! use radius_client::proto::{Attribute, Packet, PacketCode};
//! use radius_client::Client;
//!
//! # fn main() -> Result<(), radius_client::ClientError> {
//! let client = Client::builder("127.0.0.1:1812", "secret").build()?;
//!
//! let request = Packet::new(PacketCode::AccessRequest)
//!     .with_attribute(Attribute::text(types::USER_NAME, "alice")?);
//!
//! let reply = client.send(request)?;
//! assert_eq!(reply.code(), PacketCode::AccessAccept);
//! # Ok(())
//! # }
//! ```
//!
//! [RFC2865]: https://www.rfc-editor.org/rfc/rfc2865
//! [RFC6614]: https://www.rfc-editor.org/rfc/rfc6614

#![warn(missing_docs)]

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};

mod builder;
mod config;
mod error;
mod retry;
mod source;
mod transport;

use retry::RetryController;

pub use builder::ClientBuilder;
pub use config::{ConnectionConfig, TlsOptions, TlsVersion};
pub use error::ClientError;
pub use retry::{ExponentialBackoff, FixedInterval, RetransmissionStrategy};
pub use source::{CountingSequence, IdentifierSequence, OsRandom, RandomSource};
pub use transport::TransportProtocol;

// reexported for ease of access
pub use radius_proto as proto;
pub use radius_proto::{Attribute, Dictionary, Packet, PacketCode, StandardDictionary};

/// The executor a client runs its transport tasks on: either the caller's
/// runtime or one the client owns.
enum RuntimeFlavor {
    Owned(Runtime),
    Shared(Handle),
}

impl RuntimeFlavor {
    fn handle(&self) -> &Handle {
        match self {
            Self::Owned(runtime) => runtime.handle(),
            Self::Shared(handle) => handle,
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self {
            Self::Owned(runtime) => runtime.block_on(future),
            Self::Shared(handle) => handle.block_on(future),
        }
    }
}

/// A RADIUS client.
///
/// Cheap to clone; clones share the transport session, the identifier space
/// and the executor. Concurrent sends are fine on the stream transports
/// (each gets its own identifier) and serialized on the datagram transport.
#[derive(Clone)]
pub struct Client {
    controller: Arc<RetryController>,
    runtime: Arc<RuntimeFlavor>,
    secure: bool,
}

impl Client {
    /// Starts building a client for the given server address and shared
    /// secret.
    pub fn builder(address: impl Into<String>, secret: impl AsRef<[u8]>) -> ClientBuilder {
        ClientBuilder::new(address, secret)
    }

    /// Sends a request and awaits its validated response.
    ///
    /// The retransmission strategy governs attempts and per-attempt
    /// timeouts; the call as a whole never outlives the strategy's total
    /// deadline. On RadSec, Access-Requests get a Message-Authenticator
    /// appended automatically if the caller did not add one.
    pub async fn send_async(&self, request: Packet) -> Result<Packet, ClientError> {
        let request = if self.secure && request.code() == PacketCode::AccessRequest {
            request.with_message_authenticator()
        } else {
            request
        };

        self.controller.send(request).await
    }

    /// Blocking form of [`send_async`](Self::send_async), bounded by the
    /// same total deadline.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async context; use
    /// [`send_async`](Self::send_async) there instead.
    pub fn send(&self, request: Packet) -> Result<Packet, ClientError> {
        let deadline = self.controller.total_deadline();
        self.runtime.block_on(async {
            match tokio::time::timeout(deadline, self.send_async(request)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::DeadlineExceeded(deadline)),
            }
        })
    }

    /// Establishes the transport session up front.
    ///
    /// Stream transports connect (and handshake, for RadSec); the datagram
    /// transport just binds its socket.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.controller.transport.connect().await
    }

    /// Closes the transport for good. Outstanding requests complete with
    /// [`ClientError::TransportClosed`]. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.controller.transport.close().await
    }

    /// Whether a send can currently go out without connecting first. Always
    /// true for the datagram transport.
    pub fn is_connected(&self) -> bool {
        self.controller.transport.is_connected()
    }

    /// Drops the current session, if any, and establishes a fresh one.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.controller.transport.reset().await;
        self.controller.transport.connect().await
    }
}
