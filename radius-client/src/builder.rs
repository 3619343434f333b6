//! Typed construction of a [`Client`].

use std::sync::Arc;

use tokio::runtime::{Builder as RuntimeBuilder, Handle};

use radius_proto::{Dictionary, PacketCodec, StandardDictionary};

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::retry::{FixedInterval, RetransmissionStrategy, RetryController};
use crate::source::{CountingSequence, IdentifierSequence, OsRandom, RandomSource};
use crate::transport::datagram::DatagramTransport;
use crate::transport::secure::TlsStreamConnector;
use crate::transport::stream::{ProbeContext, StreamTransport, TcpConnector};
use crate::transport::{Transport, TransportProtocol};
use crate::{Client, RuntimeFlavor};

/// Assembles a [`Client`] from its collaborators, defaulting everything but
/// the server address and shared secret.
///
/// Defaults: UDP transport, the standard attribute dictionary, the OS
/// CSPRNG, a randomly seeded wrapping identifier counter, the 3-by-5-seconds
/// retransmission schedule, and a private runtime owned by the client.
pub struct ClientBuilder {
    address: String,
    secret: Vec<u8>,
    protocol: TransportProtocol,
    dictionary: Arc<dyn Dictionary>,
    random: Arc<dyn RandomSource>,
    identifiers: Arc<dyn IdentifierSequence>,
    strategy: Arc<dyn RetransmissionStrategy>,
    config: ConnectionConfig,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    pub(crate) fn new(address: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            address: address.into(),
            secret: secret.as_ref().to_owned(),
            protocol: TransportProtocol::default(),
            dictionary: Arc::new(StandardDictionary),
            random: Arc::new(OsRandom),
            identifiers: Arc::new(CountingSequence::default()),
            strategy: Arc::new(FixedInterval::default()),
            config: ConnectionConfig::default(),
            runtime: None,
        }
    }

    /// Selects the wire flavour.
    pub fn transport(mut self, protocol: TransportProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Replaces the attribute dictionary.
    pub fn dictionary(mut self, dictionary: Arc<dyn Dictionary>) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Replaces the source of request authenticators.
    pub fn random_source(mut self, source: Arc<dyn RandomSource>) -> Self {
        self.random = source;
        self
    }

    /// Replaces the packet identifier generator.
    pub fn identifier_sequence(mut self, sequence: Arc<dyn IdentifierSequence>) -> Self {
        self.identifiers = sequence;
        self
    }

    /// Replaces the retransmission schedule.
    pub fn retransmission_strategy(mut self, strategy: Arc<dyn RetransmissionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the connection configuration.
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the client on the caller's runtime instead of a private one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<Client, ClientError> {
        if self.secret.is_empty() {
            return Err(ClientError::InvalidConfig("shared secret must not be empty"));
        }
        if self.strategy.max_attempts() == 0 {
            return Err(ClientError::InvalidConfig(
                "retransmission strategy must allow at least one attempt",
            ));
        }

        let runtime = match self.runtime {
            Some(handle) => RuntimeFlavor::Shared(handle),
            None => {
                let runtime = RuntimeBuilder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()?;
                RuntimeFlavor::Owned(runtime)
            }
        };
        let handle = runtime.handle().clone();

        let codec = PacketCodec::new(Arc::clone(&self.dictionary));
        let secure = matches!(self.protocol, TransportProtocol::Tls(_));

        let probe = || ProbeContext {
            codec: codec.clone(),
            secret: self.secret.clone(),
            random: Arc::clone(&self.random),
            identifiers: Arc::clone(&self.identifiers),
        };

        let transport: Arc<dyn Transport> = match &self.protocol {
            TransportProtocol::Udp => Arc::new(DatagramTransport::new(self.address.clone())),
            TransportProtocol::Tcp => Arc::new(StreamTransport::new(
                TcpConnector {
                    address: self.address.clone(),
                },
                self.config.clone(),
                probe(),
                handle,
            )),
            TransportProtocol::Tls(options) => {
                let connector = TlsStreamConnector::new(self.address.clone(), options)?;
                Arc::new(StreamTransport::new(
                    connector,
                    self.config.clone(),
                    probe(),
                    handle,
                ))
            }
        };

        let controller = RetryController {
            transport,
            codec,
            secret: self.secret,
            random: self.random,
            identifiers: self.identifiers,
            strategy: self.strategy,
            auto_reconnect: self.config.auto_reconnect_enabled,
        };

        Ok(Client {
            controller: Arc::new(controller),
            runtime: Arc::new(runtime),
            secure,
        })
    }
}
