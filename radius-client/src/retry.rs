//! Attempt scheduling: retransmission strategies and the driver that walks
//! a request through them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use radius_proto::{EncodedRequest, Packet, PacketCodec};

use crate::error::ClientError;
use crate::source::{IdentifierSequence, RandomSource};
use crate::transport::Transport;

/// Margin added to the summed per-attempt timeouts to form the total
/// deadline, covering connect time and scheduling slack.
const DEADLINE_OVERHEAD: Duration = Duration::from_secs(5);

/// The attempt schedule for one logical request.
///
/// Nothing here assumes the schedule is monotonic; constant and exponential
/// shapes are both fine.
pub trait RetransmissionStrategy: Send + Sync {
    /// How many transmissions to make at most. Must be at least 1.
    fn max_attempts(&self) -> u32;

    /// How long to wait for a reply to attempt `attempt` (zero-based).
    fn timeout_for_attempt(&self, attempt: u32) -> Duration;
}

/// The same timeout for every attempt. The default schedule is 3 attempts of
/// 5 seconds each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval {
    attempts: u32,
    timeout: Duration,
}

impl FixedInterval {
    /// A schedule of `attempts` transmissions with `timeout` each.
    pub fn new(attempts: u32, timeout: Duration) -> Self {
        Self { attempts, timeout }
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

impl RetransmissionStrategy for FixedInterval {
    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    fn timeout_for_attempt(&self, _attempt: u32) -> Duration {
        self.timeout
    }
}

/// A timeout that doubles on every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    attempts: u32,
    initial: Duration,
}

impl ExponentialBackoff {
    /// A schedule of `attempts` transmissions starting at `initial` and
    /// doubling each time.
    pub fn new(attempts: u32, initial: Duration) -> Self {
        Self { attempts, initial }
    }
}

impl RetransmissionStrategy for ExponentialBackoff {
    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        self.initial.saturating_mul(1u32 << attempt.min(31))
    }
}

/// The wall-clock budget a caller sees for one request under `strategy`.
pub(crate) fn total_deadline(strategy: &dyn RetransmissionStrategy) -> Duration {
    let mut total = DEADLINE_OVERHEAD;
    for attempt in 0..strategy.max_attempts() {
        total = total.saturating_add(strategy.timeout_for_attempt(attempt));
    }
    total
}

/// Owns the correlation between one logical request and its possibly many
/// wire transmissions: identifier allocation, encoding, the attempt loop,
/// and response validation.
pub(crate) struct RetryController {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) codec: PacketCodec,
    pub(crate) secret: Vec<u8>,
    pub(crate) random: Arc<dyn RandomSource>,
    pub(crate) identifiers: Arc<dyn IdentifierSequence>,
    pub(crate) strategy: Arc<dyn RetransmissionStrategy>,
    pub(crate) auto_reconnect: bool,
}

impl RetryController {
    pub(crate) fn total_deadline(&self) -> Duration {
        total_deadline(self.strategy.as_ref())
    }

    /// Drives one request to a validated response or a terminal error.
    ///
    /// The packet is encoded once; retransmissions reuse the same identifier
    /// and request authenticator, as the protocol expects.
    pub(crate) async fn send(&self, request: Packet) -> Result<Packet, ClientError> {
        let total = self.total_deadline();
        let deadline = Instant::now() + total;

        let identifier = self.next_free_identifier()?;
        let request = request.with_identifier(identifier);
        let encoded = self.codec.encode_request(
            &request,
            &self.secret,
            self.random.request_authenticator(),
        )?;

        let attempts = self.strategy.max_attempts().max(1);
        let mut last_error: Option<ClientError> = None;

        for attempt in 0..attempts {
            let remaining = deadline.duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::DeadlineExceeded(total));
            }

            match self.attempt(&encoded, identifier, attempt, remaining).await {
                Ok(reply) => {
                    return self
                        .codec
                        .decode_response(&reply, &self.secret, &encoded.authenticator())
                        .map_err(Into::into);
                }
                Err(error) if error.is_transient(self.auto_reconnect) => {
                    debug!(attempt, %error, "attempt failed, will retry");
                    // drop a broken stream session now so the next attempt
                    // starts from a fresh connect
                    self.transport.reset().await;
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        // the loop ran to completion, so its final iteration stored an error
        let source = last_error.expect("at least one attempt was made");
        Err(ClientError::RetriesExhausted {
            attempts,
            source: Box::new(source),
        })
    }

    async fn attempt(
        &self,
        encoded: &EncodedRequest,
        identifier: u8,
        attempt: u32,
        remaining: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }

        let timeout = self.strategy.timeout_for_attempt(attempt).min(remaining);
        self.transport
            .exchange(encoded.bytes().clone(), identifier, timeout)
            .await
    }

    /// Draws identifiers until one without an in-flight request turns up,
    /// giving up after a full sweep of the 8-bit space.
    fn next_free_identifier(&self) -> Result<u8, ClientError> {
        for _ in 0..=u8::MAX as usize {
            let identifier = self.identifiers.next_identifier();
            if !self.transport.has_pending(identifier) {
                return Ok(identifier);
            }
        }

        Err(ClientError::NoFreeIdentifier)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;

    use radius_proto::{PacketCode, StandardDictionary};

    use super::*;
    use crate::source::CountingSequence;

    /// A transport that never hears back: every exchange times out.
    #[derive(Default)]
    struct SilentTransport {
        pending: HashSet<u8>,
        exchanges: AtomicU32,
    }

    impl Transport for SilentTransport {
        fn connect(&self) -> BoxFuture<'_, Result<(), ClientError>> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> BoxFuture<'_, Result<(), ClientError>> {
            Box::pin(async { Ok(()) })
        }

        fn reset(&self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn has_pending(&self, identifier: u8) -> bool {
            self.pending.contains(&identifier)
        }

        fn exchange(
            &self,
            _frame: Vec<u8>,
            _identifier: u8,
            timeout: Duration,
        ) -> BoxFuture<'_, Result<Vec<u8>, ClientError>> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Err(ClientError::AttemptTimeout(timeout)) })
        }
    }

    fn controller(transport: Arc<SilentTransport>, strategy: impl RetransmissionStrategy + 'static) -> RetryController {
        RetryController {
            transport,
            codec: PacketCodec::new(Arc::new(StandardDictionary)),
            secret: b"sec".to_vec(),
            random: Arc::new(crate::source::OsRandom),
            identifiers: Arc::new(CountingSequence::new(0)),
            strategy: Arc::new(strategy),
            auto_reconnect: true,
        }
    }

    #[test]
    fn total_deadline_sums_the_schedule_plus_overhead() {
        let fixed = FixedInterval::new(3, Duration::from_secs(2));
        assert_eq!(total_deadline(&fixed), Duration::from_secs(2 * 3 + 5));

        let backoff = ExponentialBackoff::new(3, Duration::from_secs(1));
        assert_eq!(backoff.timeout_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff.timeout_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.timeout_for_attempt(2), Duration::from_secs(4));
        assert_eq!(total_deadline(&backoff), Duration::from_secs(1 + 2 + 4 + 5));
    }

    #[test]
    fn default_schedule_is_three_by_five_seconds() {
        let strategy = FixedInterval::default();
        assert_eq!(strategy.max_attempts(), 3);
        assert_eq!(strategy.timeout_for_attempt(0), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn silent_server_exhausts_exactly_max_attempts() {
        let transport = Arc::new(SilentTransport::default());
        let controller = controller(
            Arc::clone(&transport),
            FixedInterval::new(2, Duration::from_millis(1)),
        );

        let error = controller
            .send(Packet::new(PacketCode::AccessRequest))
            .await
            .expect_err("a silent transport cannot produce a response");

        match error {
            ClientError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, ClientError::AttemptTimeout(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }

        // invariant: no more writes than the strategy allows
        assert_eq!(transport.exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn identifier_sweep_skips_pending_slots() {
        let mut transport = SilentTransport::default();
        transport.pending.insert(0);
        transport.pending.insert(1);

        let controller = controller(
            Arc::new(transport),
            FixedInterval::new(1, Duration::from_millis(1)),
        );

        assert_eq!(controller.next_free_identifier().unwrap(), 2);
    }

    #[tokio::test]
    async fn full_pending_table_yields_no_free_identifier() {
        let mut transport = SilentTransport::default();
        for identifier in 0..=u8::MAX {
            transport.pending.insert(identifier);
        }

        let controller = controller(
            Arc::new(transport),
            FixedInterval::new(1, Duration::from_millis(1)),
        );

        assert!(matches!(
            controller.next_free_identifier(),
            Err(ClientError::NoFreeIdentifier)
        ));
    }
}
