//! Injectable entropy and identifier allocation.

use std::sync::atomic::{AtomicU8, Ordering};

use rand::rngs::OsRng;
use rand::RngCore;

/// A source of cryptographically secure random bytes.
///
/// Request authenticators are drawn from here; a deterministic
/// implementation makes exchanges reproducible in tests.
pub trait RandomSource: Send + Sync {
    /// Fills the buffer with random bytes.
    fn fill(&self, buffer: &mut [u8]);

    /// Draws a 16-byte request authenticator.
    fn request_authenticator(&self) -> [u8; 16] {
        let mut authenticator = [0u8; 16];
        self.fill(&mut authenticator);
        authenticator
    }
}

/// The operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buffer: &mut [u8]) {
        let mut rng = OsRng;
        rng.fill_bytes(buffer);
    }
}

/// Allocates the identifier octet for outgoing requests.
///
/// The client sweeps this source for a slot that is not already in flight,
/// so implementations only need to produce a fair rotation, not uniqueness.
pub trait IdentifierSequence: Send + Sync {
    /// Produces the next candidate identifier.
    fn next_identifier(&self) -> u8;
}

/// An incrementing counter wrapping at 256, seeded per instance.
#[derive(Debug)]
pub struct CountingSequence {
    counter: AtomicU8,
}

impl CountingSequence {
    /// Starts the counter at the given seed.
    pub fn new(seed: u8) -> Self {
        Self {
            counter: AtomicU8::new(seed),
        }
    }
}

impl Default for CountingSequence {
    /// Seeds the counter randomly so concurrent clients against the same
    /// server do not start on colliding identifiers.
    fn default() -> Self {
        let mut seed = [0u8; 1];
        OsRng.fill_bytes(&mut seed);
        Self::new(seed[0])
    }
}

impl IdentifierSequence for CountingSequence {
    fn next_identifier(&self) -> u8 {
        // AtomicU8 wraps on overflow, which is exactly the 256-slot rotation
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}
