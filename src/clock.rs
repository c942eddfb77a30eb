//! Injectable time and identifier sources.
//!
//! Every component that stamps records or generates identifiers takes these
//! as constructor arguments so tests can drive them deterministically.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // A clock set before the epoch cannot be represented; report zero.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Source of random identifier suffixes.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh suffix for an identifier.
    fn suffix(&self) -> String;
}

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Generates nine-character base36 suffixes from the thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn suffix(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..SUFFIX_LEN)
            .filter_map(|_| SUFFIX_ALPHABET.get(rng.gen_range(0..SUFFIX_ALPHABET.len())))
            .map(|byte| char::from(*byte))
            .collect()
    }
}

/// Builds an identifier of the form `{prefix}_{timestamp}_{suffix}`.
#[must_use]
pub fn make_id(prefix: &str, timestamp: u64, suffix: &str) -> String {
    format!("{prefix}_{timestamp}_{suffix}")
}

#[cfg(any(test, feature = "test-support"))]
mod manual {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::{Clock, IdGenerator};

    /// Clock that only moves when told to.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now: AtomicU64,
    }

    impl ManualClock {
        /// Creates a clock reading `start` milliseconds.
        #[must_use]
        pub const fn new(start: u64) -> Self {
            Self {
                now: AtomicU64::new(start),
            }
        }

        /// Moves the clock forward by `millis`.
        pub fn advance(&self, millis: u64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }

        /// Sets the clock to an absolute reading.
        pub fn set(&self, millis: u64) {
            self.now.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    /// Generates `000001`, `000002`, ... suffixes.
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl IdGenerator for SequentialIdGenerator {
        fn suffix(&self) -> String {
            let value = self.next.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            format!("{value:06}")
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use manual::{ManualClock, SequentialIdGenerator};
