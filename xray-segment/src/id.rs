use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs, Rng, SeedableRng};
use thiserror::Error;

const VERSION_KEY: &str = "1";

/// Error returned when a trace or segment identifier cannot be parsed.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("identifier is not a valid hex string of the expected shape")]
pub struct ParseIdError;

/// A 128-bit trace identifier.
///
/// The text form is the three-part X-Ray shape: the version (always `1`), the
/// epoch seconds of the original request in 8 hex digits, and a 96-bit random
/// value in 24 hex digits, e.g. `1-58406520-a006649127e371903a2de979`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Composes a trace id from the request epoch seconds and a 96-bit random value.
    pub fn new(epoch_secs: u32, unique: u128) -> Self {
        TraceId(((epoch_secs as u128) << 96) | (unique & ((1u128 << 96) - 1)))
    }

    /// The epoch seconds embedded in the top 32 bits.
    pub fn epoch_secs(&self) -> u32 {
        (self.0 >> 96) as u32
    }

    /// Returns the raw 128-bit value.
    pub fn to_u128(self) -> u128 {
        self.0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl FromStr for TraceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_terminator('-').collect();
        if parts.len() != 3 || parts[0] != VERSION_KEY {
            return Err(ParseIdError);
        }
        if parts[1].len() != 8 || parts[2].len() != 24 {
            return Err(ParseIdError);
        }

        let epoch = u32::from_str_radix(parts[1], 16).map_err(|_| ParseIdError)?;
        let unique = u128::from_str_radix(parts[2], 16).map_err(|_| ParseIdError)?;

        Ok(TraceId::new(epoch, unique))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:08x}-{:024x}",
            VERSION_KEY,
            self.epoch_secs(),
            self.0 & ((1u128 << 96) - 1)
        )
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({self})")
    }
}

/// A 64-bit segment identifier, rendered as 16 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(u64);

impl SegmentId {
    /// Returns the raw 64-bit value.
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SegmentId {
    fn from(value: u64) -> Self {
        SegmentId(value)
    }
}

impl FromStr for SegmentId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(ParseIdError);
        }
        u64::from_str_radix(s, 16).map(SegmentId).map_err(|_| ParseIdError)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({self})")
    }
}

/// Interface for generating identifiers.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SegmentId`.
    fn new_segment_id(&self) -> SegmentId;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates trace and segment ids using a random number generator, embedding
/// the current epoch seconds into each trace id.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        let epoch_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or(0);
        CURRENT_RNG.with(|rng| TraceId::new(epoch_secs, rng.borrow_mut().random::<u128>()))
    }

    fn new_segment_id(&self) -> SegmentId {
        CURRENT_RNG.with(|rng| SegmentId::from(rng.borrow_mut().random::<u64>()))
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

#[cfg(feature = "testing")]
pub use increment::IncrementIdGenerator;

#[cfg(feature = "testing")]
mod increment {
    use super::{IdGenerator, SegmentId, TraceId};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// [`IdGenerator`] implementation that increments a counter for each new ID. This helps produce
    /// predictable IDs for testing.
    #[derive(Clone, Debug)]
    pub struct IncrementIdGenerator(Arc<AtomicU64>);

    impl IncrementIdGenerator {
        /// Create a new [`IncrementIdGenerator`]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Default for IncrementIdGenerator {
        fn default() -> Self {
            Self(Arc::new(AtomicU64::new(1)))
        }
    }

    impl IdGenerator for IncrementIdGenerator {
        fn new_trace_id(&self) -> TraceId {
            TraceId::from(self.0.fetch_add(1, Ordering::SeqCst) as u128)
        }

        fn new_segment_id(&self) -> SegmentId {
            SegmentId::from(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }
}
