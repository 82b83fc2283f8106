//! Record Identifier Generation
//!
//! Every record key is a 16-byte identifier assigned at write time:
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────┐
//! │ unix millis (48 bits BE) │ random / counter (80 bits BE)        │
//! └──────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! The keyspace orders keys lexicographically, so FIFO order depends
//! on identifiers sorting in generation order. Within one generator this is
//! strict: when the clock has not advanced (or went backwards) the random
//! part of the previous identifier is incremented instead of redrawn.
//! Across restarts the store feeds the newest stored key of each bucket back
//! through `advance_past`, so a wall clock that stepped back between runs
//! cannot sort new records ahead of old ones.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;

/// Identifier length in bytes
pub const RECORD_ID_LEN: usize = 16;

const TIMESTAMP_BITS: u32 = 48;
const RANDOM_BITS: u32 = 80;
const TIMESTAMP_MAX: u64 = (1 << TIMESTAMP_BITS) - 1;
const RANDOM_MAX: u128 = (1 << RANDOM_BITS) - 1;

/// A time-sortable unique record key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId([u8; RECORD_ID_LEN]);

impl RecordId {
    fn from_parts(millis: u64, random: u128) -> Self {
        debug_assert!(millis <= TIMESTAMP_MAX, "Precondition: timestamp fits 48 bits");
        debug_assert!(random <= RANDOM_MAX, "Precondition: random part fits 80 bits");

        let packed = ((millis as u128) << RANDOM_BITS) | random;
        RecordId(packed.to_be_bytes())
    }

    /// Rebuild an identifier from stored key bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; RECORD_ID_LEN] = bytes.try_into().ok()?;
        Some(RecordId(array))
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_ID_LEN] {
        &self.0
    }

    /// Milliseconds since the Unix epoch at generation time
    pub fn timestamp_millis(&self) -> u64 {
        (u128::from_be_bytes(self.0) >> RANDOM_BITS) as u64
    }

    fn random_part(&self) -> u128 {
        u128::from_be_bytes(self.0) & RANDOM_MAX
    }
}

impl AsRef<[u8]> for RecordId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self)
    }
}

struct GeneratorState {
    last_millis: u64,
    last_random: u128,
    rng: ChaCha8Rng,
}

impl GeneratorState {
    fn draw_random(&mut self) -> u128 {
        let high = self.rng.next_u64() as u128;
        let low = (self.rng.next_u32() & 0xFFFF) as u128;
        ((high << 16) | low) & RANDOM_MAX
    }
}

/// Thread-safe monotonic identifier generator
pub struct IdGenerator {
    clock: Box<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    /// Generator on the system clock with an entropy-seeded RNG
    pub fn new() -> Self {
        Self::with_parts(Box::new(SystemClock), ChaCha8Rng::from_entropy())
    }

    /// Deterministic generator (for DST and tests)
    pub fn with_seed(clock: impl Clock, seed: u64) -> Self {
        Self::with_parts(Box::new(clock), ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_parts(clock: Box<dyn Clock>, rng: ChaCha8Rng) -> Self {
        IdGenerator {
            clock,
            state: Mutex::new(GeneratorState {
                last_millis: 0,
                last_random: 0,
                rng,
            }),
        }
    }

    /// Produce the next identifier.
    ///
    /// Strictly greater than every identifier previously returned by this
    /// generator, whichever thread asked for it.
    pub fn next_id(&self) -> RecordId {
        let now = self.clock.now_millis().min(TIMESTAMP_MAX);
        let mut state = self.state.lock();

        if now > state.last_millis {
            state.last_millis = now;
            state.last_random = state.draw_random();
        } else if state.last_random < RANDOM_MAX {
            state.last_random += 1;
        } else {
            // Counter exhausted inside this millisecond: borrow the next one.
            state.last_millis = (state.last_millis + 1).min(TIMESTAMP_MAX);
            state.last_random = state.draw_random() >> 1;
        }

        RecordId::from_parts(state.last_millis, state.last_random)
    }

    /// Make every later `next_id` sort after `seen`. No-op if this generator
    /// is already past it.
    pub fn advance_past(&self, seen: RecordId) {
        let mut state = self.state.lock();
        let current = RecordId::from_parts(state.last_millis, state.last_random);
        if seen > current {
            state.last_millis = seen.timestamp_millis();
            state.last_random = seen.random_part();
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("last_millis", &self.state.lock().last_millis)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_ids_strictly_increase_on_frozen_clock() {
        let generator = IdGenerator::with_seed(ManualClock::new(1_700_000_000_000), 7);

        let mut previous = generator.next_id();
        for _ in 0..10_000 {
            let id = generator.next_id();
            assert!(id > previous, "{} should sort after {}", id, previous);
            previous = id;
        }
    }

    #[test]
    fn test_ids_increase_when_clock_goes_backwards() {
        let clock = ManualClock::new(1_700_000_000_000);
        let generator = IdGenerator::with_seed(clock.clone(), 1);

        let before = generator.next_id();
        clock.set(1_600_000_000_000);
        let after = generator.next_id();

        assert!(after > before);
        assert_eq!(after.timestamp_millis(), before.timestamp_millis());
    }

    #[test]
    fn test_timestamp_prefix_tracks_clock() {
        let clock = ManualClock::new(1_700_000_000_000);
        let generator = IdGenerator::with_seed(clock.clone(), 3);

        let first = generator.next_id();
        clock.advance(Duration::from_millis(5));
        let second = generator.next_id();

        assert_eq!(first.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(second.timestamp_millis(), 1_700_000_000_005);
        assert!(second > first);
    }

    #[test]
    fn test_advance_past_survives_clock_step_back() {
        let stored = IdGenerator::with_seed(ManualClock::new(1_700_000_000_000), 1).next_id();

        // A later run whose clock is an hour behind
        let generator = IdGenerator::with_seed(ManualClock::new(1_699_996_400_000), 2);
        generator.advance_past(stored);
        let id = generator.next_id();
        assert!(id > stored, "{} should sort after {}", id, stored);

        // Older ids do not pull the generator back
        generator.advance_past(RecordId::from_parts(5, 5));
        assert!(generator.next_id() > id);
    }

    #[test]
    fn test_counter_overflow_carries_into_timestamp() {
        let generator = IdGenerator::with_seed(ManualClock::new(42), 0);
        generator.next_id();
        generator.state.lock().last_random = RANDOM_MAX;

        let id = generator.next_id();
        assert_eq!(id.timestamp_millis(), 43);
    }

    #[test]
    fn test_concurrent_ids_unique_and_sorted_per_thread() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..2_000).map(|_| generator.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(all.len(), 16_000);
    }

    #[test]
    fn test_display_and_from_slice() {
        let id = RecordId::from_parts(1, 2);
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(RecordId::from_slice(id.as_bytes()), Some(id));
        assert_eq!(RecordId::from_slice(&[0u8; 3]), None);
    }
}
