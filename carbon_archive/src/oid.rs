use std::time::{SystemTime, UNIX_EPOCH};

use xxhash_rust::xxh3::xxh3_64;

use carbon_core::{Error, Result};

/// Bits of an object id holding the per-archive counter.
pub const COUNTER_BITS: u32 = 40;
pub const SESSION_MASK: u64 = (1 << 24) - 1;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Hands out object ids as `(session << 40) | counter`.
///
/// The counter starts at 1 and increases by one per object or synthesized
/// column-group row, so ids never repeat inside one archive. The 24-bit
/// session separates archives written at different times or by different
/// processes.
#[derive(Debug, Clone)]
pub struct ObjectIdGenerator {
    session: u64,
    counter: u64,
}

impl ObjectIdGenerator {
    /// Use `session` if given, otherwise derive one from the clock and pid.
    pub fn new(session: Option<u32>) -> Self {
        let session = match session {
            Some(s) => u64::from(s) & SESSION_MASK,
            None => random_session(),
        };
        Self { session, counter: 0 }
    }

    pub fn session(&self) -> u32 {
        self.session as u32
    }

    /// Ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter
    }

    pub fn next_id(&mut self) -> Result<u64> {
        if self.counter >= COUNTER_MASK {
            return Err(Error::AllocationFailure(format!(
                "object id counter exhausted after {} ids",
                self.counter
            )));
        }
        self.counter += 1;
        Ok((self.session << COUNTER_BITS) | self.counter)
    }
}

pub fn session_of(id: u64) -> u32 {
    (id >> COUNTER_BITS) as u32
}

pub fn counter_of(id: u64) -> u64 {
    id & COUNTER_MASK
}

fn random_session() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let mut seed = [0u8; 12];
    seed[..8].copy_from_slice(&nanos.to_le_bytes());
    seed[8..].copy_from_slice(&std::process::id().to_le_bytes());
    xxh3_64(&seed) & SESSION_MASK
}
