//! Correlation identifiers.
//!
//! An id is a 128-bit value: the high half is a random per-process seed, the
//! low half a monotonic counter. The counter alone makes ids unique for the
//! life of the process; the seed keeps ids from different processes apart.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use uuid::Uuid;

static PROCESS_SEED: OnceLock<u64> = OnceLock::new();

/// Relaxed ordering suffices: only uniqueness matters.
static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Links one request to its single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Issue a new id. Never returns the same value twice within a process.
    pub fn next() -> Self {
        let seed = *PROCESS_SEED.get_or_init(rand::random::<u64>);
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(Uuid::from_u64_pair(seed, sequence))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Position in this process's issue order.
    pub fn sequence(&self) -> u64 {
        self.0.as_u64_pair().1
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let ids: Vec<_> = (0..1_000).map(|_| CorrelationId::next()).collect();
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    }

    #[test]
    fn test_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..500).map(|_| CorrelationId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {}", id);
            }
        }
    }

    #[test]
    fn test_display_is_uuid() {
        let id = CorrelationId::next();
        let parsed: Uuid = id.to_string().parse().unwrap();
        assert_eq!(CorrelationId::from(parsed), id);
    }
}
