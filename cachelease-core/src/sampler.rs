use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Outcome tag of a single cache operation.
///
/// Lookups record [`Hit`](Outcome::Hit) or [`Miss`](Outcome::Miss); inserts
/// record [`Eviction`](Outcome::Eviction) when room had to be made for the new
/// value and [`NoEviction`](Outcome::NoEviction) otherwise.
///
/// The declaration order is the tie-break order used by
/// [`OutcomeSampler::frequencies`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Outcome {
    Hit = 1,
    Miss = 2,
    Eviction = 3,
    NoEviction = 4,
}

impl Outcome {
    const ALL: [Outcome; 4] = [
        Outcome::Hit,
        Outcome::Miss,
        Outcome::Eviction,
        Outcome::NoEviction,
    ];

    #[inline]
    fn from_slot(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Outcome::Hit),
            2 => Some(Outcome::Miss),
            3 => Some(Outcome::Eviction),
            4 => Some(Outcome::NoEviction),
            _ => None,
        }
    }
}

const EMPTY_SLOT: u8 = 0;

/// Fixed-capacity rolling sample of recent [`Outcome`]s.
///
/// Recording is lock-free and O(1): a shared cursor picks the slot and the
/// oldest sample in that slot is overwritten. Concurrent writers may race on
/// the same slot once the cursor wraps; a lost sample is acceptable for a
/// statistical breakdown.
///
/// # Examples
///
/// ```
/// use cachelease_core::{Outcome, OutcomeSampler};
///
/// let sampler = OutcomeSampler::new(8);
/// sampler.record(Outcome::Eviction);
/// sampler.record(Outcome::Eviction);
/// sampler.record(Outcome::Hit);
///
/// assert_eq!(
///     sampler.frequencies(),
///     vec![(Outcome::Eviction, 2), (Outcome::Hit, 1)]
/// );
///
/// sampler.clear();
/// assert!(sampler.frequencies().is_empty());
/// assert_eq!(sampler.capacity(), 8);
/// ```
#[derive(Debug)]
pub struct OutcomeSampler {
    slots: Box<[AtomicU8]>,
    cursor: AtomicUsize,
}

impl OutcomeSampler {
    /// Creates an empty sampler holding at most `capacity` outcomes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. [`CacheConfig::validate`](crate::CacheConfig::validate)
    /// rejects such configurations before a sampler is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sampler capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| AtomicU8::new(EMPTY_SLOT)).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Appends an outcome, overwriting the oldest one once full.
    #[inline]
    pub fn record(&self, outcome: Outcome) {
        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[position].store(outcome as u8, Ordering::Relaxed);
    }

    /// Returns the outcomes currently held with their counts, most frequent
    /// first. Ties are ordered by [`Outcome`] declaration order.
    pub fn frequencies(&self) -> Vec<(Outcome, u64)> {
        let mut counts = [0u64; Outcome::ALL.len()];
        for slot in self.slots.iter() {
            if let Some(outcome) = Outcome::from_slot(slot.load(Ordering::Relaxed)) {
                counts[outcome as usize - 1] += 1;
            }
        }

        let mut frequencies: Vec<(Outcome, u64)> = Outcome::ALL
            .iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|(outcome, count)| (*outcome, count))
            .collect();
        frequencies.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        frequencies
    }

    /// Empties the sampler. Capacity is unchanged.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(EMPTY_SLOT, Ordering::Relaxed);
        }
    }

    /// Maximum number of outcomes held.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != EMPTY_SLOT)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
