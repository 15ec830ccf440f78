//! Single-slot, overwrite-on-write exchange between two threads.
//!
//! The writer never waits for the reader and the reader never sees a torn
//! value: the whole `T` is replaced under one short lock. Each write bumps a
//! generation counter so readers can tell fresh values from repeats.

use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    generation: u64,
    written_at: Option<Instant>,
}

/// Newest value written by a producer.
#[derive(Debug)]
pub struct LatestValue<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> Default for LatestValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestValue<T> {
    /// An empty slot at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                generation: 0,
                written_at: None,
            }),
        }
    }

    /// Replace the value. Returns the new generation.
    pub fn publish(&self, value: T) -> u64 {
        let mut slot = self.slot.lock();
        slot.value = Some(value);
        slot.generation += 1;
        slot.written_at = Some(Instant::now());
        slot.generation
    }

    /// Generation of the newest value (0 if never written).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// When the newest value was written.
    #[must_use]
    pub fn written_at(&self) -> Option<Instant> {
        self.slot.lock().written_at
    }
}

impl<T: Clone> LatestValue<T> {
    /// The newest value and its generation.
    #[must_use]
    pub fn latest(&self) -> Option<(T, u64)> {
        let slot = self.slot.lock();
        slot.value.clone().map(|v| (v, slot.generation))
    }

    /// The newest value if it is newer than `seen`.
    #[must_use]
    pub fn newer_than(&self, seen: u64) -> Option<(T, u64)> {
        let slot = self.slot.lock();
        if slot.generation > seen {
            slot.value.clone().map(|v| (v, slot.generation))
        } else {
            None
        }
    }
}
