//! Latest-value store for received bus frames.
//!
//! One slot per frame id, fixed at construction. Each slot is a seqlock:
//! the writer makes the sequence odd, stores payload and timestamp, then
//! makes it even again. Readers retry until they see the same even sequence
//! on both sides of their loads, so a payload is never paired with another
//! frame's arrival time.
//!
//! Timestamps are monotonic milliseconds. `0` is reserved for "never seen".

use egs_common::can::{CanFrame, FrameId};
use egs_common::consts::MAX_TRACKED_FRAMES;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache holds at most {capacity} frame ids")]
    TooManyFrames { capacity: usize },

    #[error("frame id 0x{0:03X} listed twice")]
    DuplicateId(FrameId),
}

#[derive(Debug)]
struct FrameSlot {
    id: FrameId,
    seq: AtomicU32,
    payload: AtomicU64,
    last_seen: AtomicU64,
}

impl FrameSlot {
    const fn new(id: FrameId) -> Self {
        Self {
            id,
            seq: AtomicU32::new(0),
            payload: AtomicU64::new(0),
            last_seen: AtomicU64::new(0),
        }
    }

    fn store(&self, payload: u64, timestamp: u64) {
        // Claim the slot against a concurrent writer on the same id.
        let start = loop {
            let seq = self.seq.load(Ordering::Relaxed);
            if seq & 1 == 0
                && self
                    .seq
                    .compare_exchange_weak(seq, seq.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                break seq;
            }
            spin_loop();
        };
        fence(Ordering::Release);

        self.payload.store(payload, Ordering::Relaxed);
        self.last_seen.store(timestamp, Ordering::Relaxed);

        self.seq.store(start.wrapping_add(2), Ordering::Release);
    }

    fn load(&self) -> (u64, u64) {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                spin_loop();
                continue;
            }

            let payload = self.payload.load(Ordering::Relaxed);
            let last_seen = self.last_seen.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return (payload, last_seen);
            }
            spin_loop();
        }
    }
}

/// Freshness-tracked cache of the latest payload per frame id.
///
/// Shared between the bus ingest path and any number of readers; all
/// operations take `&self`.
#[derive(Debug)]
pub struct SignalCache {
    slots: heapless::Vec<FrameSlot, MAX_TRACKED_FRAMES>,
}

impl SignalCache {
    /// Build a cache tracking exactly `ids`.
    pub fn new(ids: &[FrameId]) -> Result<Self, CacheError> {
        let mut slots = heapless::Vec::new();
        for &id in ids {
            if slots.iter().any(|s: &FrameSlot| s.id == id) {
                return Err(CacheError::DuplicateId(id));
            }
            slots
                .push(FrameSlot::new(id))
                .map_err(|_| CacheError::TooManyFrames {
                    capacity: MAX_TRACKED_FRAMES,
                })?;
        }
        Ok(Self { slots })
    }

    #[inline]
    fn slot(&self, id: FrameId) -> Option<&FrameSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    /// Store a received frame. Returns `false` for ids the cache does not
    /// track.
    #[inline]
    pub fn ingest(&self, id: FrameId, payload: u64, timestamp: u64) -> bool {
        match self.slot(id) {
            Some(slot) => {
                slot.store(payload, timestamp);
                true
            }
            None => false,
        }
    }

    /// Latest payload of `id` if it has been seen and is at most `max_age`
    /// old at `now`. A `now` earlier than the arrival time reads as stale.
    pub fn read(&self, id: FrameId, now: u64, max_age: u64) -> Option<u64> {
        let (payload, last_seen) = self.snapshot(id)?;
        match now.checked_sub(last_seen) {
            Some(age) if age <= max_age => Some(payload),
            _ => None,
        }
    }

    /// Typed view of a fresh frame.
    pub fn get<F: CanFrame>(&self, now: u64, max_age: u64) -> Option<F> {
        self.read(F::ID, now, max_age).map(F::from_raw)
    }

    /// Payload and arrival time of `id`, ignoring age. `None` if the frame
    /// was never seen.
    pub fn snapshot(&self, id: FrameId) -> Option<(u64, u64)> {
        let (payload, last_seen) = self.slot(id)?.load();
        (last_seen != 0).then_some((payload, last_seen))
    }

    pub fn last_seen(&self, id: FrameId) -> Option<u64> {
        self.snapshot(id).map(|(_, t)| t)
    }

    pub fn tracks(&self, id: FrameId) -> bool {
        self.slot(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.slots.iter().map(|s| s.id)
    }
}
