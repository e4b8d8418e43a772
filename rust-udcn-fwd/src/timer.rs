//! Hashed-wheel timer for PIT/CS expiry.
//!
//! A fixed ring of slots, each covering one `interval` tick; a timer fires
//! when the wheel's cursor sweeps past its slot. Unlike a sorted timer
//! heap, insertion, cancellation and firing are all O(1) as long as
//! `after` stays within the wheel's span (`nSlots * interval`) — which it
//! always does here, since PIT lifetimes are bounded and the wheel is
//! sized for the worst case.
//!
//! Per the specification's "intrusive doubly-linked wheel lists ->
//! generation-free slab" redesign note, a [`TimerId`] packs the slot index
//! into its high 32 bits and a per-schedule sequence number into its low
//! 32 bits, so [`MinSched::cancel`] goes straight to the owning slot's map
//! instead of scanning the wheel — this is the `{slot, gen}`-handle recipe
//! the note describes, standing in for the original's back-pointer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Opaque handle to a scheduled timer: `(slot_index << 32) | sequence`.
/// Stays valid for that one timer only.
pub type TimerId = u64;

struct Slot<T> {
    entries: HashMap<TimerId, T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

/// A hashed timer wheel scheduling values of type `T` (typically a PIT/CS
/// entry key) for future expiry.
pub struct MinSched<T> {
    slots: Vec<Slot<T>>,
    slot_mask: usize,
    last_slot: usize,
    interval: Duration,
    next_time: Instant,
    next_seq: u32,
}

impl<T> MinSched<T> {
    /// `n_slot_bits` sets the wheel size to `1 << n_slot_bits` slots;
    /// `interval` is the duration each slot covers. The wheel can schedule
    /// timers up to `(1 << n_slot_bits) * interval` into the future.
    pub fn new(n_slot_bits: u32, interval: Duration) -> Self {
        assert!(n_slot_bits > 0 && n_slot_bits < 32);
        let n_slots = 1usize << n_slot_bits;
        Self {
            slots: (0..n_slots).map(|_| Slot::default()).collect(),
            slot_mask: n_slots - 1,
            last_slot: n_slots - 1,
            interval,
            next_time: Instant::now(),
            next_seq: 1,
        }
    }

    pub fn capacity_span(&self) -> Duration {
        self.interval * (self.slots.len() as u32)
    }

    fn pack_id(slot_num: usize, seq: u32) -> TimerId {
        ((slot_num as u64) << 32) | seq as u64
    }

    fn slot_of(id: TimerId) -> usize {
        (id >> 32) as usize
    }

    /// Schedule `value` to expire `after` from now. Returns `None` (and
    /// drops `value`) if `after` exceeds the wheel's span.
    pub fn schedule_after(&mut self, after: Duration, value: T) -> Option<TimerId> {
        let n_slots_away = (after.as_nanos() / self.interval.as_nanos().max(1)) as usize + 1;
        if n_slots_away >= self.slots.len() {
            return None;
        }
        let slot_num = (self.last_slot + n_slots_away) & self.slot_mask;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1).max(1);
        let id = Self::pack_id(slot_num, seq);
        self.slots[slot_num].entries.insert(id, value);
        Some(id)
    }

    /// Cancel a previously scheduled timer in O(1), returning its value if
    /// it hadn't already fired: the slot is decoded straight out of `id`
    /// rather than found by scanning.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let slot_num = Self::slot_of(id) & self.slot_mask;
        self.slots.get_mut(slot_num)?.entries.remove(&id)
    }

    /// Advance the wheel to `now`, returning every value whose slot the
    /// cursor swept past, oldest slot first. Call this on a steady tick
    /// (e.g. every `interval`); it sweeps as many slots as needed to catch
    /// up if the caller fell behind.
    pub fn trigger(&mut self, now: Instant) -> Vec<(TimerId, T)> {
        let mut fired = Vec::new();
        while self.next_time <= now {
            self.last_slot = (self.last_slot + 1) & self.slot_mask;
            self.next_time += self.interval;
            let slot = &mut self.slots[self.last_slot];
            fired.extend(slot.entries.drain());
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.entries.is_empty())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(|s| s.entries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_enough_ticks() {
        let mut sched: MinSched<&str> = MinSched::new(4, Duration::from_millis(10));
        let start = Instant::now();
        sched.schedule_after(Duration::from_millis(25), "a");
        assert!(sched.trigger(start).is_empty());
        let fired = sched.trigger(start + Duration::from_millis(40));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, "a");
    }

    #[test]
    fn cancel_removes_pending_timer() {
        let mut sched: MinSched<u32> = MinSched::new(4, Duration::from_millis(10));
        let id = sched.schedule_after(Duration::from_millis(30), 7).unwrap();
        assert_eq!(sched.cancel(id), Some(7));
        let fired = sched.trigger(Instant::now() + Duration::from_secs(1));
        assert!(fired.is_empty());
    }

    #[test]
    fn cancel_one_of_two_timers_sharing_a_slot_leaves_the_other_pending() {
        let mut sched: MinSched<&str> = MinSched::new(4, Duration::from_millis(10));
        let start = Instant::now();
        let a = sched.schedule_after(Duration::from_millis(30), "a").unwrap();
        let b = sched.schedule_after(Duration::from_millis(30), "b").unwrap();
        assert_eq!(sched.cancel(a), Some("a"));
        let fired = sched.trigger(start + Duration::from_millis(50));
        assert_eq!(fired, vec![(b, "b")]);
    }

    #[test]
    fn rejects_schedules_beyond_wheel_span() {
        let mut sched: MinSched<u8> = MinSched::new(2, Duration::from_millis(10));
        assert!(sched.schedule_after(Duration::from_secs(10), 1).is_none());
    }

    #[test]
    fn len_tracks_pending_entries() {
        let mut sched: MinSched<u8> = MinSched::new(4, Duration::from_millis(10));
        assert!(sched.is_empty());
        sched.schedule_after(Duration::from_millis(10), 1);
        sched.schedule_after(Duration::from_millis(20), 2);
        assert_eq!(sched.len(), 2);
    }
}
