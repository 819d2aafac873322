//! Deadline timer queue.
//!
//! Every "wait" in the controller (relay stop, dose re-check, exit
//! confirmation, parameter refresh) is an entry in a [`TimerQueue`] owned
//! by whoever drives the reactor.  Entries carry a caller-defined key that
//! says what to do when they fire; the queue itself knows nothing about
//! feeding.
//!
//! ```text
//!   schedule(at, key) ──▶ ┌──────────────────────────────┐
//!                         │ min-heap (deadline, seq)     │
//!   cancel(handle)   ──▶  │ live: seq → {key, period}    │
//!                         └──────────────┬───────────────┘
//!                                        │ pop_due(now)
//!                                        ▼
//!                              (handle, key) in deadline order
//! ```
//!
//! Cancellation is lazy: a cancelled entry stays in the heap and is
//! skipped when it reaches the top.  Entries with equal deadlines fire in
//! scheduling order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Identifies one scheduled entry.  Stale handles are harmless: cancelling
/// a fired or already-cancelled entry is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Slot<K> {
    key: K,
    deadline: Duration,
    period: Option<Duration>,
}

/// Deadline-ordered queue of one-shot and periodic timers.
#[derive(Debug)]
pub struct TimerQueue<K> {
    heap: BinaryHeap<Reverse<(Duration, u64)>>,
    live: HashMap<u64, Slot<K>>,
    next_seq: u64,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TimerQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Fire `key` once at `deadline`.
    pub fn schedule_at(&mut self, deadline: Duration, key: K) -> TimerHandle {
        self.insert(deadline, key, None)
    }

    /// Fire `key` once, `delay` after `now`.
    pub fn schedule_in(&mut self, now: Duration, delay: Duration, key: K) -> TimerHandle {
        self.insert(now + delay, key, None)
    }

    /// Fire `key` every `period`, first at `first`.
    ///
    /// A zero period is bumped to one millisecond so a periodic entry can
    /// never starve the queue.
    pub fn schedule_every(&mut self, first: Duration, period: Duration, key: K) -> TimerHandle {
        let period = period.max(Duration::from_millis(1));
        self.insert(first, key, Some(period))
    }

    fn insert(&mut self, deadline: Duration, key: K, period: Option<Duration>) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((deadline, seq)));
        self.live.insert(
            seq,
            Slot {
                key,
                deadline,
                period,
            },
        );
        TimerHandle(seq)
    }

    /// Cancel an entry.  Returns `true` if it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle.0).is_some()
    }

    /// Cancel through an optional handle slot, leaving it empty.
    pub fn cancel_slot(&mut self, slot: &mut Option<TimerHandle>) -> bool {
        slot.take().is_some_and(|h| self.cancel(h))
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.live.contains_key(&handle.0)
    }

    /// Deadline of an entry, if still pending.
    pub fn deadline_of(&self, handle: TimerHandle) -> Option<Duration> {
        self.live.get(&handle.0).map(|s| s.deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.live.values().map(|s| s.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop every pending entry.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}

impl<K: Clone> TimerQueue<K> {
    /// Pop the earliest entry whose deadline is at or before `now`.
    ///
    /// One-shot entries are removed.  Periodic entries are re-armed one
    /// period after their previous deadline, or one period after `now`
    /// when the reactor has fallen further behind than that.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerHandle, K)> {
        while let Some(&Reverse((deadline, seq))) = self.heap.peek() {
            if deadline > now {
                return None;
            }
            self.heap.pop();

            let Some(slot) = self.live.get_mut(&seq) else {
                continue; // cancelled
            };
            if slot.deadline != deadline {
                continue; // superseded heap entry
            }

            match slot.period {
                Some(period) => {
                    let mut next = deadline + period;
                    if next <= now {
                        next = now + period;
                    }
                    slot.deadline = next;
                    let key = slot.key.clone();
                    self.heap.push(Reverse((next, seq)));
                    return Some((TimerHandle(seq), key));
                }
                None => {
                    let slot = self.live.remove(&seq)?;
                    return Some((TimerHandle(seq), slot.key));
                }
            }
        }
        None
    }
}
