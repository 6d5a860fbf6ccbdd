use super::watcher::RawTimer;

use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// An entry in the loop's timer queue.
///
/// `TimerEntry` represents a scheduled expiry of one active timer record.
/// It is stored inside a binary heap ordered by deadline. Stopping a timer
/// removes its entry eagerly, so the heap never points at a record that is
/// not active.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Start order, breaking ties between equal deadlines.
    pub(crate) seq: u64,

    /// The timer record this entry belongs to.
    pub(crate) timer: *const RawTimer,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    /// Two timer entries are equal if their deadline and start order are equal.
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline) && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by start order.
    ///
    /// Note that the comparison is **reversed** so that a
    /// `BinaryHeap<TimerEntry>` behaves as a min-heap,
    /// where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

impl PartialOrd for TimerEntry {
    /// Partial ordering consistent with [`Ord`].
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Upper bound used when a deadline would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Returns `base + secs`, saturating at a deadline decades away.
pub(crate) fn deadline_after(base: Instant, secs: f64) -> Instant {
    let delay = Duration::try_from_secs_f64(secs).unwrap_or(FAR_FUTURE);
    base + delay.min(FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn entry(deadline: Instant, seq: u64) -> TimerEntry {
        TimerEntry {
            deadline,
            seq,
            timer: std::ptr::null(),
        }
    }

    #[test]
    fn heap_pops_earliest_deadline_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(entry(now + Duration::from_millis(30), 0));
        heap.push(entry(now + Duration::from_millis(10), 1));
        heap.push(entry(now + Duration::from_millis(20), 2));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn equal_deadlines_fire_in_start_order() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        for seq in [3, 1, 2] {
            heap.push(entry(now, seq));
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.seq)).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn deadline_after_saturates_on_huge_delays() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, 0.0), now);
        assert_eq!(deadline_after(now, f64::MAX), now + FAR_FUTURE);
    }
}
