//! Fixed-capacity overwrite-oldest ring of log records.
//!
//! Pure state with no locking of its own; [`crate::logging::Logger`] wraps it
//! in the single logger mutex. Invariant: `len == (head - tail) mod capacity`,
//! with `len` saturating at `capacity`.

use super::record::LogRecord;

pub(crate) struct RingBuffer {
    slots: Vec<Option<LogRecord>>,
    /// Next slot to write.
    head: usize,
    /// Oldest unread slot.
    tail: usize,
    len: usize,
    /// Records ever written, never reset.
    total: u64,
}

impl RingBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        RingBuffer {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            len: 0,
            total: 0,
        }
    }

    /// Append a record. Always succeeds; when full the oldest entry is
    /// discarded to make room.
    pub(crate) fn push(&mut self, record: LogRecord) {
        let capacity = self.slots.len();
        self.slots[self.head] = Some(record);
        self.head = (self.head + 1) % capacity;
        if self.len == capacity {
            // Overwrote the oldest entry.
            self.tail = (self.tail + 1) % capacity;
        } else {
            self.len += 1;
        }
        self.total += 1;
    }

    /// Remove and return the oldest record.
    pub(crate) fn pop(&mut self) -> Option<LogRecord> {
        if self.len == 0 {
            return None;
        }
        let record = self.slots[self.tail].take();
        self.tail = (self.tail + 1) % self.slots.len();
        self.len -= 1;
        record
    }

    /// Look at the record `offset` positions past the oldest, without
    /// removing anything. `None` when `offset >= len`.
    pub(crate) fn peek(&self, offset: usize) -> Option<&LogRecord> {
        if offset >= self.len {
            return None;
        }
        let index = (self.tail + offset) % self.slots.len();
        self.slots[index].as_ref()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn total_written(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::record::Severity;
    use proptest::prelude::*;

    fn record(n: usize) -> LogRecord {
        LogRecord::new("ring", Severity::Info, &format!("entry {n}"))
    }

    #[test]
    fn push_then_pop_in_order() {
        let mut ring = RingBuffer::new(4);
        for n in 0..3 {
            ring.push(record(n));
        }
        assert_eq!(ring.len(), 3);
        for n in 0..3 {
            assert_eq!(ring.pop().unwrap().message, format!("entry {n}"));
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn overflow_discards_oldest() {
        let mut ring = RingBuffer::new(3);
        for n in 0..5 {
            ring.push(record(n));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.total_written(), 5);
        // Entries 0 and 1 were overwritten.
        assert_eq!(ring.pop().unwrap().message, "entry 2");
        assert_eq!(ring.pop().unwrap().message, "entry 3");
        assert_eq!(ring.pop().unwrap().message, "entry 4");
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring = RingBuffer::new(4);
        ring.push(record(0));
        ring.push(record(1));
        assert_eq!(ring.peek(1).unwrap().message, "entry 1");
        assert_eq!(ring.peek(1).unwrap().message, "entry 1");
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn peek_out_of_range_is_none_and_idempotent() {
        let mut ring = RingBuffer::new(4);
        ring.push(record(0));
        assert!(ring.peek(1).is_none());
        assert!(ring.peek(100).is_none());
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.pop().unwrap().message, "entry 0");
    }

    #[test]
    fn wraps_repeatedly() {
        let mut ring = RingBuffer::new(2);
        for n in 0..10 {
            ring.push(record(n));
        }
        assert_eq!(ring.pop().unwrap().message, "entry 8");
        assert_eq!(ring.pop().unwrap().message, "entry 9");
        assert_eq!(ring.total_written(), 10);
    }

    proptest! {
        /// After any write sequence the ring holds exactly the most recent
        /// `min(writes, capacity)` entries, oldest first.
        #[test]
        fn retains_most_recent_in_order(capacity in 1usize..16, writes in 0usize..64) {
            let mut ring = RingBuffer::new(capacity);
            for n in 0..writes {
                ring.push(record(n));
            }
            let kept = writes.min(capacity);
            prop_assert_eq!(ring.len(), kept);
            prop_assert_eq!(ring.total_written(), writes as u64);
            for (slot, n) in (writes - kept..writes).enumerate() {
                prop_assert_eq!(&ring.peek(slot).unwrap().message, &format!("entry {n}"));
            }
        }
    }
}
