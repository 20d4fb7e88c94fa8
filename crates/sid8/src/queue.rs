//! Lock-free transaction queue between the bus decoder and the scheduler.
//!
//! Single producer (the interrupt-side decoder), single consumer (the
//! scheduler loop). The producer never waits: when the ring is full it
//! overwrites the oldest slot, and the consumer notices the lap and skips
//! ahead, counting the lost events.
//!
//! Each slot carries a sequence stamp. The producer marks the slot busy,
//! stores the payload, then publishes the stamp for the new sequence number;
//! the consumer accepts a slot only if the stamp matches before and after
//! reading the payload. Write and read positions are free-running counters,
//! masked by `capacity - 1` to index the ring.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use crate::bus::BusEvent;
use crate::error::Sid8Error;

/// Default ring size (2^17 writes).
pub const DEFAULT_CAPACITY: usize = 1 << 17;

struct Slot {
    /// `2 * seq + 1` while being written, `2 * seq + 2` once complete.
    stamp: AtomicU64,
    payload: AtomicU32,
    at_cycle: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            stamp: AtomicU64::new(0),
            payload: AtomicU32::new(0),
            at_cycle: AtomicU64::new(0),
        }
    }
}

struct Ring {
    slots: Box<[Slot]>,
    mask: u64,
    /// Sequence number of the next write (producer-owned).
    write: AtomicU64,
    /// Events lost to overflow (consumer-owned).
    evicted: AtomicU64,
}

impl Ring {
    fn capacity(&self) -> u64 {
        self.mask + 1
    }
}

/// Create a queue with `capacity` slots and split it into its two halves.
///
/// `capacity` must be a non-zero power of two.
pub fn channel(capacity: usize) -> Result<(QueueProducer, QueueConsumer), Sid8Error> {
    if !capacity.is_power_of_two() {
        return Err(Sid8Error::QueueCapacity(capacity));
    }

    let ring = Arc::new(Ring {
        slots: (0..capacity).map(|_| Slot::new()).collect(),
        mask: capacity as u64 - 1,
        write: AtomicU64::new(0),
        evicted: AtomicU64::new(0),
    });

    let producer = QueueProducer {
        ring: Arc::clone(&ring),
        write: 0,
    };
    let consumer = QueueConsumer { ring, read: 0 };
    Ok((producer, consumer))
}

/// Write half, owned by the bus decoder.
pub struct QueueProducer {
    ring: Arc<Ring>,
    write: u64,
}

impl QueueProducer {
    /// Append an event. Never blocks; overwrites the oldest event when full.
    pub fn enqueue(&mut self, event: BusEvent) {
        let seq = self.write;
        let slot = &self.ring.slots[(seq & self.ring.mask) as usize];

        slot.stamp.store(2 * seq + 1, Ordering::Relaxed);
        fence(Ordering::Release);
        slot.payload.store(event.pack(), Ordering::Relaxed);
        slot.at_cycle.store(event.at_cycle, Ordering::Relaxed);
        slot.stamp.store(2 * seq + 2, Ordering::Release);

        self.write = seq + 1;
        self.ring.write.store(self.write, Ordering::Release);
    }

    /// Total events enqueued since creation.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.write
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }
}

/// Read half, owned by the scheduler.
pub struct QueueConsumer {
    ring: Arc<Ring>,
    /// Sequence number of the next read. Only the consumer needs it.
    read: u64,
}

impl QueueConsumer {
    /// Take the oldest event if it is due at or before `cycle`.
    ///
    /// The read position only advances when an event is returned, or when
    /// the producer has lapped it.
    pub fn try_dequeue_due_by(&mut self, cycle: u64) -> Option<BusEvent> {
        loop {
            let write = self.ring.write.load(Ordering::Acquire);
            self.skip_overwritten(write);
            if self.read == write {
                return None;
            }

            let slot = &self.ring.slots[(self.read & self.ring.mask) as usize];
            let expected = 2 * self.read + 2;

            let before = slot.stamp.load(Ordering::Acquire);
            if before != expected {
                // The producer has started on the next lap of this slot.
                self.evict(1);
                continue;
            }
            let payload = slot.payload.load(Ordering::Relaxed);
            let at_cycle = slot.at_cycle.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if slot.stamp.load(Ordering::Relaxed) != before {
                self.evict(1);
                continue;
            }

            if at_cycle > cycle {
                return None;
            }
            self.read += 1;
            return Some(BusEvent::unpack(payload, at_cycle));
        }
    }

    /// Events waiting, at most the capacity.
    #[must_use]
    pub fn len(&self) -> usize {
        let write = self.ring.write.load(Ordering::Acquire);
        write.saturating_sub(self.read).min(self.ring.capacity()) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number of the oldest retained event. Accounts for events
    /// overwritten but not yet noticed by a dequeue.
    #[must_use]
    pub fn read_index(&self) -> u64 {
        let write = self.ring.write.load(Ordering::Acquire);
        self.read.max(write.saturating_sub(self.ring.capacity()))
    }

    /// Events lost to overflow so far, including any not yet skipped.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.ring.evicted.load(Ordering::Relaxed) + (self.read_index() - self.read)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }

    fn skip_overwritten(&mut self, write: u64) {
        let capacity = self.ring.capacity();
        if write - self.read > capacity {
            self.evict(write - capacity - self.read);
        }
    }

    fn evict(&mut self, count: u64) {
        self.read += count;
        self.ring.evicted.fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64) -> BusEvent {
        BusEvent {
            chip: (n % 8) as u8,
            register: (n % 32) as u8,
            value: n as u8,
            at_cycle: n,
        }
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(channel(1000), Err(Sid8Error::QueueCapacity(1000))));
        assert!(matches!(channel(0), Err(Sid8Error::QueueCapacity(0))));
        assert!(channel(1).is_ok());
    }

    #[test]
    fn fifo_order() {
        let (mut tx, mut rx) = channel(16).expect("queue");
        for n in 0..10 {
            tx.enqueue(event(n));
        }
        for n in 0..10 {
            assert_eq!(rx.try_dequeue_due_by(u64::MAX), Some(event(n)));
        }
        assert_eq!(rx.try_dequeue_due_by(u64::MAX), None);
    }

    #[test]
    fn holds_events_until_due() {
        let (mut tx, mut rx) = channel(16).expect("queue");
        tx.enqueue(event(100));
        assert_eq!(rx.try_dequeue_due_by(99), None);
        assert_eq!(rx.len(), 1, "a held event stays queued");
        assert_eq!(rx.try_dequeue_due_by(100), Some(event(100)));
        assert!(rx.is_empty());
    }

    #[test]
    fn overflow_keeps_newest_capacity_events() {
        let (mut tx, mut rx) = channel(8).expect("queue");
        for n in 0..11 {
            tx.enqueue(event(n));
        }
        assert_eq!(rx.len(), 8);
        assert_eq!(rx.read_index(), 3);
        assert_eq!(rx.evicted(), 3);
        for n in 3..11 {
            assert_eq!(rx.try_dequeue_due_by(u64::MAX), Some(event(n)));
        }
        assert_eq!(rx.try_dequeue_due_by(u64::MAX), None);
        assert_eq!(rx.evicted(), 3);
    }

    #[test]
    fn depth_tracks_the_consumer_position_after_a_lap() {
        let (mut tx, mut rx) = channel(4).expect("queue");
        for n in 0..6 {
            tx.enqueue(event(n));
        }
        assert_eq!(rx.read_index(), 2, "two events overwritten, not yet skipped");
        assert_eq!(rx.try_dequeue_due_by(u64::MAX), Some(event(2)));
        assert_eq!(rx.read_index(), 3);
        assert_eq!(rx.len(), 3);
        assert_eq!(rx.evicted(), 2);

        tx.enqueue(event(6));
        assert_eq!(rx.len(), 4);
        assert_eq!(rx.read_index(), 3);
    }

    #[test]
    fn wraps_many_times_without_loss() {
        let (mut tx, mut rx) = channel(4).expect("queue");
        for n in 0..1000 {
            tx.enqueue(event(n));
            assert_eq!(rx.try_dequeue_due_by(n), Some(event(n)));
        }
        assert_eq!(rx.evicted(), 0);
        assert_eq!(tx.written(), 1000);
    }

    #[test]
    fn concurrent_producer_preserves_order() {
        let (mut tx, mut rx) = channel(1 << 10).expect("queue");
        let total = 200_000u64;
        let producer = std::thread::spawn(move || {
            for n in 0..total {
                tx.enqueue(event(n));
            }
        });

        let mut last = None;
        let mut received = 0u64;
        while received + rx.evicted() < total || !producer.is_finished() {
            if let Some(ev) = rx.try_dequeue_due_by(u64::MAX) {
                if let Some(prev) = last {
                    assert!(ev.at_cycle > prev, "events must stay in order");
                }
                assert_eq!(ev, event(ev.at_cycle), "payload must match its stamp");
                last = Some(ev.at_cycle);
                received += 1;
            }
        }
        producer.join().expect("producer thread");
        while rx.try_dequeue_due_by(u64::MAX).is_some() {
            received += 1;
        }
        assert_eq!(received + rx.evicted(), total);
    }
}
