//! Lock-free SPSC message queue
//!
//! Fixed-capacity ring buffer for cross-thread commands and telemetry.
//! Wait-free for both sides: the only synchronization is the
//! acquire/release pair on the two indices. A full queue drops the push
//! (`try_push` returns false); command values are idempotent overwrites,
//! so the next message of the same kind supersedes the dropped one.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Single-producer single-consumer message queue.
///
/// Capacity is rounded up to a power of two; one slot is kept free to
/// distinguish full from empty, so `capacity - 1` items fit.
///
/// The safety contract is the usual SPSC one: at most one thread calls
/// `try_push` and at most one (other) thread calls `try_pop` for the
/// lifetime of the queue.
#[repr(align(64))]
pub struct MessageQueue<T> {
    buffer: Box<[UnsafeCell<T>]>,
    mask: usize,
    /// Only advanced by the producer
    write_pos: AtomicUsize,
    /// Only advanced by the consumer
    read_pos: AtomicUsize,
}

// SAFETY: slots are only written by the single producer before it
// publishes the index with Release, and only read by the single consumer
// after an Acquire load of that index.
unsafe impl<T: Copy + Send> Sync for MessageQueue<T> {}
unsafe impl<T: Copy + Send> Send for MessageQueue<T> {}

impl<T: Copy + Default> MessageQueue<T> {
    /// Create a queue holding at least `min_capacity - 1` items
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.next_power_of_two().max(2);
        let buffer: Box<[UnsafeCell<T>]> = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect();

        Self {
            buffer,
            mask: capacity - 1,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }
}

impl<T: Copy> MessageQueue<T> {
    /// Producer side. Returns false (and drops the item) when full.
    #[inline]
    pub fn try_push(&self, item: T) -> bool {
        let write = self.write_pos.load(Ordering::Relaxed);
        let next = (write + 1) & self.mask;
        if next == self.read_pos.load(Ordering::Acquire) {
            return false;
        }

        // SAFETY: `write` is only reachable by this producer until the
        // store below publishes it.
        unsafe {
            *self.buffer[write].get() = item;
        }
        self.write_pos.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Returns None when empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let read = self.read_pos.load(Ordering::Relaxed);
        if read == self.write_pos.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the Acquire load above guarantees the producer's write
        // to this slot is visible, and the producer cannot touch it again
        // until we advance read_pos.
        let item = unsafe { *self.buffer[read].get() };
        self.read_pos.store((read + 1) & self.mask, Ordering::Release);
        Some(item)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_pos.load(Ordering::Acquire) == self.write_pos.load(Ordering::Acquire)
    }

    /// Number of queued items
    #[inline]
    pub fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & self.mask
    }

    /// Usable capacity (one slot less than the ring size)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }
}
