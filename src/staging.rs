//! # ISR Staging Ring
//!
//! Interrupt handlers cannot walk the delay queue (unbounded latency) or
//! touch the TCB free list (the dispatch loop mutates it). Instead they
//! deposit a message snapshot in this bounded ring, and the loop promotes
//! staged entries into real TCBs on a cooperative boundary.
//!
//! The ring is single-producer/single-consumer: one ISR pushes, the
//! dispatch loop pops. Indices are atomics with release/acquire pairing on
//! the publishing side, so neither side needs the kernel critical section
//! and the handoff is wait-free. One slot is reserved to tell a full ring
//! from an empty one.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ISR_QUEUE_SIZE;
use crate::task::Message;

const SLOTS: usize = ISR_QUEUE_SIZE + 1;

/// Bounded SPSC ring of staged messages.
pub(crate) struct Staging {
    slots: UnsafeCell<[MaybeUninit<Message>; SLOTS]>,
    /// Consumer index — advanced only by the dispatch loop.
    front: AtomicUsize,
    /// Producer index — advanced only by the posting ISR.
    rear: AtomicUsize,
}

// Safety: front/rear are atomics and each slot is written by the single
// producer before the rear index that publishes it (release), and read by
// the single consumer after observing that index (acquire).
unsafe impl Sync for Staging {}

impl Staging {
    /// An empty ring.
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new(unsafe { MaybeUninit::uninit().assume_init() }),
            front: AtomicUsize::new(0),
            rear: AtomicUsize::new(0),
        }
    }

    /// Discard any staged entries.
    pub fn reset(&self) {
        self.front.store(0, Ordering::Relaxed);
        self.rear.store(0, Ordering::Relaxed);
    }

    /// True when no staged entries are waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.front.load(Ordering::Acquire) == self.rear.load(Ordering::Acquire)
    }

    /// Number of staged entries waiting for promotion.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        let front = self.front.load(Ordering::Acquire);
        let rear = self.rear.load(Ordering::Acquire);
        (rear + SLOTS - front) % SLOTS
    }

    /// Stage a message. Returns `false` when the ring is full.
    ///
    /// Producer side only — at most one ISR context may post at a time.
    pub fn push(&self, msg: Message) -> bool {
        let rear = self.rear.load(Ordering::Relaxed);
        let next = (rear + 1) % SLOTS;
        if next == self.front.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            (*self.slots.get())[rear].as_mut_ptr().write(msg);
        }
        self.rear.store(next, Ordering::Release);
        true
    }

    /// Take the oldest staged message. Consumer side only.
    pub fn pop(&self) -> Option<Message> {
        let front = self.front.load(Ordering::Relaxed);
        if front == self.rear.load(Ordering::Acquire) {
            return None;
        }
        let msg = unsafe { (*self.slots.get())[front].as_ptr().read() };
        self.front.store((front + 1) % SLOTS, Ordering::Release);
        Some(msg)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
