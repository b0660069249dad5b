//! # TCB Pool and Delay Queue
//!
//! A fixed arena of task control blocks doubles as both the TCB free list
//! and the expiry-ordered delay queue. Free entries are threaded through
//! their `next` field as a singly linked list; queued entries form a doubly
//! linked list sorted ascending by expiry under the wrap-aware comparison.
//! Links are arena indices rather than pointers, with `NIL` as the null
//! link, so the structure is plain data with no aliasing to reason about.
//!
//! Every entry is in exactly one of three places at any time: the free
//! list, the delay queue, or in flight to a handler (allocated but
//! unlinked, between `dequeue` and `release`).
//!
//! Nothing in here locks. Callers in task context must hold the kernel
//! critical section whenever they can race with the dispatch loop's
//! staging-queue drain.

use crate::config::TCB_SLOTS;
use crate::task::{Message, Task};
use crate::time;

/// Null link value for arena indices.
const NIL: usize = usize::MAX;

/// One arena slot: queue links plus the message it carries when allocated.
#[derive(Clone, Copy)]
struct Entry {
    next: usize,
    prev: usize,
    msg: Option<Message>,
}

const FREE_ENTRY: Entry = Entry {
    next: NIL,
    prev: NIL,
    msg: None,
};

/// The TCB arena: free list head plus delay-queue head and tail.
pub(crate) struct TcbQueue {
    entries: [Entry; TCB_SLOTS],
    free: usize,
    head: usize,
    tail: usize,
}

impl TcbQueue {
    /// An empty arena. [`reset`](Self::reset) must run before first use.
    pub const fn new() -> Self {
        Self {
            entries: [FREE_ENTRY; TCB_SLOTS],
            free: NIL,
            head: NIL,
            tail: NIL,
        }
    }

    /// Drop whatever state the arena held and rebuild the free list.
    pub fn reset(&mut self) {
        for i in 0..TCB_SLOTS {
            self.entries[i] = FREE_ENTRY;
            self.entries[i].next = if i + 1 < TCB_SLOTS { i + 1 } else { NIL };
        }
        self.free = if TCB_SLOTS > 0 { 0 } else { NIL };
        self.head = NIL;
        self.tail = NIL;
    }

    /// Take a TCB off the free list. `None` when the pool is exhausted.
    pub fn alloc(&mut self) -> Option<usize> {
        if self.free == NIL {
            return None;
        }
        let idx = self.free;
        self.free = self.entries[idx].next;
        self.entries[idx].next = NIL;
        Some(idx)
    }

    /// Return a TCB to the free list and drop its message.
    pub fn release(&mut self, idx: usize) {
        self.entries[idx].msg = None;
        self.entries[idx].prev = NIL;
        self.entries[idx].next = self.free;
        self.free = idx;
    }

    /// Store `msg` in slot `idx` and insert it into the delay queue at the
    /// unique position that keeps expiries ascending. Equal expiries land
    /// after existing entries, preserving FIFO among equally-timed posts.
    pub fn enqueue(&mut self, idx: usize, msg: Message) {
        let expire = msg.expire;
        self.entries[idx].msg = Some(msg);

        if self.head == NIL {
            self.entries[idx].next = NIL;
            self.entries[idx].prev = NIL;
            self.head = idx;
            self.tail = idx;
            return;
        }

        let mut cur = self.head;
        while cur != NIL {
            let cur_expire = match self.entries[cur].msg {
                Some(ref m) => m.expire,
                None => break,
            };
            if time::after(cur_expire, expire) {
                // Insert before the first entry strictly later than us.
                let prev = self.entries[cur].prev;
                self.entries[idx].next = cur;
                self.entries[idx].prev = prev;
                self.entries[cur].prev = idx;
                if prev == NIL {
                    self.head = idx;
                } else {
                    self.entries[prev].next = idx;
                }
                return;
            }
            cur = self.entries[cur].next;
        }

        // Nothing later than us: append at the tail.
        self.entries[self.tail].next = idx;
        self.entries[idx].prev = self.tail;
        self.entries[idx].next = NIL;
        self.tail = idx;
    }

    /// Index of the queue head, without removing it.
    pub fn front(&self) -> Option<usize> {
        if self.head == NIL {
            None
        } else {
            Some(self.head)
        }
    }

    /// Copy of the message in slot `idx`, if the slot holds one.
    pub fn message(&self, idx: usize) -> Option<Message> {
        self.entries[idx].msg
    }

    /// Unlink and return the queue head. The slot stays allocated (in
    /// flight) until [`release`](Self::release).
    pub fn dequeue(&mut self) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let idx = self.head;
        self.unlink(idx);
        Some(idx)
    }

    /// Remove every queued entry whose `(task, id)` pair matches, handing
    /// each removed payload to `dispose`, and return the count removed.
    /// Entries in flight or in the ISR staging ring are not affected.
    pub fn cancel(
        &mut self,
        task: &'static Task,
        id: i32,
        mut dispose: impl FnMut(*mut u8),
    ) -> usize {
        let mut count = 0;
        let mut cur = self.head;
        while cur != NIL {
            let next = self.entries[cur].next;
            let payload = match self.entries[cur].msg {
                Some(ref m) if core::ptr::eq(m.task, task) && m.id == id => Some(m.payload),
                _ => None,
            };
            if let Some(payload) = payload {
                count += 1;
                self.unlink(cur);
                self.release(cur);
                dispose(payload);
            }
            cur = next;
        }
        count
    }

    /// Detach `idx` from the delay queue, fixing up head/tail.
    fn unlink(&mut self, idx: usize) {
        let next = self.entries[idx].next;
        let prev = self.entries[idx].prev;

        if prev == NIL {
            self.head = next;
        } else {
            self.entries[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.entries[next].prev = prev;
        }

        self.entries[idx].next = NIL;
        self.entries[idx].prev = NIL;
    }

    /// Number of entries currently on the free list.
    #[cfg(test)]
    pub fn free_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.free;
        while cur != NIL {
            n += 1;
            cur = self.entries[cur].next;
        }
        n
    }

    /// Number of entries currently linked into the delay queue.
    #[cfg(test)]
    pub fn queued_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while cur != NIL {
            n += 1;
            cur = self.entries[cur].next;
        }
        n
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
