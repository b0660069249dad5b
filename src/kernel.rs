//! # Kernel
//!
//! Top-level kernel state and public API for MqOS.
//!
//! The kernel is a process-wide singleton: one tick counter, one TCB pool
//! feeding one expiry-ordered delay queue, one ISR staging ring, and one
//! message pool. Application code talks to it through the free functions
//! in this module.
//!
//! ## Startup Sequence
//!
//! ```text
//! main()
//!   ├─► kernel::construct()      ← Reset state, carve pools
//!   ├─► kernel::message_send()   ← Post the kick-off message(s)
//!   └─► kernel::message_loop()   ← Dispatch forever (until destruct)
//! ```
//!
//! A platform timer must call [`tick`] at `TICKS_PER_SEC`; on Cortex-M
//! targets the `arch` module wires SysTick up for this.
//!
//! ## Context rules
//!
//! Task-context operations ([`message_send`], [`message_cancel`],
//! [`message_loop`]) take the kernel critical section around every
//! mutation. ISR-context operations ([`tick`], [`message_send_isr`]) touch
//! only the tick atomic and the staging ring, which are safe against the
//! main context by construction, so an interrupt handler never waits on
//! the dispatch loop.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "pool")]
use crate::pool::Pool;
use crate::queue::TcbQueue;
use crate::staging::Staging;
use crate::sync;
use crate::task::{Message, Origin, Task};
use crate::time::{self, Tick};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by the message-posting operations.
///
/// Every error is returned at the call site that produced it; the kernel
/// never aborts and has no asynchronous error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free TCB slot — too many messages outstanding.
    TcbExhausted,
    /// The ISR staging ring is full.
    StagingFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TcbExhausted => f.write_str("TCB pool exhausted"),
            Error::StagingFull => f.write_str("ISR staging queue full"),
        }
    }
}

// ---------------------------------------------------------------------------
// Global kernel state
// ---------------------------------------------------------------------------

/// The kernel singleton.
struct Core {
    /// Set by [`construct`]; [`message_loop`] refuses to run without it.
    constructed: bool,
    /// Set by [`destruct`]; the next loop iteration exits.
    shutdown: bool,
    /// Monotonic wrapping tick counter. An atomic so ISR and task context
    /// can read it without a critical section; the increment itself runs
    /// under one because load-then-store is not atomic.
    tick: AtomicU32,
    /// TCB arena: free list plus the expiry-ordered delay queue.
    queue: TcbQueue,
    /// Wait-free handoff from interrupt handlers to the dispatch loop.
    staging: Staging,
    /// Fixed-block payload pool.
    #[cfg(feature = "pool")]
    pool: Pool,
}

/// Global kernel instance.
///
/// # Safety
/// `&mut` access only happens inside critical sections; ISR-reachable
/// paths ([`tick`], [`get_tick`], the staging producer and consumer) go
/// through shared references to the atomic-based fields only.
static mut CORE: Core = Core {
    constructed: false,
    shutdown: false,
    tick: AtomicU32::new(0),
    queue: TcbQueue::new(),
    staging: Staging::new(),
    #[cfg(feature = "pool")]
    pool: Pool::new(),
};

/// Raw pointer to the kernel singleton, for the short-lived borrows taken
/// inside critical sections and for the ISR-side atomics.
#[inline]
fn core_ptr() -> *mut Core {
    unsafe { core::ptr::addr_of_mut!(CORE) }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Initialize the kernel's internal data structures.
///
/// Must be called from the main context before any other kernel function,
/// including [`tick`]. Calling it again reinitializes everything; any
/// previously posted messages and pool blocks are discarded.
pub fn construct() {
    sync::critical_section(|_cs| unsafe {
        let core = &mut *core_ptr();
        core.queue.reset();
        core.staging.reset();
        #[cfg(feature = "pool")]
        core.pool.reset();
        core.tick.store(0, Ordering::Relaxed);
        core.shutdown = false;
        core.constructed = true;
    });
    log::trace!("kernel constructed");
}

/// Request shutdown: the next [`message_loop`] iteration exits. Here for
/// completeness — most embedded systems never call it.
pub fn destruct() {
    sync::critical_section(|_cs| unsafe {
        (*core_ptr()).shutdown = true;
    });
}

/// Advance the kernel tick by one.
///
/// Must be called from the platform's periodic timer interrupt at
/// `TICKS_PER_SEC`. The increment runs under the critical section so it
/// stays correct on cores without atomic read-modify-write.
pub fn tick() {
    sync::critical_section(|_cs| {
        // Safety: shared borrow of an atomic field; see `CORE`.
        let tick = unsafe { &(*core_ptr()).tick };
        tick.store(tick.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
    });
}

/// Current kernel tick. Safe from both task and ISR context; callers
/// comparing against deadlines should use the wrap-aware helpers in
/// [`time`](crate::time).
pub fn get_tick() -> Tick {
    // Safety: shared borrow of an atomic field; see `CORE`.
    unsafe { (*core_ptr()).tick.load(Ordering::Relaxed) }
}

// ---------------------------------------------------------------------------
// Message operations
// ---------------------------------------------------------------------------

/// Post a message to `task`, delivered once `delay` ticks have elapsed
/// (use [`time::IMMEDIATE`] for next-iteration delivery).
///
/// Task context only. If `payload` came from [`alloc`], ownership passes
/// to the kernel here: the pool block is released after the handler
/// returns (or on cancellation). A payload that is not pool-owned is left
/// untouched by that release and remains the caller's.
///
/// Fails with [`Error::TcbExhausted`] when all TCB slots are in use.
pub fn message_send(
    task: &'static Task,
    id: i32,
    payload: *mut u8,
    delay: Tick,
) -> Result<(), Error> {
    sync::critical_section(|_cs| unsafe {
        let core = &mut *core_ptr();
        match core.queue.alloc() {
            Some(idx) => {
                let expire = core.tick.load(Ordering::Relaxed).wrapping_add(delay);
                core.queue.enqueue(
                    idx,
                    Message {
                        origin: Origin::App,
                        task,
                        id,
                        payload,
                        expire,
                    },
                );
                Ok(())
            }
            None => {
                log::error!("tcb exhaustion");
                Err(Error::TcbExhausted)
            }
        }
    })
}

/// Post a message to `task` from interrupt context.
///
/// The message is staged in the ISR ring with expiry = now and becomes
/// eligible for delivery on the first dispatch iteration that promotes it.
/// Wait-free: no critical section, no queue traversal. The ring is
/// single-producer — at most one interrupt context may post at a time.
///
/// Fails with [`Error::StagingFull`] when the ring is at capacity.
pub fn message_send_isr(task: &'static Task, id: i32, payload: *mut u8) -> Result<(), Error> {
    // Safety: shared borrow; the staging ring is the ISR/loop handoff and
    // is internally synchronized.
    let staging = unsafe { &(*core_ptr()).staging };
    let msg = Message {
        origin: Origin::Isr,
        task,
        id,
        payload,
        expire: get_tick(),
    };
    if staging.push(msg) {
        Ok(())
    } else {
        Err(Error::StagingFull)
    }
}

/// Cancel every pending delayed message matching `(task, id)` and return
/// how many were removed.
///
/// Task context only. Cancelled pool-owned payloads are released back to
/// the pool, exactly as delivery would have done; payloads that did not
/// come from [`alloc`] are untouched and remain the caller's. Messages
/// still resident in the ISR staging ring are not affected, nor is a
/// message already handed to its handler.
pub fn message_cancel(task: &'static Task, id: i32) -> usize {
    sync::critical_section(|_cs| unsafe {
        let core = &mut *core_ptr();
        #[cfg(feature = "pool")]
        {
            let pool = &mut core.pool;
            core.queue.cancel(task, id, |payload| {
                pool.free(payload);
            })
        }
        #[cfg(not(feature = "pool"))]
        {
            core.queue.cancel(task, id, |_payload| {})
        }
    })
}

// ---------------------------------------------------------------------------
// Payload pool wrappers
// ---------------------------------------------------------------------------

/// Allocate a payload block of at least `size` bytes from the fixed-block
/// pool. Returns null when `size` is zero or no fitting block is free —
/// callers must check.
///
/// Safe from any context: the pool is accessed under the critical section.
pub fn alloc(size: usize) -> *mut u8 {
    #[cfg(feature = "pool")]
    {
        sync::critical_section(|_cs| unsafe { (*core_ptr()).pool.alloc(size) })
    }
    #[cfg(not(feature = "pool"))]
    {
        let _ = size;
        core::ptr::null_mut()
    }
}

/// Release a payload block obtained from [`alloc`]. Null pointers and
/// pointers from outside the pool are ignored. Do not call this for a
/// payload already handed to [`message_send`] — the kernel releases those
/// itself after delivery.
///
/// Safe from any context: the pool is accessed under the critical section.
pub fn free(ptr: *mut u8) {
    #[cfg(feature = "pool")]
    {
        sync::critical_section(|_cs| unsafe {
            (*core_ptr()).pool.free(ptr);
        });
    }
    #[cfg(not(feature = "pool"))]
    {
        let _ = ptr;
    }
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

/// One dispatch iteration: promote at most one staged ISR message into the
/// delay queue, then deliver the queue head if its expiry has passed.
fn poll() {
    // Promote one staged ISR message. The empty check is a bare read —
    // a momentarily stale index only delays visibility by one iteration.
    // Safety: shared borrow of the internally synchronized ring.
    if unsafe { !(*core_ptr()).staging.is_empty() } {
        sync::critical_section(|_cs| unsafe {
            let core = &mut *core_ptr();
            // On TCB exhaustion the staged entry stays put for retry.
            if let Some(idx) = core.queue.alloc() {
                match core.staging.pop() {
                    Some(msg) => core.queue.enqueue(idx, msg),
                    None => core.queue.release(idx),
                }
            }
        });
    }

    // Claim the queue head if it is due. The TCB stays allocated (in
    // flight) while the handler runs.
    let due = sync::critical_section(|_cs| unsafe {
        let core = &mut *core_ptr();
        let now = core.tick.load(Ordering::Relaxed);
        match core.queue.front().and_then(|idx| core.queue.message(idx)) {
            Some(msg) if time::after_eq(now, msg.expire) => {
                core.queue.dequeue().map(|idx| (idx, msg))
            }
            _ => None,
        }
    });

    if let Some((idx, msg)) = due {
        log::trace!(
            "deliver id {} to {:p} ({:?}, {} ticks late)",
            msg.id,
            msg.task,
            msg.origin,
            get_tick().wrapping_sub(msg.expire),
        );

        // Handler runs on the main context with no kernel borrows held, so
        // it is free to post and cancel messages itself.
        (msg.task.handler)(msg.task, msg.id, msg.payload);

        // The payload dies with the delivery; foreign pointers fall out of
        // the pool's range check untouched.
        free(msg.payload);

        sync::critical_section(|_cs| unsafe {
            (*core_ptr()).queue.release(idx);
        });
    }
}

/// The main message pump. Dispatches messages until [`destruct`] is
/// called; most systems never leave this function.
///
/// [`construct`] must have run first — the loop refuses to start
/// otherwise. The loop does not sleep between iterations. A port may
/// insert a WFI-style idle hint of its own; the periodic tick interrupt
/// wakes the core in time for the next due message either way.
pub fn message_loop() {
    let constructed = sync::critical_section(|_cs| unsafe { (*core_ptr()).constructed });
    if !constructed {
        log::warn!("message_loop called before construct");
        return;
    }

    loop {
        let shutdown = sync::critical_section(|_cs| unsafe { (*core_ptr()).shutdown });
        if shutdown {
            log::warn!("shutdown request");
            break;
        }
        poll();
    }
}

// ---------------------------------------------------------------------------
// End-to-end tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::null_mut;
    use std::sync::{Mutex, MutexGuard};
    use std::vec::Vec;

    /// The kernel is a process-wide singleton, so every test that touches
    /// it serializes on this lock and starts from `construct()`.
    static LOCK: Mutex<()> = Mutex::new(());

    /// `(id, tick)` pairs recorded by the test handlers, in delivery order.
    static DELIVERED: Mutex<Vec<(i32, u32)>> = Mutex::new(Vec::new());

    fn begin() -> MutexGuard<'static, ()> {
        let guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        construct();
        DELIVERED.lock().unwrap_or_else(|e| e.into_inner()).clear();
        guard
    }

    fn delivered() -> Vec<(i32, u32)> {
        DELIVERED.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(id: i32) {
        DELIVERED
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, get_tick()));
    }

    /// Run `poll` then `tick`, `ticks` times — i.e. simulate the dispatch
    /// loop running alongside a timer interrupt for `ticks` ticks.
    fn run_for(ticks: u32) {
        for _ in 0..ticks {
            poll();
            tick();
        }
        poll();
    }

    fn recording_handler(_task: &'static Task, id: i32, _payload: *mut u8) {
        record(id);
    }

    static REC: Task = Task::new(recording_handler);
    static OTHER: Task = Task::new(recording_handler);

    // -- Blinky: the canonical self-rescheduling task --------------------

    fn blinky_handler(task: &'static Task, id: i32, _payload: *mut u8) {
        record(id);
        let _ = match id {
            0 => message_send(task, 1, null_mut(), 1000),
            _ => message_send(task, 0, null_mut(), 2000),
        };
    }

    static BLINKY: Task = Task::new(blinky_handler);

    #[test]
    fn test_blinky_schedule() {
        let _g = begin();
        message_send(&BLINKY, 0, null_mut(), time::IMMEDIATE).unwrap();
        run_for(6000);
        assert_eq!(
            delivered(),
            std::vec![(0, 0), (1, 1000), (0, 3000), (1, 4000), (0, 6000)]
        );
    }

    // -- Ordering --------------------------------------------------------

    #[test]
    fn test_immediate_messages_deliver_in_post_order() {
        let _g = begin();
        for id in 1..=3 {
            message_send(&REC, id, null_mut(), time::IMMEDIATE).unwrap();
        }
        // One delivery per iteration.
        poll();
        assert_eq!(delivered(), std::vec![(1, 0)]);
        poll();
        poll();
        assert_eq!(delivered(), std::vec![(1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_distinct_delays_deliver_in_expiry_order() {
        let _g = begin();
        message_send(&REC, 3, null_mut(), 30).unwrap();
        message_send(&REC, 1, null_mut(), 10).unwrap();
        message_send(&REC, 2, null_mut(), 20).unwrap();
        run_for(40);
        assert_eq!(delivered(), std::vec![(1, 10), (2, 20), (3, 30)]);
    }

    #[test]
    fn test_delay_is_a_lower_bound() {
        let _g = begin();
        run_for(5); // start at tick 5
        message_send(&REC, 1, null_mut(), 10).unwrap();
        run_for(20);
        assert_eq!(delivered(), std::vec![(1, 15)]);
    }

    // -- Cancellation ----------------------------------------------------

    #[test]
    fn test_cancel_middle_message() {
        let _g = begin();
        message_send(&REC, 1, null_mut(), 100).unwrap();
        message_send(&REC, 2, null_mut(), 200).unwrap();
        message_send(&REC, 3, null_mut(), 300).unwrap();

        run_for(50);
        assert_eq!(message_cancel(&REC, 2), 1);

        run_for(300);
        assert_eq!(delivered(), std::vec![(1, 100), (3, 300)]);
    }

    #[test]
    fn test_cancel_of_absent_message_is_a_no_op() {
        let _g = begin();
        message_send(&REC, 1, null_mut(), 100).unwrap();
        assert_eq!(message_cancel(&REC, 9), 0);
        assert_eq!(message_cancel(&OTHER, 1), 0);
        run_for(150);
        assert_eq!(delivered(), std::vec![(1, 100)]);
    }

    #[test]
    fn test_cancel_does_not_reach_staged_isr_messages() {
        let _g = begin();
        message_send_isr(&REC, 5, null_mut()).unwrap();
        // Still in the staging ring: cancellation must not see it.
        assert_eq!(message_cancel(&REC, 5), 0);
        run_for(1);
        assert_eq!(delivered(), std::vec![(5, 0)]);
    }

    // -- ISR path --------------------------------------------------------

    #[test]
    fn test_isr_message_beats_delayed_entry() {
        let _g = begin();
        message_send(&REC, 1, null_mut(), 50).unwrap();
        message_send_isr(&REC, 9, null_mut()).unwrap();
        run_for(60);
        assert_eq!(delivered(), std::vec![(9, 0), (1, 50)]);
    }

    #[test]
    fn test_isr_messages_keep_staging_order() {
        let _g = begin();
        for id in 1..=3 {
            message_send_isr(&REC, id, null_mut()).unwrap();
        }
        run_for(5);
        assert_eq!(
            delivered().iter().map(|&(id, _)| id).collect::<Vec<_>>(),
            std::vec![1, 2, 3]
        );
    }

    #[test]
    fn test_isr_ring_reports_full() {
        let _g = begin();
        for id in 0..crate::config::ISR_QUEUE_SIZE as i32 {
            message_send_isr(&REC, id, null_mut()).unwrap();
        }
        assert_eq!(
            message_send_isr(&REC, 99, null_mut()),
            Err(Error::StagingFull)
        );
    }

    #[test]
    fn test_staged_message_waits_out_tcb_exhaustion() {
        let _g = begin();
        for _ in 0..crate::config::TCB_SLOTS {
            message_send(&REC, 7, null_mut(), 100_000).unwrap();
        }
        assert_eq!(
            message_send(&REC, 7, null_mut(), 100_000),
            Err(Error::TcbExhausted)
        );

        message_send_isr(&REC, 9, null_mut()).unwrap();
        poll();
        // No TCB free: nothing delivered, the staged entry is retried.
        assert_eq!(delivered(), std::vec![]);

        // Freeing TCBs lets the next iteration promote and deliver it.
        assert_eq!(message_cancel(&REC, 7), crate::config::TCB_SLOTS);
        poll();
        assert_eq!(delivered(), std::vec![(9, 0)]);
    }

    // -- Tick wrap -------------------------------------------------------

    #[test]
    fn test_delivery_across_tick_wrap() {
        let _g = begin();
        // Seed the clock just below the wrap point.
        unsafe { (*core_ptr()).tick.store(u32::MAX - 5, Ordering::Relaxed) };

        message_send(&REC, 1, null_mut(), 10).unwrap();
        run_for(5);
        // Not due yet — and in particular not delivered "immediately"
        // because the expiry wrapped.
        assert_eq!(delivered(), std::vec![]);

        run_for(15);
        assert_eq!(delivered(), std::vec![(1, (u32::MAX - 5).wrapping_add(10))]);
    }

    // -- Payload pool integration ---------------------------------------

    #[cfg(feature = "pool")]
    #[test]
    fn test_delivered_payload_returns_to_the_pool() {
        let _g = begin();
        let payload = alloc(8);
        assert!(!payload.is_null());
        unsafe { payload.write(42) };

        message_send(&REC, 1, payload, time::IMMEDIATE).unwrap();
        run_for(1);
        assert_eq!(delivered(), std::vec![(1, 0)]);

        // Delivery released the block; the pool hands it out again.
        assert_eq!(alloc(8), payload);
    }

    #[cfg(feature = "pool")]
    #[test]
    fn test_cancelled_payload_returns_to_the_pool() {
        let _g = begin();
        let payload = alloc(8);
        assert!(!payload.is_null());

        message_send(&REC, 1, payload, 100).unwrap();
        assert_eq!(message_cancel(&REC, 1), 1);
        assert_eq!(alloc(8), payload);
    }

    // -- Lifecycle -------------------------------------------------------

    fn shutdown_handler(_task: &'static Task, id: i32, _payload: *mut u8) {
        record(id);
        destruct();
    }

    static QUITTER: Task = Task::new(shutdown_handler);

    #[test]
    fn test_destruct_exits_the_loop() {
        let _g = begin();
        message_send(&QUITTER, 1, null_mut(), time::IMMEDIATE).unwrap();
        message_loop();
        assert_eq!(delivered(), std::vec![(1, 0)]);
    }

    #[test]
    fn test_loop_refuses_to_run_before_construct() {
        let _g = begin();
        unsafe { (*core_ptr()).constructed = false };
        message_loop(); // must return, not spin
    }

    #[test]
    fn test_tick_advances_and_wraps() {
        let _g = begin();
        assert_eq!(get_tick(), 0);
        tick();
        tick();
        assert_eq!(get_tick(), 2);

        unsafe { (*core_ptr()).tick.store(u32::MAX, Ordering::Relaxed) };
        tick();
        assert_eq!(get_tick(), 0);
    }
}
