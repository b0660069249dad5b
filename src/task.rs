//! # Task Model
//!
//! A task is nothing more than a named message handler. The application
//! defines its tasks as `static` values and keeps ownership of them for the
//! lifetime of the program; the kernel only ever borrows them. All per-task
//! state lives in the application — the discriminator for a handler's
//! internal dispatch is the message id it receives.

use crate::time::Tick;

/// Task message handler.
///
/// Invoked synchronously on the main context with the task it was posted
/// to, the message id, and the payload pointer (null when the message
/// carries no payload). The payload stays valid for the duration of the
/// call and is released back to the pool as soon as the handler returns.
///
/// Handlers may call any task-context kernel API, including posting
/// further messages and cancelling pending ones.
pub type Handler = fn(task: &'static Task, id: i32, payload: *mut u8);

/// A task — one registered message handler.
///
/// Define tasks as statics and pass references into the kernel:
///
/// ```ignore
/// static APP: Task = Task::new(app_handler);
///
/// kernel::message_send(&APP, 0, core::ptr::null_mut(), time::IMMEDIATE)?;
/// ```
pub struct Task {
    /// The message handler for this task.
    pub handler: Handler,
}

impl Task {
    /// Create a task record around a handler.
    pub const fn new(handler: Handler) -> Self {
        Self { handler }
    }
}

/// Where a message was posted from. Recorded in every message so the
/// dispatch trace can tell application posts from promoted ISR posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Posted from task context via `kernel::message_send`.
    App,
    /// Posted from interrupt context via `kernel::message_send_isr`.
    Isr,
}

/// One pending message delivery.
///
/// This is the value that travels through the kernel: interrupt handlers
/// deposit it in the staging ring, and the delay queue holds one per
/// allocated TCB slot until the expiry tick passes.
#[derive(Clone, Copy)]
pub(crate) struct Message {
    /// Posting context.
    pub origin: Origin,
    /// Destination task. Borrowed — the kernel never owns task records.
    pub task: &'static Task,
    /// Message id, the handler's dispatch discriminator.
    pub id: i32,
    /// Payload pointer, null when the message carries none. Owned by the
    /// kernel from post until the handler returns, then freed through the
    /// pool (a no-op for pointers the pool does not recognize).
    pub payload: *mut u8,
    /// Absolute expiry tick.
    pub expire: Tick,
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn nop_handler(_task: &'static Task, _id: i32, _payload: *mut u8) {}

    static NOP: Task = Task::new(nop_handler);

    #[test]
    fn test_task_identity_is_by_reference() {
        // Cancellation matches tasks by pointer identity, so two distinct
        // statics must not compare equal even with the same handler.
        static OTHER: Task = Task::new(nop_handler);
        assert!(core::ptr::eq(&NOP, &NOP));
        assert!(!core::ptr::eq(&NOP, &OTHER));
    }

    #[test]
    fn test_message_snapshot_is_copy() {
        let m = Message {
            origin: Origin::App,
            task: &NOP,
            id: 3,
            payload: core::ptr::null_mut(),
            expire: 42,
        };
        let n = m;
        assert_eq!(n.id, 3);
        assert_eq!(n.expire, 42);
        assert_eq!(n.origin, Origin::App);
        assert!(n.payload.is_null());
        assert!(core::ptr::eq(m.task, n.task));
    }
}
