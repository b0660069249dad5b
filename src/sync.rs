//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. All shared kernel state
//! must be mutated within a critical section to prevent data races between
//! the main context and interrupt handlers.
//!
//! The actual acquire/restore pair comes from whichever `critical-section`
//! provider the final binary links: `cortex-m`'s single-core
//! implementation on bare-metal targets (a plain PRIMASK save/disable/
//! restore, nesting included), or the `std` implementation when the crate
//! is tested on the host.

use critical_section::CriticalSection;

/// Execute a closure within a critical section (interrupts disabled).
///
/// This is the primary mechanism for safely accessing shared mutable state
/// in the kernel. The prior interrupt state is saved on entry and restored
/// on exit, so nesting works and every early return releases the mask.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|_cs| {
///     // Access shared state safely
/// });
/// ```
///
/// # Performance
/// Keep critical sections as short as possible to minimize interrupt
/// latency. Every kernel operation bounded by one is O(TCB_SLOTS) or
/// better.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
