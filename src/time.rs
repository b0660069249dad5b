//! # Tick Arithmetic
//!
//! The kernel's clock is a free-running `u32` tick counter that wraps.
//! Expiry times are absolute ticks, and every comparison goes through the
//! signed-difference idiom below, which stays correct across a single wrap
//! as long as no scheduled delay exceeds half the tick range (~24 days at
//! 1 kHz).

use crate::config::TICKS_PER_SEC;

/// One reading of the kernel's monotonic, wrapping tick counter.
pub type Tick = u32;

/// Zero delay — the message becomes due on the next dispatch iteration.
pub const IMMEDIATE: Tick = 0;

/// Convert whole seconds to ticks.
#[inline]
pub const fn secs(s: u32) -> Tick {
    s * TICKS_PER_SEC
}

/// Convert whole minutes to ticks.
#[inline]
pub const fn mins(m: u32) -> Tick {
    m * 60 * TICKS_PER_SEC
}

/// Convert whole hours to ticks.
#[inline]
pub const fn hours(h: u32) -> Tick {
    h * 60 * 60 * TICKS_PER_SEC
}

/// Is `a` strictly after `b`, accounting for wrap?
#[inline]
pub fn after(a: Tick, b: Tick) -> bool {
    (b.wrapping_sub(a) as i32) < 0
}

/// Is `a` at or after `b`, accounting for wrap?
#[inline]
pub fn after_eq(a: Tick, b: Tick) -> bool {
    (a.wrapping_sub(b) as i32) >= 0
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
