//! # Cortex-M4 Port Layer
//!
//! Hardware-specific glue for ARM Cortex-M4 (Thumb-2) targets: SysTick
//! timer configuration and the tick exception handler.
//!
//! The kernel needs two things from the platform:
//!
//! 1. A periodic interrupt calling [`crate::kernel::tick`] at
//!    `TICKS_PER_SEC` — provided here via SysTick.
//! 2. A system-wide interrupt mask with save/restore nesting — provided by
//!    linking `cortex-m` with the `critical-section-single-core` feature,
//!    which this crate enables for bare-metal ARM builds.
//!
//! The dispatch loop itself runs in Thread mode; no context switching, no
//! PendSV, no per-task stacks.

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICKS_PER_SEC};

/// Configure the SysTick timer as the kernel tick source.
///
/// Sets up SysTick to fire at `TICKS_PER_SEC` using the processor clock.
/// Each expiry triggers the [`SysTick`] handler below, which advances the
/// kernel tick.
///
/// Call once from `main`, after [`crate::kernel::construct`] — the tick
/// handler must not run before the kernel state is initialized.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICKS_PER_SEC - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// SysTick exception handler — the kernel tick entry point.
///
/// Fires at `TICKS_PER_SEC`. The vector table entry is resolved by symbol
/// name, so linking this crate is enough to install it.
#[no_mangle]
pub extern "C" fn SysTick() {
    crate::kernel::tick();
}
