//! # MqOS Configuration
//!
//! Compile-time constants governing kernel capacity and timing.
//! All limits are fixed at compile time — no dynamic allocation.

/// Number of task control blocks in the kernel's TCB pool. This bounds the
/// number of outstanding message deliveries (delayed plus promoted ISR
/// messages). Increase it if the application keeps many messages in flight.
pub const TCB_SLOTS: usize = 32;

/// Capacity of the ISR staging ring — the number of messages interrupt
/// handlers can post before the dispatch loop promotes them. The ring
/// reserves one extra slot internally to distinguish full from empty.
pub const ISR_QUEUE_SIZE: usize = 8;

/// Nominal tick rate in Hz. The platform timer must call `kernel::tick()`
/// at this rate; the `time::secs`/`mins`/`hours` helpers scale by it.
pub const TICKS_PER_SEC: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
/// Used by the arch layer to derive the SysTick reload value.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Block count for pool class 1. A class with count 0 is omitted entirely.
/// The order of the classes here is not significant — they are sorted by
/// size when the kernel is constructed.
pub const POOL_COUNT1: usize = 16;
/// Payload size in bytes for pool class 1.
pub const POOL_SIZE1: usize = 8;

/// Block count for pool class 2.
pub const POOL_COUNT2: usize = 8;
/// Payload size in bytes for pool class 2.
pub const POOL_SIZE2: usize = 16;

/// Block count for pool class 3.
pub const POOL_COUNT3: usize = 4;
/// Payload size in bytes for pool class 3.
pub const POOL_SIZE3: usize = 32;

/// Block count for pool class 4.
pub const POOL_COUNT4: usize = 2;
/// Payload size in bytes for pool class 4.
pub const POOL_SIZE4: usize = 64;
