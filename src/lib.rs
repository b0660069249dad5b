//! # MqOS — Message-Queue Operating System
//!
//! A minimal cooperative message-driven task kernel for small embedded
//! controllers — for systems where a formal RTOS is not required but the
//! code deserves more structure than a foreground/background super-loop.
//!
//! ## Overview
//!
//! Application code is decomposed into **tasks**: named message handlers
//! that the application owns as statics. Work is scheduled by posting
//! **messages** to tasks, delivered either immediately or after a delay in
//! system ticks. A single cooperative dispatch loop drains due messages on
//! the main context; a bounded staging ring lets interrupt handlers inject
//! messages without ever contending for the main scheduling structures.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Application Tasks                       │
//! ├────────────────────────────────────────────────────────────┤
//! │                  Kernel API (kernel.rs)                     │
//! │  construct() · message_send() · message_send_isr()          │
//! │  message_cancel() · alloc()/free() · message_loop()         │
//! ├───────────────┬──────────────────┬─────────────────────────┤
//! │  Delay queue  │  ISR staging     │  Fixed-block pool       │
//! │  queue.rs     │  staging.rs      │  pool.rs                │
//! │  ─ TCB arena  │  ─ SPSC ring     │  ─ 4 size classes       │
//! │  ─ expiry     │  ─ wait-free     │  ─ intrusive free lists │
//! │    ordered    │    handoff       │  ─ debug sentinels      │
//! ├───────────────┴──────────────────┴─────────────────────────┤
//! │        Tick arithmetic (time.rs) · Sync (sync.rs)           │
//! ├────────────────────────────────────────────────────────────┤
//! │              Arch Port (arch/cortex_m4.rs)                  │
//! │              SysTick → kernel::tick()                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example (blinky)
//!
//! ```ignore
//! use mqos::kernel;
//! use mqos::task::Task;
//! use mqos::time;
//!
//! static APP: Task = Task::new(app_handler);
//!
//! fn app_handler(task: &'static Task, id: i32, _payload: *mut u8) {
//!     match id {
//!         0 => {
//!             led_toggle();
//!             let _ = kernel::message_send(task, 1, core::ptr::null_mut(), time::secs(1));
//!         }
//!         _ => {
//!             led_toggle();
//!             let _ = kernel::message_send(task, 0, core::ptr::null_mut(), time::secs(2));
//!         }
//!     }
//! }
//!
//! fn main() -> ! {
//!     kernel::construct();
//!     // Platform timer calls kernel::tick() every millisecond.
//!     let _ = kernel::message_send(&APP, 0, core::ptr::null_mut(), time::IMMEDIATE);
//!     kernel::message_loop();
//!     unreachable!()
//! }
//! ```
//!
//! ## Scheduling model
//!
//! Single-threaded and cooperative: handlers run to completion on the main
//! context, one per dispatch iteration, in expiry order (FIFO among equal
//! expiries). The only concurrency is with hardware ISRs on the same core,
//! and the only structures they share with the main context are the tick
//! counter and the staging ring — both wait-free on the ISR side.
//!
//! ## Memory model
//!
//! - **No heap**: all state is statically allocated
//! - **No `alloc`**: pure `core` only
//! - **Fixed TCB arena**: `[_; TCB_SLOTS]`, free list + delay queue as
//!   index links
//! - **Fixed-block payload pool**: up to four size classes carved from one
//!   static arena
//! - **Critical sections**: the `critical-section` crate; bare-metal
//!   builds link `cortex-m`'s single-core provider

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod arch;
pub mod config;
pub mod kernel;
pub mod sync;
pub mod task;
pub mod time;

mod queue;
mod staging;

#[cfg(feature = "pool")]
mod pool;
