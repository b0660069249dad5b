//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the kernel: each port wires the platform's
//! periodic timer to `kernel::tick()` and supplies a `critical-section`
//! provider. Currently implements the Cortex-M4 port; extensible to other
//! architectures by adding sibling modules. Host builds (tests) compile no
//! port at all — the `critical-section` `std` implementation stands in.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
