//! The virtual memory core of the kernel
//!
//! There are a few important sub-modules:
//!
//! - [`mm`]: Demand paging, swap and memory-mapped files
//! - [`task`]: Process control blocks and executable loading
//! - [`trap`]: Page faults and system calls coming from user space
//! - [`syscall`]: System call handling and implementation
//!
//! The kernel brings the memory subsystem up once with [`mm::Vm::new`] and
//! hands the resulting [`mm::Vm`] to every trap.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod console;
pub mod config;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod logging;
pub mod mm;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod trap;
