//! Process management
//!
//! A [`Process`] owns what the memory subsystem keeps per process: the
//! address space (supplemental page table, page table and memory maps), the
//! descriptor table and the exit status. Scheduling lives elsewhere; the
//! kernel hands the current process down explicitly.

mod id;
mod loader;
mod process;

pub use id::{pid_alloc, IdTable, PidHandle};
pub use loader::load_elf;
pub use process::Process;
