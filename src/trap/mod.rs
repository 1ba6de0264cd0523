//! Trap handling functionality
//!
//! The architecture-specific entry code saves the user context and decodes
//! the cause; what reaches [`trap_handler()`] is a [`Trap`] naming either a
//! system call or a page fault, together with the user stack pointer saved at
//! entry. Page faults are resolved by the memory subsystem; a fault it
//! refuses kills the process with status `-1`.

use alloc::sync::Arc;

use log::trace;

use crate::mm::{resolve_fault, PageFault, VirtAddr, Vm};
use crate::syscall;
use crate::task::Process;

/// A decoded trap from user mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// `ecall`, with the id from `a7` and arguments from `a0..a2`
    Syscall { id: usize, args: [usize; 3] },
    PageFault(PageFault),
}

impl Trap {
    /// A page fault as reported by the entry code, `stval` taken as is.
    /// Nothing is truncated, so a faulting address outside user space is
    /// seen as such by the resolver.
    pub fn page_fault(stval: usize, write: bool, user: bool) -> Self {
        Trap::PageFault(PageFault {
            addr: VirtAddr::from(stval),
            write,
            user,
        })
    }
}

/// What the trap return path should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// go back to user mode where the trap happened
    Resume,
    /// go back to user mode after the `ecall` with this value in `a0`
    Return(isize),
    /// the process is gone, schedule something else
    Exited(i32),
}

/// handle an exception or system call from user space
pub fn trap_handler(vm: &Vm, process: &Arc<Process>, trap: Trap, user_sp: VirtAddr) -> TrapOutcome {
    process.set_user_sp(user_sp);
    match trap {
        Trap::Syscall { id, args } => {
            let ret = syscall::syscall(vm, process, id, args);
            match process.exit_code() {
                Some(code) => TrapOutcome::Exited(code),
                None => TrapOutcome::Return(ret),
            }
        }
        Trap::PageFault(fault) => handle_page_fault(vm, process, fault),
    }
}

/// Resolve `fault` or kill the process.
pub fn handle_page_fault(vm: &Vm, process: &Arc<Process>, fault: PageFault) -> TrapOutcome {
    match resolve_fault(vm, process, fault) {
        Ok(()) => {
            trace!("[trap] pid {} resolved fault at {:?}", process.pid(), fault.addr);
            TrapOutcome::Resume
        }
        Err(e) => {
            println!(
                "[kernel] PageFault in application, bad addr = {:#x}, {}, kernel killed it.",
                fault.addr.as_usize(),
                e
            );
            process.exit(vm, -1);
            TrapOutcome::Exited(-1)
        }
    }
}
