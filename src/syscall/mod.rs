//! Implementation of syscalls
//!
//! The single entry point to all system calls, [`syscall()`], is called
//! whenever userspace wishes to perform a system call using the `ecall`
//! instruction. In this case, the processor raises an 'Environment call from
//! U-mode' exception, which is handled as one of the cases in
//! [`crate::trap::trap_handler`].
//!
//! Only the calls that reach into the memory subsystem are served here.
//! Every call returns `-1` on failure.

const SYSCALL_CLOSE: usize = 57;
const SYSCALL_EXIT: usize = 93;
const SYSCALL_MUNMAP: usize = 215;
const SYSCALL_MMAP: usize = 222;

mod fs;
mod mm;
mod process;

use alloc::sync::Arc;

use log::warn;

pub use self::fs::sys_close;
pub use self::mm::{sys_mmap, sys_munmap};
pub use self::process::sys_exit;

use crate::mm::Vm;
use crate::task::Process;

/// handle syscall exception with `syscall_id` and other arguments
pub fn syscall(vm: &Vm, process: &Arc<Process>, syscall_id: usize, args: [usize; 3]) -> isize {
    match syscall_id {
        SYSCALL_CLOSE => sys_close(process, args[0]),
        SYSCALL_EXIT => sys_exit(vm, process, args[0] as i32),
        SYSCALL_MUNMAP => sys_munmap(vm, process, args[0]),
        SYSCALL_MMAP => sys_mmap(process, args[0], args[1]),
        _ => {
            warn!("[syscall] unsupported syscall_id: {}", syscall_id);
            -1
        }
    }
}
