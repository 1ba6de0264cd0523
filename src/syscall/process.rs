//! Process management syscalls

use alloc::sync::Arc;

use crate::mm::Vm;
use crate::task::Process;

/// process exits and submits an exit code
pub fn sys_exit(vm: &Vm, process: &Arc<Process>, exit_code: i32) -> isize {
    println!("[kernel] Application exited with code {}", exit_code);
    process.exit(vm, exit_code);
    0
}
