//! File and filesystem-related syscalls

use crate::task::Process;

/// close descriptor `fd`; mappings made from it stay valid
pub fn sys_close(process: &Process, fd: usize) -> isize {
    match process.close_fd(fd) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}
