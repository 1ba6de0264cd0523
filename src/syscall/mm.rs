//! Memory-mapping syscalls

use log::debug;

use crate::mm::{self, MapId, VirtAddr, Vm};
use crate::task::Process;

/// Map the file open as `fd` at `addr`. Returns the mapping id, or -1.
pub fn sys_mmap(process: &Process, fd: usize, addr: usize) -> isize {
    let Some(addr) = VirtAddr::try_user(addr) else {
        debug!("[syscall] mmap: {:#x} is not a user address", addr);
        return -1;
    };
    let file = match process.file(fd) {
        Ok(file) => file,
        Err(e) => {
            debug!("[syscall] mmap: {}", e);
            return -1;
        }
    };
    match mm::mmap(process, &file, addr) {
        Ok(id) => id.0 as isize,
        Err(e) => {
            debug!("[syscall] mmap: {}", e);
            -1
        }
    }
}

/// Unmap mapping `id`. An unknown id changes nothing and returns -1.
pub fn sys_munmap(vm: &Vm, process: &Process, id: usize) -> isize {
    if mm::munmap(vm, process, MapId(id)) {
        0
    } else {
        -1
    }
}
