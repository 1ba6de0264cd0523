use alloc::sync::Arc;

use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use spin::MutexGuard;

use crate::config::{FIRST_FD, MAX_FILES, USER_SPACE_END};
use crate::error::{VmError, VmResult};
use crate::fs::{self, File};
use crate::mm::{self, FrameTracker, MemorySet, SwapStore, VirtAddr, VirtPageNum, Vm};
use crate::sync::SpinCell;

use super::id::{pid_alloc, IdTable, PidHandle};

/// process control block
pub struct Process {
    pid: PidHandle,
    /// address-space lock; take the frame table first if both are needed
    memory_set: SpinCell<MemorySet>,
    fd_table: SpinCell<IdTable<Arc<dyn File>>>,
    /// user stack pointer at the last trap, for stack growth
    user_sp: AtomicUsize,
    exit_code: SpinCell<Option<i32>>,
}

impl Process {
    pub fn new() -> Arc<Self> {
        let process = Arc::new(Self {
            pid: pid_alloc(),
            memory_set: SpinCell::new(MemorySet::new()),
            fd_table: SpinCell::new(IdTable::new(FIRST_FD, MAX_FILES)),
            user_sp: AtomicUsize::new(USER_SPACE_END),
            exit_code: SpinCell::new(None),
        });
        debug!("[task] created pid {}", process.pid());
        process
    }

    pub fn pid(&self) -> usize {
        self.pid.0
    }

    /// Lock the address space.
    pub fn memory_set(&self) -> MutexGuard<'_, MemorySet> {
        self.memory_set.exclusive_access()
    }

    pub fn user_sp(&self) -> VirtAddr {
        VirtAddr::from(self.user_sp.load(Ordering::Relaxed))
    }

    /// record the stack pointer saved by the trap entry
    pub fn set_user_sp(&self, sp: VirtAddr) {
        self.user_sp.store(sp.as_usize(), Ordering::Relaxed);
    }

    /// Write `page` back and drop its mapping so `frame` can be reused.
    ///
    /// Called by the frame table with its lock held; this is the only way
    /// another process' eviction reaches into this address space.
    pub fn evict_page(&self, page: VirtPageNum, frame: &FrameTracker, swap: &SwapStore) {
        let mut ms = self.memory_set();
        mm::page_out(&mut ms, page, frame, swap);
    }

    /// Clock probe: report whether `page` was accessed since the last probe
    /// and clear the bit.
    pub fn test_and_clear_accessed(&self, page: VirtPageNum) -> bool {
        let mut ms = self.memory_set();
        let accessed = ms.page_table.is_accessed(page);
        if accessed {
            ms.page_table.set_accessed(page, false);
        }
        accessed
    }

    /// Install `file` under the lowest free descriptor.
    pub fn install_fd(&self, file: Arc<dyn File>) -> VmResult<usize> {
        self.fd_table
            .exclusive_access()
            .insert(file)
            .ok_or(VmError::FileTableFull)
    }

    pub fn file(&self, fd: usize) -> VmResult<Arc<dyn File>> {
        self.fd_table
            .exclusive_access()
            .get(fd)
            .cloned()
            .ok_or(VmError::BadDescriptor(fd))
    }

    /// Close descriptor `fd`. Mappings made from it stay valid.
    pub fn close_fd(&self, fd: usize) -> VmResult<()> {
        let file = self
            .fd_table
            .exclusive_access()
            .remove(fd)
            .ok_or(VmError::BadDescriptor(fd))?;
        fs::close(file);
        Ok(())
    }

    /// Terminate the process: flush and drop every mapping, release its
    /// frames and swap slots, close its descriptors.
    ///
    /// Only the first call has any effect.
    pub fn exit(self: &Arc<Self>, vm: &Vm, exit_code: i32) {
        {
            let mut code = self.exit_code.exclusive_access();
            if code.is_some() {
                return;
            }
            *code = Some(exit_code);
        }
        mm::teardown(vm, self);
        let fds = self.fd_table.exclusive_access().ids();
        for fd in fds {
            // cannot fail, the id was just listed
            let _ = self.close_fd(fd);
        }
        info!("[kernel] pid {} exited with code {}", self.pid(), exit_code);
    }

    /// `None` while the process is alive
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.exclusive_access()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RamFile;
    use alloc::vec;

    #[test]
    fn descriptors_start_at_two() {
        let process = Process::new();
        let file = RamFile::new(vec![1, 2, 3]);
        assert_eq!(process.install_fd(file.clone()), Ok(2));
        assert_eq!(process.install_fd(file.clone()), Ok(3));
        assert!(process.file(2).is_ok());
        assert_eq!(process.close_fd(2), Ok(()));
        assert_eq!(process.close_fd(2), Err(VmError::BadDescriptor(2)));
        assert!(matches!(process.file(0), Err(VmError::BadDescriptor(0))));
        assert_eq!(process.install_fd(file), Ok(2));
    }

    #[test]
    fn descriptor_table_fills_up() {
        let process = Process::new();
        let file = RamFile::new(vec![0]);
        for fd in FIRST_FD..MAX_FILES {
            assert_eq!(process.install_fd(file.clone()), Ok(fd));
        }
        assert_eq!(process.install_fd(file), Err(VmError::FileTableFull));
    }

    #[test]
    fn closing_drops_the_handle() {
        let process = Process::new();
        let file = RamFile::new(vec![0; 8]);
        let fd = process.install_fd(file.reopen()).unwrap();
        assert_eq!(file.open_handles(), 2);
        process.close_fd(fd).unwrap();
        assert_eq!(file.open_handles(), 1);
    }
}
