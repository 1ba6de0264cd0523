//! File service used by demand paging and memory-mapped files
//!
//! The filesystem itself is not thread safe: every operation issued from the
//! memory subsystem goes through the helpers below, which hold the global
//! filesystem lock for the duration of the call.

mod ramfs;

use alloc::sync::Arc;

use crate::sync::SpinCell;

pub use ramfs::RamFile;

/// An open file handle. Dropping the handle closes it.
pub trait File: Send + Sync {
    /// a fresh, independent handle on the same file
    fn reopen(&self) -> Arc<dyn File>;
    /// read at most `buf.len()` bytes at `offset`, returns bytes read
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize;
    /// write at most `buf.len()` bytes at `offset`; files do not grow
    fn write_at(&self, offset: usize, buf: &[u8]) -> usize;
    fn length(&self) -> usize;
}

static FILESYS_LOCK: SpinCell<()> = SpinCell::new(());

pub fn read_at(file: &dyn File, offset: usize, buf: &mut [u8]) -> usize {
    let _guard = FILESYS_LOCK.exclusive_access();
    file.read_at(offset, buf)
}

pub fn write_at(file: &dyn File, offset: usize, buf: &[u8]) -> usize {
    let _guard = FILESYS_LOCK.exclusive_access();
    file.write_at(offset, buf)
}

pub fn length(file: &dyn File) -> usize {
    let _guard = FILESYS_LOCK.exclusive_access();
    file.length()
}

pub fn reopen(file: &dyn File) -> Arc<dyn File> {
    let _guard = FILESYS_LOCK.exclusive_access();
    file.reopen()
}

/// close under the filesystem lock
pub fn close(file: Arc<dyn File>) {
    let _guard = FILESYS_LOCK.exclusive_access();
    drop(file);
}
