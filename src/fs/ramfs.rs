use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::sync::SpinCell;

use super::File;

/// A fixed-length file held in kernel memory.
///
/// Every handle returned by [`File::reopen`] shares the same inode, so a
/// write through one handle is visible through all of them.
pub struct RamFile {
    inode: Arc<SpinCell<Vec<u8>>>,
}

impl RamFile {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            inode: Arc::new(SpinCell::new(data)),
        })
    }

    /// snapshot of the file content
    pub fn contents(&self) -> Vec<u8> {
        self.inode.exclusive_access().clone()
    }

    /// number of handles open on the inode, this one included
    pub fn open_handles(&self) -> usize {
        Arc::strong_count(&self.inode)
    }
}

impl File for RamFile {
    fn reopen(&self) -> Arc<dyn File> {
        Arc::new(Self {
            inode: Arc::clone(&self.inode),
        })
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let data = self.inode.exclusive_access();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut data = self.inode.exclusive_access();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(&buf[..n]);
        n
    }

    fn length(&self) -> usize {
        self.inode.exclusive_access().len()
    }
}
