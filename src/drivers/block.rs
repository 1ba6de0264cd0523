//! Sector-addressed block devices

use alloc::vec;
use alloc::vec::Vec;

use crate::config::SECTOR_SIZE;
use crate::sync::SpinCell;

/// A disk addressed in `SECTOR_SIZE` units.
///
/// Transfers are synchronous; the calling thread may block until the
/// sector is on the platter.
pub trait BlockDevice: Send + Sync {
    fn read_sector(&self, sector: usize, buf: &mut [u8]);
    fn write_sector(&self, sector: usize, buf: &[u8]);
    fn num_sectors(&self) -> usize;
}

/// Disk image kept in kernel memory.
pub struct RamDisk {
    data: SpinCell<Vec<u8>>,
    sectors: usize,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: SpinCell::new(vec![0u8; sectors * SECTOR_SIZE]),
            sectors,
        }
    }

    fn range(&self, sector: usize, len: usize) -> core::ops::Range<usize> {
        assert!(
            sector < self.sectors,
            "sector {} out of range ({} sectors)",
            sector,
            self.sectors
        );
        assert_eq!(len, SECTOR_SIZE, "partial sector transfer");
        sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        let range = self.range(sector, buf.len());
        buf.copy_from_slice(&self.data.exclusive_access()[range]);
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        let range = self.range(sector, buf.len());
        self.data.exclusive_access()[range].copy_from_slice(buf);
    }

    fn num_sectors(&self) -> usize {
        self.sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_are_independent() {
        let disk = RamDisk::new(4);
        disk.write_sector(1, &[0x5a; SECTOR_SIZE]);
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(1, &mut buf);
        assert!(buf.iter().all(|b| *b == 0x5a));
        disk.read_sector(2, &mut buf);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    #[should_panic]
    fn out_of_range_sector() {
        let disk = RamDisk::new(1);
        disk.write_sector(1, &[0; SECTOR_SIZE]);
    }
}
