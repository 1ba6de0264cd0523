//! Swap store
//!
//! The swap device is cut into page-sized slots of `SECTORS_PER_SLOT`
//! contiguous sectors. A bitmap records which slots hold a page. Every
//! operation runs entirely under the store lock, sector I/O included.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, error, trace};

use crate::config::{SECTORS_PER_SLOT, SECTOR_SIZE};
use crate::drivers::BlockDevice;
use crate::sync::SpinCell;

use super::PageBuf;

/// Index of a page-sized slot on the swap device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(pub usize);

impl SwapSlot {
    fn first_sector(&self) -> usize {
        self.0 * SECTORS_PER_SLOT
    }
}

/// one bit per slot, set = in use
struct Bitmap {
    words: Vec<u64>,
    bits: usize,
}

impl Bitmap {
    fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
            bits,
        }
    }

    fn test(&self, idx: usize) -> bool {
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    fn set(&mut self, idx: usize, value: bool) {
        if value {
            self.words[idx / 64] |= 1 << (idx % 64);
        } else {
            self.words[idx / 64] &= !(1 << (idx % 64));
        }
    }

    /// first clear bit, flipped to set
    fn scan_and_flip(&mut self) -> Option<usize> {
        let (word_idx, word) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)?;
        let idx = word_idx * 64 + word.trailing_ones() as usize;
        if idx >= self.bits {
            return None;
        }
        self.set(idx, true);
        Some(idx)
    }

    fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

struct SwapInner {
    device: Arc<dyn BlockDevice>,
    used: Bitmap,
}

pub struct SwapStore {
    inner: SpinCell<SwapInner>,
    slots: usize,
}

impl SwapStore {
    /// Size the slot bitmap from the swap device.
    ///
    /// Swap is mandatory: boot cannot continue without a usable device.
    pub fn initialize(device: Option<Arc<dyn BlockDevice>>) -> Self {
        let device = match device {
            Some(device) => device,
            None => {
                error!("[swap] no swap device");
                panic!("swap device unavailable");
            }
        };
        let slots = device.num_sectors() / SECTORS_PER_SLOT;
        if slots == 0 {
            error!("[swap] swap device holds no complete slot");
            panic!("swap device too small");
        }
        debug!("[swap] {} slots on {} sectors", slots, device.num_sectors());
        Self {
            inner: SpinCell::new(SwapInner {
                device,
                used: Bitmap::new(slots),
            }),
            slots,
        }
    }

    /// Claim the first free slot and write `page` to it.
    ///
    /// Running out of swap means memory is exhausted system wide; there is
    /// nothing left to reclaim, so this panics.
    pub fn write_out(&self, page: &PageBuf) -> SwapSlot {
        let mut inner = self.inner.exclusive_access();
        let slot = match inner.used.scan_and_flip() {
            Some(idx) => SwapSlot(idx),
            None => {
                error!("[swap] out of swap slots ({} in use)", self.slots);
                panic!("swap exhausted");
            }
        };
        for (i, chunk) in page.chunks(SECTOR_SIZE).enumerate() {
            inner.device.write_sector(slot.first_sector() + i, chunk);
        }
        trace!("[swap] wrote {:?}", slot);
        slot
    }

    /// Read `slot` into `dst` and release it. A slot is consumed by exactly one read.
    pub fn read_in(&self, slot: SwapSlot, dst: &mut PageBuf) {
        let mut inner = self.inner.exclusive_access();
        Self::check_used(&inner, slot);
        for (i, chunk) in dst.chunks_mut(SECTOR_SIZE).enumerate() {
            inner.device.read_sector(slot.first_sector() + i, chunk);
        }
        inner.used.set(slot.0, false);
        trace!("[swap] read {:?}", slot);
    }

    /// Release `slot` without reading it back.
    pub fn free(&self, slot: SwapSlot) {
        let mut inner = self.inner.exclusive_access();
        Self::check_used(&inner, slot);
        inner.used.set(slot.0, false);
        trace!("[swap] freed {:?}", slot);
    }

    fn check_used(inner: &SwapInner, slot: SwapSlot) {
        assert!(
            slot.0 < inner.used.bits && inner.used.test(slot.0),
            "swap slot {:?} is not in use",
            slot
        );
    }

    pub fn capacity(&self) -> usize {
        self.slots
    }

    pub fn used_slots(&self) -> usize {
        self.inner.exclusive_access().used.count_ones()
    }

    pub fn is_used(&self, slot: SwapSlot) -> bool {
        let inner = self.inner.exclusive_access();
        slot.0 < inner.used.bits && inner.used.test(slot.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::drivers::RamDisk;

    fn store(slots: usize) -> SwapStore {
        SwapStore::initialize(Some(Arc::new(RamDisk::new(slots * SECTORS_PER_SLOT))))
    }

    fn page(seed: u8) -> PageBuf {
        let mut page = [0u8; PAGE_SIZE];
        for (i, b) in page.iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        page
    }

    #[test]
    fn round_trip_releases_slot() {
        let swap = store(4);
        let slot = swap.write_out(&page(3));
        assert!(swap.is_used(slot));
        let mut back = [0u8; PAGE_SIZE];
        swap.read_in(slot, &mut back);
        assert_eq!(back, page(3));
        assert!(!swap.is_used(slot));
        assert_eq!(swap.used_slots(), 0);
    }

    #[test]
    fn first_fit_reuses_freed_slot() {
        let swap = store(4);
        let a = swap.write_out(&page(0));
        let b = swap.write_out(&page(1));
        assert_eq!((a, b), (SwapSlot(0), SwapSlot(1)));
        swap.free(a);
        assert_eq!(swap.write_out(&page(2)), SwapSlot(0));
        assert_eq!(swap.write_out(&page(2)), SwapSlot(2));
    }

    #[test]
    fn capacity_ignores_partial_slot() {
        let swap = SwapStore::initialize(Some(Arc::new(RamDisk::new(SECTORS_PER_SLOT * 3 + 5))));
        assert_eq!(swap.capacity(), 3);
    }

    #[test]
    fn bitmap_spans_words() {
        let swap = store(70);
        for i in 0..70 {
            assert_eq!(swap.write_out(&page(0)), SwapSlot(i));
        }
        assert_eq!(swap.used_slots(), 70);
        swap.free(SwapSlot(65));
        assert_eq!(swap.write_out(&page(0)), SwapSlot(65));
    }

    #[test]
    #[should_panic(expected = "swap exhausted")]
    fn exhaustion_is_fatal() {
        let swap = store(1);
        swap.write_out(&page(0));
        swap.write_out(&page(1));
    }

    #[test]
    #[should_panic(expected = "swap device unavailable")]
    fn missing_device_is_fatal() {
        SwapStore::initialize(None);
    }

    #[test]
    #[should_panic(expected = "not in use")]
    fn slot_is_consumed_by_one_read() {
        let swap = store(2);
        let slot = swap.write_out(&page(0));
        let mut back = [0u8; PAGE_SIZE];
        swap.read_in(slot, &mut back);
        swap.read_in(slot, &mut back);
    }
}
