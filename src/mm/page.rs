//! Supplemental page table
//!
//! One table per process, recording for every user page the process has
//! registered where its content lives while no frame backs it. Pages that
//! were never registered are simply absent and read back as
//! [`PageOrigin::Invalid`].

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;

use log::{debug, trace};

use super::swap::{SwapSlot, SwapStore};
use super::{MapId, VirtPageNum};

/// Which file a file-backed page reads from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// page of an active memory mapping
    Mapping(MapId),
    /// page of an executable segment; the last `zero_bytes` of the page are not in the file
    Segment { zero_bytes: usize },
}

/// Backing store of a page.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PageOrigin {
    Invalid,
    /// all zero until first written
    ZeroFill,
    /// content sits in `slot`; the slot is stale once the page is resident again
    Swapped { slot: SwapSlot },
    /// content is `offset..` of a file
    FileBacked { offset: usize, source: FileSource },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SupplementalEntry {
    pub origin: PageOrigin,
    /// a frame currently backs the page
    pub resident: bool,
    pub writable: bool,
    /// the page belongs to an active memory mapping
    pub mmap_owned: bool,
}

impl SupplementalEntry {
    /// swap slot this entry keeps occupied, if any
    fn held_slot(&self) -> Option<SwapSlot> {
        match self.origin {
            PageOrigin::Swapped { slot } if !self.resident => Some(slot),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct SupplementalPageTable {
    entries: BTreeMap<VirtPageNum, SupplementalEntry>,
}

impl SupplementalPageTable {
    pub fn create() -> Self {
        Self::default()
    }

    /// Register a brand-new, non-resident page.
    ///
    /// Returns false if `page` already has a live entry; the existing entry is
    /// left untouched.
    pub fn set(
        &mut self,
        page: VirtPageNum,
        origin: PageOrigin,
        writable: bool,
        mmap_owned: bool,
    ) -> bool {
        assert_ne!(origin, PageOrigin::Invalid, "registering an invalid page");
        if self.is_mapped(page) {
            debug!("[spt] {:?} is already registered", page);
            return false;
        }
        trace!("[spt] set {:?} -> {:?}", page, origin);
        self.entries.insert(
            page,
            SupplementalEntry {
                origin,
                resident: false,
                writable,
                mmap_owned,
            },
        );
        true
    }

    pub fn is_mapped(&self, page: VirtPageNum) -> bool {
        self.entries.contains_key(&page)
    }

    pub fn get(&self, page: VirtPageNum) -> Option<&SupplementalEntry> {
        self.entries.get(&page)
    }

    pub fn origin(&self, page: VirtPageNum) -> PageOrigin {
        self.get(page).map_or(PageOrigin::Invalid, |e| e.origin)
    }

    pub(crate) fn mark_resident(&mut self, page: VirtPageNum, resident: bool) {
        let entry = self.entry_mut(page);
        entry.resident = resident;
    }

    /// move a page onto a new backing store (eviction to swap)
    pub(crate) fn rebind(&mut self, page: VirtPageNum, origin: PageOrigin, mmap_owned: bool) {
        let entry = self.entry_mut(page);
        entry.origin = origin;
        entry.mmap_owned = mmap_owned;
    }

    fn entry_mut(&mut self, page: VirtPageNum) -> &mut SupplementalEntry {
        self.entries
            .get_mut(&page)
            .unwrap_or_else(|| panic!("{:?} has no supplemental entry", page))
    }

    /// Reset `page` to Invalid; idempotent.
    pub fn clear(&mut self, page: VirtPageNum) -> Option<SupplementalEntry> {
        self.entries.remove(&page)
    }

    /// Release every swap slot still referenced by the table, then the table
    /// itself. Taking `self` makes a second destroy impossible.
    pub fn destroy(self, swap: &SwapStore) {
        let mut released = 0;
        for slot in self.entries.values().filter_map(|e| e.held_slot()) {
            swap.free(slot);
            released += 1;
        }
        debug!(
            "[spt] destroyed {} entries, released {} swap slots",
            self.entries.len(),
            released
        );
    }

    /// raw state of `page`, for troubleshooting only
    pub fn describe(&self, page: VirtPageNum) -> String {
        match self.get(page) {
            Some(e) => format!(
                "{:?}: origin={:?} resident={} writable={} mmap={}",
                page, e.origin, e.resident as u8, e.writable as u8, e.mmap_owned as u8
            ),
            None => format!("{:?}: invalid", page),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VirtPageNum, &SupplementalEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PAGE_SIZE, SECTORS_PER_SLOT};
    use crate::drivers::RamDisk;
    use alloc::sync::Arc;

    fn vpn(n: usize) -> VirtPageNum {
        VirtPageNum::from(n)
    }

    #[test]
    fn set_refuses_live_page() {
        let mut spt = SupplementalPageTable::create();
        assert!(spt.set(vpn(1), PageOrigin::ZeroFill, true, false));
        assert!(!spt.set(
            vpn(1),
            PageOrigin::FileBacked {
                offset: 0,
                source: FileSource::Mapping(MapId(2)),
            },
            false,
            true
        ));
        assert_eq!(spt.origin(vpn(1)), PageOrigin::ZeroFill);
        assert!(spt.get(vpn(1)).unwrap().writable);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut spt = SupplementalPageTable::create();
        spt.set(vpn(4), PageOrigin::ZeroFill, false, false);
        assert!(spt.is_mapped(vpn(4)));
        assert!(spt.clear(vpn(4)).is_some());
        assert!(spt.clear(vpn(4)).is_none());
        assert!(!spt.is_mapped(vpn(4)));
        assert_eq!(spt.origin(vpn(4)), PageOrigin::Invalid);
        assert!(spt.set(vpn(4), PageOrigin::ZeroFill, false, false));
    }

    #[test]
    fn destroy_frees_only_held_slots() {
        let swap = SwapStore::initialize(Some(Arc::new(RamDisk::new(4 * SECTORS_PER_SLOT))));
        let page = [7u8; PAGE_SIZE];
        let held = swap.write_out(&page);
        let stale = swap.write_out(&page);
        let mut back = [0u8; PAGE_SIZE];
        swap.read_in(stale, &mut back);

        let mut spt = SupplementalPageTable::create();
        spt.set(vpn(1), PageOrigin::Swapped { slot: held }, true, false);
        spt.set(vpn(2), PageOrigin::Swapped { slot: stale }, true, false);
        spt.mark_resident(vpn(2), true);
        spt.set(vpn(3), PageOrigin::ZeroFill, true, false);
        assert_eq!(swap.used_slots(), 1);

        spt.destroy(&swap);
        assert_eq!(swap.used_slots(), 0);
    }

    #[test]
    fn describe_reports_state() {
        let mut spt = SupplementalPageTable::create();
        spt.set(
            vpn(0x10),
            PageOrigin::FileBacked {
                offset: 0x2000,
                source: FileSource::Segment { zero_bytes: 12 },
            },
            false,
            false,
        );
        let text = spt.describe(vpn(0x10));
        assert!(text.contains("offset: 8192"));
        assert!(text.contains("resident=0"));
        assert!(spt.describe(vpn(0x11)).ends_with("invalid"));
    }
}
