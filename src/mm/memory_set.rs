use alloc::sync::Arc;

use crate::fs::File;

use super::mmap::MapTable;
use super::page::SupplementalPageTable;
use super::page_table::PageTable;

/// The user address space of one process: how every registered page is
/// backed, which of them are in memory right now, and which files are mapped.
///
/// Guarded by the owning process' address-space lock. Code that also needs
/// the frame table must take the frame table first.
#[derive(Default)]
pub struct MemorySet {
    pub(crate) spt: SupplementalPageTable,
    pub(crate) page_table: PageTable,
    pub(crate) maps: MapTable,
    /// executable whose segments back `FileSource::Segment` pages
    pub(crate) exec_file: Option<Arc<dyn File>>,
}

impl MemorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spt(&self) -> &SupplementalPageTable {
        &self.spt
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn maps(&self) -> &MapTable {
        &self.maps
    }
}
