//! Memory-mapped files
//!
//! A mapping ties `[base, base + len)` of a process to the content of a file.
//! Nothing is read at map time: every page is registered as file backed and
//! faulted in on first touch. Dirty pages reach the file when they are
//! evicted, unmapped, or when the process exits.

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, error, warn};

use crate::config::{FIRST_MAP_ID, MAX_MAPPINGS, PAGE_SIZE, STACK_LIMIT_ADDR};
use crate::error::{VmError, VmResult};
use crate::fs::{self, File};
use crate::task::{IdTable, Process};

use super::page::{FileSource, PageOrigin};
use super::{PageBuf, VPNRange, VirtAddr, Vm};

/// Id of a memory mapping, unique within its process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapId(pub usize);

pub struct Mapping {
    /// private handle, independent of the descriptor the mapping was made from
    file: Arc<dyn File>,
    base: VirtAddr,
    len: usize,
}

impl Mapping {
    pub fn file(&self) -> &Arc<dyn File> {
        &self.file
    }

    pub fn base(&self) -> VirtAddr {
        self.base
    }

    /// file length at map time; files never grow
    pub fn length(&self) -> usize {
        self.len
    }

    pub fn pages(&self) -> VPNRange {
        VPNRange::covering(self.base, self.len)
    }
}

/// Per-process table of active mappings.
pub struct MapTable {
    maps: IdTable<Mapping>,
}

impl MapTable {
    pub fn new() -> Self {
        Self {
            maps: IdTable::new(FIRST_MAP_ID, MAX_MAPPINGS),
        }
    }

    pub fn get(&self, id: MapId) -> Option<&Mapping> {
        self.maps.get(id.0)
    }

    pub fn ids(&self) -> Vec<MapId> {
        self.maps.ids().into_iter().map(MapId).collect()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl Default for MapTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Write the in-file part of a mapped page back to `file`.
///
/// Only `min(PAGE_SIZE, file_len - offset)` bytes belong to the file; the
/// zero padding past end of file is never written. Returns false on a short write.
pub(crate) fn flush_page(file: &dyn File, offset: usize, file_len: usize, page: &PageBuf) -> bool {
    let len = PAGE_SIZE.min(file_len.saturating_sub(offset));
    fs::write_at(file, offset, &page[..len]) == len
}

/// Map `file` at `addr` in `process`.
///
/// On any failure nothing is left behind: no id, no handle, no page entries.
pub fn mmap(process: &Process, file: &Arc<dyn File>, addr: VirtAddr) -> VmResult<MapId> {
    if addr.is_null() {
        return Err(VmError::NullAddress);
    }
    if !addr.aligned() {
        return Err(VmError::Misaligned(addr));
    }
    if !addr.is_user() {
        return Err(VmError::OutOfRange(addr));
    }
    let len = fs::length(file.as_ref());
    if len == 0 {
        return Err(VmError::EmptyFile);
    }
    // the mapping must stay clear of the region reserved for stack growth
    if addr.as_usize() + len >= STACK_LIMIT_ADDR {
        return Err(VmError::OutOfRange(addr));
    }

    let mut ms = process.memory_set();
    let pages = VPNRange::covering(addr, len);
    if let Some(page) = pages.clone().find(|page| ms.spt.is_mapped(*page)) {
        return Err(VmError::Overlap(page.base()));
    }
    if ms.maps.maps.is_full() {
        return Err(VmError::MapTableFull);
    }
    let handle = fs::reopen(file.as_ref());
    let id = match ms.maps.maps.insert(Mapping {
        file: handle,
        base: addr,
        len,
    }) {
        Some(id) => MapId(id),
        None => return Err(VmError::MapTableFull),
    };
    for (i, page) in pages.enumerate() {
        let origin = PageOrigin::FileBacked {
            offset: i * PAGE_SIZE,
            source: FileSource::Mapping(id),
        };
        if !ms.spt.set(page, origin, true, true) {
            // the overlap check ran under the same lock, so this is a kernel bug
            error!("[mmap] {:?} registered behind our back", page);
            for done in VPNRange::covering(addr, i * PAGE_SIZE) {
                ms.spt.clear(done);
            }
            if let Some(mapping) = ms.maps.maps.remove(id.0) {
                fs::close(mapping.file);
            }
            return Err(VmError::Overlap(page.base()));
        }
    }
    debug!(
        "[mmap] pid {} mapped {:?} at {:?}, {} bytes",
        process.pid(),
        id,
        addr,
        len
    );
    Ok(id)
}

/// Tear down mapping `id` of `process`, flushing dirty resident pages first.
///
/// Returns false if `id` names no active mapping, which makes a second
/// unmap of the same id a no-op.
pub fn munmap(vm: &Vm, process: &Process, id: MapId) -> bool {
    let mut frames = vm.frame_table().lock();
    let mut ms = process.memory_set();
    let mapping = match ms.maps.maps.remove(id.0) {
        Some(mapping) => mapping,
        None => {
            debug!("[mmap] pid {} has no {:?}", process.pid(), id);
            return false;
        }
    };
    for page in mapping.pages() {
        let resident = ms.spt.get(page).map_or(false, |e| e.resident);
        if resident {
            let frame = frames.forget(process.pid(), page);
            if ms.page_table.is_dirty(page) {
                let offset = usize::from(page.base()) - usize::from(mapping.base);
                let bytes = frame.bytes();
                if !flush_page(mapping.file.as_ref(), offset, mapping.len, &bytes) {
                    warn!("[mmap] short write flushing {:?} of {:?}", page, id);
                }
            }
            ms.page_table.unmap(page);
        }
        ms.spt.clear(page);
    }
    drop(ms);
    drop(frames);
    fs::close(mapping.file);
    debug!("[mmap] pid {} unmapped {:?}", process.pid(), id);
    true
}
