//! Page-fault resolution and page write-back
//!
//! A registered page moves between two states. **fault** brings a
//! non-resident page into a frame filled from its backing store; **evict**
//! writes a resident page back where it can be found again and drops the
//! mapping. Eviction in the frame table goes through [`page_out`] rather than
//! duplicating the rules.

use alloc::sync::Arc;

use log::{debug, error, trace};

use crate::config::{PAGE_SIZE, STACK_LIMIT_ADDR, STACK_PUSH_WINDOW, USER_SPACE_END};
use crate::error::{VmError, VmResult};
use crate::fs;
use crate::task::Process;

use super::frame_allocator::FrameTracker;
use super::memory_set::MemorySet;
use super::mmap::flush_page;
use super::page::{FileSource, PageOrigin, SupplementalEntry};
use super::page_table::PTEFlags;
use super::swap::SwapStore;
use super::{VirtAddr, VirtPageNum, Vm};

/// What the trap reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    pub addr: VirtAddr,
    /// the access was a store
    pub write: bool,
    /// the access came from user mode
    pub user: bool,
}

/// Make the page containing `fault.addr` resident in `process`.
///
/// Returns an error when the access is illegal for the process; the caller
/// is expected to kill it.
pub fn resolve_fault(vm: &Vm, process: &Arc<Process>, fault: PageFault) -> VmResult<()> {
    let addr = fault.addr;
    if !addr.is_user() {
        if !fault.user {
            panic!("kernel page fault at {:?}", addr);
        }
        return Err(VmError::KernelAddress(addr));
    }
    let vpn = addr.floor();

    {
        let mut ms = process.memory_set();
        match ms.spt.get(vpn).copied() {
            None if is_stack_access(addr, process.user_sp()) => {
                debug!("[fault] pid {} grows stack to {:?}", process.pid(), vpn);
                if !ms.spt.set(vpn, PageOrigin::ZeroFill, true, false) {
                    return Err(VmError::AlreadyMapped(vpn.base()));
                }
            }
            None => return Err(VmError::Unmapped(addr)),
            Some(entry) => {
                check_access(&entry, fault)?;
                if entry.resident {
                    // another thread of the process got here first
                    return Ok(());
                }
            }
        }
    }

    let mut frames = vm.frame_table().lock();
    let frame = frames.obtain_frame(vm.pool(), vm.swap(), false);
    let mut ms = process.memory_set();
    let entry = match ms.spt.get(vpn).copied() {
        Some(entry) if !entry.resident => entry,
        // resident again, or unmapped while we waited for a frame
        Some(_) => return Ok(()),
        None => return Err(VmError::Unmapped(addr)),
    };
    page_in(&ms, vpn, &entry, &frame, vm.swap())?;
    let mut flags = PTEFlags::R | PTEFlags::U;
    if entry.writable {
        flags |= PTEFlags::W;
    }
    ms.page_table.map(vpn, frame.ppn, flags);
    ms.spt.mark_resident(vpn, true);
    trace!(
        "[fault] pid {} {:?} in from {:?}",
        process.pid(),
        vpn,
        entry.origin
    );
    drop(ms);
    frames.record(process, vpn, frame);
    Ok(())
}

fn check_access(entry: &SupplementalEntry, fault: PageFault) -> VmResult<()> {
    if fault.write && !entry.writable {
        return Err(VmError::ReadOnly(fault.addr));
    }
    Ok(())
}

/// An unregistered address counts as stack if it lies in the stack region
/// and no further below `sp` than a push instruction reaches.
fn is_stack_access(addr: VirtAddr, sp: VirtAddr) -> bool {
    let addr = addr.as_usize();
    (STACK_LIMIT_ADDR..USER_SPACE_END).contains(&addr)
        && addr + STACK_PUSH_WINDOW >= sp.as_usize()
}

/// Fill `frame` from the backing store described by `entry`.
fn page_in(
    ms: &MemorySet,
    vpn: VirtPageNum,
    entry: &SupplementalEntry,
    frame: &FrameTracker,
    swap: &SwapStore,
) -> VmResult<()> {
    let mut bytes = frame.bytes();
    match entry.origin {
        PageOrigin::Invalid => unreachable!("invalid pages are never registered"),
        PageOrigin::ZeroFill => bytes.fill(0),
        // the read frees the slot; the entry keeps the stale index until the next eviction
        PageOrigin::Swapped { slot } => swap.read_in(slot, &mut bytes),
        PageOrigin::FileBacked { offset, source } => {
            let (file, read_len) = match source {
                FileSource::Mapping(id) => match ms.maps.get(id) {
                    Some(mapping) => (
                        Arc::clone(mapping.file()),
                        PAGE_SIZE.min(mapping.length().saturating_sub(offset)),
                    ),
                    None => {
                        error!("[fault] {:?} names dead mapping {:?}", vpn, id);
                        return Err(VmError::Unmapped(vpn.base()));
                    }
                },
                FileSource::Segment { zero_bytes } => match &ms.exec_file {
                    Some(file) => (Arc::clone(file), PAGE_SIZE - zero_bytes),
                    None => {
                        error!("[fault] {:?} is a segment page but no executable is loaded", vpn);
                        return Err(VmError::Unmapped(vpn.base()));
                    }
                },
            };
            let n = fs::read_at(file.as_ref(), offset, &mut bytes[..read_len]);
            bytes[n..].fill(0);
        }
    }
    Ok(())
}

/// Write the resident page `vpn` back to its store and unmap it.
///
/// Pages that are not file backed always go to a fresh swap slot. A dirty
/// page of a live mapping goes back to its file; a clean file-backed page
/// can be read again and needs no I/O.
///
/// A dirty file-backed page that does not belong to a live mapping (a
/// written executable data page) cannot go back to its file. It is moved to
/// swap and stays there from then on.
pub(crate) fn page_out(ms: &mut MemorySet, vpn: VirtPageNum, frame: &FrameTracker, swap: &SwapStore) {
    let entry = match ms.spt.get(vpn) {
        Some(entry) if entry.resident => *entry,
        _ => panic!("evicting {:?} which is not resident", vpn),
    };
    let dirty = ms.page_table.is_dirty(vpn);
    let bytes = frame.bytes();
    match entry.origin {
        PageOrigin::Invalid => unreachable!("invalid pages are never registered"),
        PageOrigin::FileBacked { .. } if !dirty => {}
        PageOrigin::FileBacked { offset, source } => {
            let mapping = match source {
                FileSource::Mapping(id) if entry.mmap_owned => ms.maps.get(id),
                _ => None,
            };
            match mapping {
                Some(mapping) => {
                    if !flush_page(mapping.file().as_ref(), offset, mapping.length(), &bytes) {
                        error!("[evict] lost dirty page {:?} at offset {:#x}", vpn, offset);
                        panic!("failed to write back mapped page");
                    }
                }
                None => {
                    debug!("[evict] {:?} is a dirty file page with no mapping, moving it to swap", vpn);
                    let slot = swap.write_out(&bytes);
                    ms.spt.rebind(vpn, PageOrigin::Swapped { slot }, false);
                }
            }
        }
        PageOrigin::ZeroFill | PageOrigin::Swapped { .. } => {
            let slot = swap.write_out(&bytes);
            ms.spt.rebind(vpn, PageOrigin::Swapped { slot }, false);
        }
    }
    drop(bytes);
    ms.page_table.unmap(vpn);
    ms.spt.mark_resident(vpn, false);
}

/// Unmap every mapping, drop every frame, destroy the supplemental page
/// table. Runs once, at process exit, with no fault in flight.
pub fn teardown(vm: &Vm, process: &Process) {
    let ids = process.memory_set().maps.ids();
    for id in ids {
        super::munmap(vm, process, id);
    }
    let mut frames = vm.frame_table().lock();
    frames.release_all(process);
    let ms = core::mem::take(&mut *process.memory_set());
    drop(frames);
    ms.spt.destroy(vm.swap());
    if let Some(file) = ms.exec_file {
        fs::close(file);
    }
    debug!("[vm] pid {} address space torn down", process.pid());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_window() {
        let sp = VirtAddr::from(USER_SPACE_END - PAGE_SIZE);
        assert!(is_stack_access(VirtAddr::from(sp.as_usize() - 4), sp));
        assert!(is_stack_access(VirtAddr::from(sp.as_usize() - 32), sp));
        assert!(!is_stack_access(VirtAddr::from(sp.as_usize() - 33), sp));
        // above sp is fine as long as it is below the top of user space
        assert!(is_stack_access(VirtAddr::from(USER_SPACE_END - 1), sp));
        assert!(!is_stack_access(VirtAddr::from(STACK_LIMIT_ADDR - 8), VirtAddr::from(STACK_LIMIT_ADDR)));
    }

    #[test]
    fn read_only_write_rejected() {
        let entry = SupplementalEntry {
            origin: PageOrigin::ZeroFill,
            resident: false,
            writable: false,
            mmap_owned: false,
        };
        let fault = PageFault {
            addr: VirtAddr::from(0x1000),
            write: true,
            user: true,
        };
        assert_eq!(check_access(&entry, fault), Err(VmError::ReadOnly(fault.addr)));
        assert!(check_access(&entry, PageFault { write: false, ..fault }).is_ok());
    }
}
