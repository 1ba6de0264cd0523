//! Lazy executable loading
//!
//! Nothing of the executable is copied at load time. Each `PT_LOAD` segment
//! is cut into pages that are registered in the supplemental page table:
//! pages that hold file bytes read them from the executable on first touch,
//! pages past the end of the file data are plain zero-fill pages.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};
use xmas_elf::program::Type;
use xmas_elf::ElfFile;

use crate::config::{PAGE_SIZE, STACK_LIMIT_ADDR, USER_SPACE_END};
use crate::error::{VmError, VmResult};
use crate::fs::{self, File};
use crate::mm::{FileSource, PageOrigin, SupplementalPageTable, VirtAddr, VirtPageNum};

use super::Process;

const ELF_MAGIC: [u8; 4] = [0x7f, 0x45, 0x4c, 0x46];

/// one page worth of segment registration
struct SegmentPage {
    page: VirtPageNum,
    origin: PageOrigin,
    writable: bool,
}

/// Register the segments of `file` and the initial stack page in `process`,
/// which must not have an executable yet. Returns the entry point.
///
/// On error the address space is left as it was.
pub fn load_elf(process: &Process, file: &Arc<dyn File>) -> VmResult<VirtAddr> {
    let len = fs::length(file.as_ref());
    let mut data = vec![0u8; len];
    if fs::read_at(file.as_ref(), 0, &mut data) != len {
        return Err(VmError::BadExecutable);
    }
    let elf = ElfFile::new(&data).map_err(|e| {
        warn!("[loader] {}", e);
        VmError::BadExecutable
    })?;
    if elf.header.pt1.magic != ELF_MAGIC {
        return Err(VmError::BadExecutable);
    }

    let mut pages = Vec::new();
    for ph in elf.program_iter() {
        if ph.get_type() != Ok(Type::Load) {
            continue;
        }
        segment_pages(
            ph.offset() as usize,
            ph.virtual_addr() as usize,
            ph.file_size() as usize,
            ph.mem_size() as usize,
            ph.flags().is_write(),
            len,
            &mut pages,
        )?;
    }
    let stack_page = VirtAddr::from(USER_SPACE_END - PAGE_SIZE).floor();
    pages.push(SegmentPage {
        page: stack_page,
        origin: PageOrigin::ZeroFill,
        writable: true,
    });

    let mut ms = process.memory_set();
    if ms.exec_file.is_some() {
        return Err(VmError::BadExecutable);
    }
    if let Some(taken) = pages.iter().find(|p| ms.spt.is_mapped(p.page)) {
        return Err(VmError::AlreadyMapped(taken.page.base()));
    }
    // two segments sharing a page is rejected like any other overlap
    let mut spt = SupplementalPageTable::create();
    for p in pages {
        if !spt.set(p.page, p.origin, p.writable, false) {
            return Err(VmError::AlreadyMapped(p.page.base()));
        }
    }
    for (page, entry) in spt.iter() {
        ms.spt.set(*page, entry.origin, entry.writable, false);
    }
    ms.exec_file = Some(fs::reopen(file.as_ref()));
    drop(ms);
    process.set_user_sp(VirtAddr::from(USER_SPACE_END));

    let entry = VirtAddr::from(elf.header.pt2.entry_point() as usize);
    debug!(
        "[loader] pid {} loaded {} pages, entry {:?}",
        process.pid(),
        spt.len(),
        entry
    );
    Ok(entry)
}

/// Cut one segment into pages.
///
/// The first `page_offset + filesz` bytes of the segment's page span come
/// from the file; everything after is zero up to the next page boundary past
/// `memsz`.
fn segment_pages(
    offset: usize,
    vaddr: usize,
    filesz: usize,
    memsz: usize,
    writable: bool,
    file_len: usize,
    pages: &mut Vec<SegmentPage>,
) -> VmResult<()> {
    let page_offset = vaddr % PAGE_SIZE;
    if offset % PAGE_SIZE != page_offset
        || memsz < filesz
        || offset.checked_add(filesz).map_or(true, |end| end > file_len)
        // page 0 stays unmapped so null dereferences fault
        || vaddr < PAGE_SIZE
        || vaddr.checked_add(memsz).map_or(true, |end| end > STACK_LIMIT_ADDR)
    {
        return Err(VmError::BadExecutable);
    }

    let mut file_page = offset - page_offset;
    let mut read_bytes = if filesz > 0 { page_offset + filesz } else { 0 };
    let span = (page_offset + memsz).div_ceil(PAGE_SIZE) * PAGE_SIZE;
    let mut page = VirtAddr::from(vaddr - page_offset).floor();
    let mut remaining = span;
    while remaining > 0 {
        let page_read = read_bytes.min(PAGE_SIZE);
        let origin = if page_read == 0 {
            PageOrigin::ZeroFill
        } else {
            PageOrigin::FileBacked {
                offset: file_page,
                source: FileSource::Segment {
                    zero_bytes: PAGE_SIZE - page_read,
                },
            }
        };
        pages.push(SegmentPage {
            page,
            origin,
            writable,
        });
        read_bytes -= page_read;
        remaining -= PAGE_SIZE;
        file_page += PAGE_SIZE;
        page = page.offset(1);
    }
    Ok(())
}
