//! User memory access through the software page table
//!
//! Kernel code never touches user frames directly: loads and stores go
//! through [`read_user`] and [`write_user`], which walk the process' page
//! table the way the hardware walker does. An absent mapping raises a page
//! fault, a present one gets its `A` bit (and `D` on a store) set.
//!
//! Only the address-space lock is held while copying, so a frame cannot be
//! evicted out from under a copy in progress.

use alloc::sync::Arc;

use crate::config::PAGE_SIZE;
use crate::error::{VmError, VmResult};
use crate::task::Process;

use super::frame_allocator::PageBuf;
use super::{resolve_fault, PageFault, VirtAddr, Vm};

/// Copy `buf.len()` bytes of user memory at `va` into `buf`.
pub fn read_user(vm: &Vm, process: &Arc<Process>, va: VirtAddr, buf: &mut [u8]) -> VmResult<()> {
    let mut done = 0;
    while done < buf.len() {
        let addr = VirtAddr::from(va.as_usize() + done);
        let start = addr.page_offset();
        let n = (PAGE_SIZE - start).min(buf.len() - done);
        let dst = &mut buf[done..done + n];
        access(vm, process, addr, false, |page| {
            dst.copy_from_slice(&page[start..start + n])
        })?;
        done += n;
    }
    Ok(())
}

/// Copy `buf` into user memory at `va`.
pub fn write_user(vm: &Vm, process: &Arc<Process>, va: VirtAddr, buf: &[u8]) -> VmResult<()> {
    let mut done = 0;
    while done < buf.len() {
        let addr = VirtAddr::from(va.as_usize() + done);
        let start = addr.page_offset();
        let n = (PAGE_SIZE - start).min(buf.len() - done);
        let src = &buf[done..done + n];
        access(vm, process, addr, true, |page| {
            page[start..start + n].copy_from_slice(src)
        })?;
        done += n;
    }
    Ok(())
}

/// Run `f` on the frame behind `addr`, faulting the page in first if needed.
fn access<F>(vm: &Vm, process: &Arc<Process>, addr: VirtAddr, write: bool, mut f: F) -> VmResult<()>
where
    F: FnMut(&mut PageBuf),
{
    // the table walk only looks at the low 27 bits of the page number
    if !addr.is_user() {
        return Err(VmError::KernelAddress(addr));
    }
    let vpn = addr.floor();
    loop {
        {
            let mut ms = process.memory_set();
            if let Some(pte) = ms.page_table.translate(vpn) {
                if write && !pte.writable() {
                    return Err(VmError::ReadOnly(addr));
                }
                ms.page_table.set_accessed(vpn, true);
                if write {
                    ms.page_table.set_dirty(vpn, true);
                }
                f(&mut vm.pool().bytes(pte.ppn()));
                return Ok(());
            }
        }
        // the page may be evicted again before the retry; just fault once more
        resolve_fault(
            vm,
            process,
            PageFault {
                addr,
                write,
                user: true,
            },
        )?;
    }
}
