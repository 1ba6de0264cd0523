//! Memory management implementation
//!
//! Demand paging for user processes: every user page is described in the
//! process' supplemental page table and only gets a frame when it is first
//! touched. Frames come from a bounded [`UserPool`]; once it runs dry the
//! global [`FrameTable`] picks a victim with the clock algorithm and writes it
//! back to its file or to the [`SwapStore`].
//!
//! Everything global to the memory subsystem lives in a [`Vm`], which the
//! trap and syscall layers pass down explicitly.

mod address;
mod fault;
mod frame_allocator;
mod frame_table;
mod memory_set;
mod mmap;
mod mmu;
mod page;
mod page_table;
mod swap;

use alloc::sync::Arc;

use log::info;

pub use address::{PhysPageNum, VPNRange, VirtAddr, VirtPageNum};
pub use fault::{resolve_fault, teardown, PageFault};
pub use frame_allocator::{FrameTracker, PageBuf, UserPool};
pub use frame_table::{FrameTable, FrameTableEntry, FrameTableGuard, FrameTableStats};
pub use memory_set::MemorySet;
pub use mmap::{mmap, munmap, MapId, MapTable, Mapping};
pub use mmu::{read_user, write_user};
pub use page::{FileSource, PageOrigin, SupplementalEntry, SupplementalPageTable};
pub use page_table::{PTEFlags, PageTable, PageTableEntry};
pub use swap::{SwapSlot, SwapStore};

pub(crate) use fault::page_out;

use crate::config::VmConfig;
use crate::drivers::BlockDevice;

/// The machine-wide state of the memory subsystem.
pub struct Vm {
    pool: Arc<UserPool>,
    frame_table: FrameTable,
    swap: SwapStore,
}

impl Vm {
    /// Size the user pool and bring up swap.
    ///
    /// Panics if `swap_device` is missing or too small to hold a page.
    pub fn new(config: VmConfig, swap_device: Option<Arc<dyn BlockDevice>>) -> Self {
        let swap = SwapStore::initialize(swap_device);
        info!(
            "[vm] {} user frames, {} swap slots",
            config.user_frames,
            swap.capacity()
        );
        Self {
            pool: UserPool::new(config.user_frames),
            frame_table: FrameTable::new(),
            swap,
        }
    }

    pub fn pool(&self) -> &Arc<UserPool> {
        &self.pool
    }

    pub fn frame_table(&self) -> &FrameTable {
        &self.frame_table
    }

    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }
}
