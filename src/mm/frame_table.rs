//! Frame table
//!
//! Global registry of every frame that currently backs a user page, kept in
//! allocation order as the ring the clock hand sweeps. One lock covers every
//! insertion, scan, eviction and release, swap and file I/O of an eviction
//! included, so evictions never overlap each other or a process exit.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, trace};
use spin::MutexGuard;

use crate::sync::SpinCell;
use crate::task::Process;

use super::frame_allocator::{FrameTracker, UserPool};
use super::swap::SwapStore;
use super::VirtPageNum;

pub struct FrameTableEntry {
    owner: Arc<Process>,
    page: VirtPageNum,
    frame: FrameTracker,
}

impl FrameTableEntry {
    pub fn owner(&self) -> &Arc<Process> {
        &self.owner
    }

    pub fn page(&self) -> VirtPageNum {
        self.page
    }

    pub fn frame(&self) -> &FrameTracker {
        &self.frame
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameTableStats {
    /// frames reclaimed from their owner so far
    pub evictions: usize,
    /// clock steps taken by the most recent victim selection
    pub last_scan_steps: usize,
}

pub struct FrameTable {
    queue: SpinCell<VecDeque<FrameTableEntry>>,
    evictions: AtomicUsize,
    last_scan_steps: AtomicUsize,
}

/// The frame table, locked.
pub struct FrameTableGuard<'a> {
    table: &'a FrameTable,
    queue: MutexGuard<'a, VecDeque<FrameTableEntry>>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self {
            queue: SpinCell::new(VecDeque::new()),
            evictions: AtomicUsize::new(0),
            last_scan_steps: AtomicUsize::new(0),
        }
    }

    pub fn lock(&self) -> FrameTableGuard<'_> {
        FrameTableGuard {
            table: self,
            queue: self.queue.exclusive_access(),
        }
    }

    /// Drop every frame owned by `owner`; the content is discarded.
    pub fn release_all(&self, owner: &Process) {
        self.lock().release_all(owner);
    }

    pub fn stats(&self) -> FrameTableStats {
        FrameTableStats {
            evictions: self.evictions.load(Ordering::Relaxed),
            last_scan_steps: self.last_scan_steps.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.exclusive_access().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FrameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTableGuard<'_> {
    /// Register a populated frame at the most recently used end of the ring.
    pub fn record(&mut self, owner: &Arc<Process>, page: VirtPageNum, frame: FrameTracker) {
        trace!("[frame] pid {} {:?} -> {:?}", owner.pid(), page, frame);
        self.queue.push_back(FrameTableEntry {
            owner: Arc::clone(owner),
            page,
            frame,
        });
    }

    /// A frame for a new page: from the free pool, or else taken from the
    /// clock's victim after writing its page back.
    pub fn obtain_frame(&mut self, pool: &Arc<UserPool>, swap: &SwapStore, zeroed: bool) -> FrameTracker {
        if let Some(frame) = pool.frame_alloc(zeroed) {
            return frame;
        }
        let victim = self.select_victim();
        debug!(
            "[frame] evicting pid {} {:?} from {:?}",
            victim.owner.pid(),
            victim.page,
            victim.frame
        );
        victim.owner.evict_page(victim.page, &victim.frame, swap);
        self.table.evictions.fetch_add(1, Ordering::Relaxed);
        let frame = victim.frame;
        if zeroed {
            frame.bytes().fill(0);
        }
        frame
    }

    /// Second-chance sweep from the oldest entry.
    ///
    /// An entry whose page was accessed loses the accessed bit and goes to
    /// the back of the ring. After one full turn every bit is clear, so the
    /// sweep ends within `2 * len` steps.
    fn select_victim(&mut self) -> FrameTableEntry {
        let limit = 2 * self.queue.len();
        for step in 1..=limit {
            let entry = match self.queue.pop_front() {
                Some(entry) => entry,
                None => break,
            };
            if !entry.owner.test_and_clear_accessed(entry.page) {
                self.table.last_scan_steps.store(step, Ordering::Relaxed);
                return entry;
            }
            self.queue.push_back(entry);
        }
        error!(
            "[frame] no victim among {} frames, user pool exhausted",
            self.queue.len()
        );
        panic!("out of user frames");
    }

    /// Remove the entry for `page` of process `pid` and hand its frame back.
    ///
    /// The caller holds the owner's address space and clears the mapping.
    pub fn forget(&mut self, pid: usize, page: VirtPageNum) -> FrameTracker {
        let idx = self
            .queue
            .iter()
            .position(|e| e.owner.pid() == pid && e.page == page)
            .unwrap_or_else(|| panic!("pid {} {:?} has no frame", pid, page));
        match self.queue.remove(idx) {
            Some(entry) => entry.frame,
            None => unreachable!(),
        }
    }

    pub fn release_all(&mut self, owner: &Process) {
        let before = self.queue.len();
        self.queue.retain(|e| e.owner.pid() != owner.pid());
        debug!(
            "[frame] released {} frames of pid {}",
            before - self.queue.len(),
            owner.pid()
        );
    }

    pub fn entries(&self) -> impl Iterator<Item = &FrameTableEntry> {
        self.queue.iter()
    }
}
