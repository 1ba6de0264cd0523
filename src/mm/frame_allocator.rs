use core::fmt::{self, Debug, Formatter};

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::MutexGuard;

use crate::config::PAGE_SIZE;
use crate::sync::SpinCell;

use super::PhysPageNum;

/// content of one physical frame
pub type PageBuf = [u8; PAGE_SIZE];

/// 物理页帧管理器 Trait
trait FrameAllocator {
    fn new() -> Self;
    fn alloc(&mut self) -> Option<PhysPageNum>;
    fn dealloc(&mut self, ppn: PhysPageNum);
}

/// an implementation for frame allocator
// 栈式物理页帧管理策略
pub struct StackFrameAllocator {
    /// 空闲内存的起始物理页号
    current: usize,
    /// 空闲内存的结束物理页号
    end: usize,
    /// 保存被回收的物理页号
    recycled: Vec<usize>,
}

impl StackFrameAllocator {
    pub fn init(&mut self, l: PhysPageNum, r: PhysPageNum) {
        self.current = l.into();
        self.end = r.into();
    }

    fn free_count(&self) -> usize {
        self.end - self.current + self.recycled.len()
    }
}

impl FrameAllocator for StackFrameAllocator {
    fn new() -> Self {
        Self {
            current: 0,
            end: 0,
            recycled: Vec::new(),
        }
    }

    fn alloc(&mut self) -> Option<PhysPageNum> {
        if let Some(ppn) = self.recycled.pop() {
            Some(ppn.into())
        } else if self.current == self.end {
            None
        } else {
            self.current += 1;
            Some((self.current - 1).into())
        }
    }

    fn dealloc(&mut self, ppn: PhysPageNum) {
        let ppn: usize = ppn.into();
        // validity check
        if ppn >= self.current || self.recycled.iter().any(|v| *v == ppn) {
            panic!("Frame ppn={:#x} has not been allocated!", ppn);
        }
        // recycle
        self.recycled.push(ppn);
    }
}

/// The user pool: every physical frame that may back a user page.
///
/// Frames are handed out as [`FrameTracker`]s and come back to the pool when
/// the tracker is dropped.
pub struct UserPool {
    allocator: SpinCell<StackFrameAllocator>,
    frames: Vec<SpinCell<Box<PageBuf>>>,
}

impl UserPool {
    pub fn new(num_frames: usize) -> Arc<Self> {
        let mut allocator = StackFrameAllocator::new();
        allocator.init(PhysPageNum::from(0), PhysPageNum::from(num_frames));
        let frames = (0..num_frames)
            .map(|_| SpinCell::new(Box::new([0u8; PAGE_SIZE])))
            .collect();
        Arc::new(Self {
            allocator: SpinCell::new(allocator),
            frames,
        })
    }

    /// allocate a frame, `None` once the pool is exhausted
    pub fn frame_alloc(self: &Arc<Self>, zeroed: bool) -> Option<FrameTracker> {
        let ppn = self.allocator.exclusive_access().alloc()?;
        let frame = FrameTracker {
            ppn,
            pool: Arc::clone(self),
        };
        if zeroed {
            frame.bytes().fill(0);
        }
        Some(frame)
    }

    fn frame_dealloc(&self, ppn: PhysPageNum) {
        self.allocator.exclusive_access().dealloc(ppn);
    }

    /// 返回一个字节数组的可变引用，可以以字节为粒度对物理页帧上的数据进行访问
    pub fn bytes(&self, ppn: PhysPageNum) -> MutexGuard<'_, Box<PageBuf>> {
        self.frames[ppn.index()].exclusive_access()
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn free_frames(&self) -> usize {
        self.allocator.exclusive_access().free_count()
    }
}

/// manage a frame which has the same lifecycle as the tracker
pub struct FrameTracker {
    pub ppn: PhysPageNum,
    pool: Arc<UserPool>,
}

impl FrameTracker {
    pub fn bytes(&self) -> MutexGuard<'_, Box<PageBuf>> {
        self.pool.bytes(self.ppn)
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        self.pool.frame_dealloc(self.ppn);
    }
}

impl Debug for FrameTracker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "FrameTracker:PPN={:#x}",
            <PhysPageNum as Into<usize>>::into(self.ppn)
        ))
    }
}
