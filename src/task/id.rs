//! Small-integer id allocation
//!
//! Kernel tables indexed by small ids (process ids, file descriptors,
//! mapping ids) hand out the lowest free id and fail once the table is full.

use alloc::vec::Vec;

use lazy_static::*;

use crate::sync::SpinCell;

/// Bounded arena mapping ids in `[first, capacity)` to entries.
pub struct IdTable<T> {
    first: usize,
    slots: Vec<Option<T>>,
}

impl<T> IdTable<T> {
    pub fn new(first: usize, capacity: usize) -> Self {
        assert!(first <= capacity);
        Self {
            first,
            slots: (first..capacity).map(|_| None).collect(),
        }
    }

    /// store `value` under the lowest free id, `None` when full
    pub fn insert(&mut self, value: T) -> Option<usize> {
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(value);
        Some(self.first + idx)
    }

    fn index(&self, id: usize) -> Option<usize> {
        id.checked_sub(self.first).filter(|idx| *idx < self.slots.len())
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        self.index(id).and_then(|idx| self.slots[idx].as_ref())
    }

    pub fn remove(&mut self, id: usize) -> Option<T> {
        self.index(id).and_then(|idx| self.slots[idx].take())
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// ids currently in use, ascending
    pub fn ids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(idx, _)| self.first + idx)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RecycleAllocator {
    current: usize,
    recycled: Vec<usize>,
}

impl RecycleAllocator {
    fn new() -> Self {
        RecycleAllocator {
            current: 0,
            recycled: Vec::new(),
        }
    }

    fn alloc(&mut self) -> usize {
        if let Some(id) = self.recycled.pop() {
            id
        } else {
            self.current += 1;
            self.current - 1
        }
    }

    fn dealloc(&mut self, id: usize) {
        assert!(id < self.current);
        assert!(
            !self.recycled.iter().any(|i| *i == id),
            "id {} has been deallocated!",
            id
        );
        self.recycled.push(id);
    }
}

lazy_static! {
    static ref PID_ALLOCATOR: SpinCell<RecycleAllocator> = SpinCell::new(RecycleAllocator::new());
}

/// process id, returned to the allocator on drop
#[derive(Debug)]
pub struct PidHandle(pub usize);

impl Drop for PidHandle {
    fn drop(&mut self) {
        PID_ALLOCATOR.exclusive_access().dealloc(self.0);
    }
}

pub fn pid_alloc() -> PidHandle {
    PidHandle(PID_ALLOCATOR.exclusive_access().alloc())
}
