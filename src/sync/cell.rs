use spin::{Mutex, MutexGuard};

/// Lock-guarded interior mutability for kernel registries.
///
/// Unlike a uniprocessor cell this is safe to touch from several harts at
/// once: `exclusive_access` spins until the previous borrow is released.
/// Holding two cells at the same time must follow the frame table →
/// address space order, otherwise eviction can deadlock.
pub struct SpinCell<T> {
    inner: Mutex<T>,
}

impl<T> SpinCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Exclusive access inner data in SpinCell. Spin if the data has been borrowed.
    pub fn exclusive_access(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}
