//! Errors reported by the memory subsystem
//!
//! Only process-fatal and request-level failures are represented here.
//! Conditions that leave the kernel unable to keep its memory guarantees
//! (swap exhaustion, a lost dirty page) panic instead.

use thiserror::Error;

use crate::mm::{MapId, VirtAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmError {
    /// fault on a page the process never registered
    #[error("access to unmapped address {0:?}")]
    Unmapped(VirtAddr),
    /// store to a page registered read-only
    #[error("write to read-only address {0:?}")]
    ReadOnly(VirtAddr),
    /// fault on an address outside of user space
    #[error("address {0:?} is not a user address")]
    KernelAddress(VirtAddr),
    /// page already has a live supplemental entry
    #[error("page at {0:?} is already registered")]
    AlreadyMapped(VirtAddr),
    #[error("mapping at the null address")]
    NullAddress,
    #[error("address {0:?} is not page aligned")]
    Misaligned(VirtAddr),
    /// mapping would leave user space or run into the stack region
    #[error("mapping at {0:?} leaves the mappable range")]
    OutOfRange(VirtAddr),
    #[error("cannot map an empty file")]
    EmptyFile,
    /// mapping collides with a page that is already registered
    #[error("mapping overlaps page {0:?}")]
    Overlap(VirtAddr),
    #[error("bad file descriptor {0}")]
    BadDescriptor(usize),
    #[error("descriptor table is full")]
    FileTableFull,
    #[error("memory map table is full")]
    MapTableFull,
    #[error("no mapping with id {0:?}")]
    UnknownMapping(MapId),
    #[error("malformed executable")]
    BadExecutable,
}

pub type VmResult<T> = Result<T, VmError>;
