//! Constants used in the virtual memory core

pub const PAGE_SIZE: usize = 0x1000;
pub const PAGE_SIZE_BITS: usize = 0xc;

/// disk sector size of the swap device
pub const SECTOR_SIZE: usize = 512;
/// one swap slot holds exactly one page
pub const SECTORS_PER_SLOT: usize = PAGE_SIZE / SECTOR_SIZE;

/// first address above user space (the lower half of SV39)
pub const USER_SPACE_END: usize = 0x40_0000_0000;
/// maximum size of the user stack
pub const STACK_LIMIT: usize = 8 * 1024 * 1024;
/// lowest address the user stack may grow down to
pub const STACK_LIMIT_ADDR: usize = USER_SPACE_END - STACK_LIMIT;
/// how far below `sp` an access may land and still count as a stack push (`pusha`)
pub const STACK_PUSH_WINDOW: usize = 32;

/// ids 0 and 1 are reserved, like the console descriptors
pub const FIRST_MAP_ID: usize = 2;
pub const MAX_MAPPINGS: usize = 128;
pub const FIRST_FD: usize = 2;
pub const MAX_FILES: usize = 128;

/// Boot-time sizing of the memory subsystem.
#[derive(Debug, Clone, Copy)]
pub struct VmConfig {
    /// number of physical frames in the user pool
    pub user_frames: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self { user_frames: 256 }
    }
}
