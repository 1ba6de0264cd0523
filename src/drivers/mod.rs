//! Device drivers consumed by the memory subsystem

pub mod block;

pub use block::{BlockDevice, RamDisk};
