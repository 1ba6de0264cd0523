//! Synchronization primitives

mod cell;

pub use cell::SpinCell;
