//! # void_memory - Frame Memory
//!
//! Per-frame storage helpers for the render batching engine:
//! - TransientAllocator: lock-free offset reservation, bulk reset per frame

#![cfg_attr(not(feature = "std"), no_std)]

pub mod transient;

pub use transient::{TransientAllocator, TransientRange};

/// Align a value up to the given alignment
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Align a value down to the given alignment
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

pub mod prelude {
    pub use crate::{TransientAllocator, TransientRange};
    pub use crate::{align_up, align_down};
}
