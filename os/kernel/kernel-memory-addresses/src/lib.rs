//! # Logical and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses used by the frame
//! allocator, the page-table code and the process model.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or logical. |
//! | [`PhysicalAddress`] | A byte in physical memory: RAM frames, page tables, MMIO. |
//! | [`LogicalAddress`] | A byte in a (translated) address space. |
//!
//! The kernel manipulates frames by their physical address and touches them
//! through their logical alias. The two are never implicitly convertible; the
//! translation is an explicit, checked operation owned by the physical mapper
//! in `kernel-vmem`.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x8000_3000);
//! let la = LogicalAddress::new(0x2000_3000);
//! assert_eq!(pa.page_offset(12), 0);
//! assert_eq!((la + 0x10).as_u64(), 0x2000_3010);
//! assert!(PhysicalAddress::NULL.is_null());
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`, making them suitable as map keys or for FFI use.
//! - Bit-field extraction is shift/width based because the field layout is a
//!   property of the translation scheme, not of the address.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod logical_address;
mod memory_address;
mod physical_address;

pub use crate::logical_address::LogicalAddress;
pub use crate::memory_address::MemoryAddress;
pub use crate::physical_address::PhysicalAddress;

/// Align `x` down to the nearest multiple of the power of two `a`.
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of the power of two `a`.
///
/// `x + (a - 1)` must not overflow.
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> u64 {
    (x + a - 1) & !(a - 1)
}

/// Number of `1 << shift` sized units needed to cover `bytes`.
///
/// ```rust
/// # use kernel_memory_addresses::units;
/// assert_eq!(units(0, 12), 0);
/// assert_eq!(units(1, 12), 1);
/// assert_eq!(units(4096, 12), 1);
/// assert_eq!(units(4097, 12), 2);
/// ```
#[inline(always)]
#[must_use]
pub const fn units(bytes: u64, shift: u32) -> u64 {
    bytes.div_ceil(1 << shift)
}
