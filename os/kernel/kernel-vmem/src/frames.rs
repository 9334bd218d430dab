//! # Physical frame collaborators
//!
//! The MMU core never owns physical memory bookkeeping. It asks a
//! [`FrameAlloc`] for frames and a [`PhysMapper`] for a CPU-usable alias of
//! them; `kernel-alloc` provides both.

use core::fmt;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use log::warn;

/// A cache color, or [`WHITE`](Color::WHITE) for the uncolored pool.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Color(u8);

impl Color {
    /// The uncolored pool. Page tables and directories always come from here.
    pub const WHITE: Self = Self(u8::MAX);

    #[must_use]
    pub const fn new(index: u8) -> Self {
        assert!(index != u8::MAX, "color index collides with WHITE");
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub const fn is_white(self) -> bool {
        self.0 == u8::MAX
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_white() {
            f.write_str("WHITE")
        } else {
            write!(f, "Color({})", self.0)
        }
    }
}

/// Physical frame allocator.
///
/// Counts are in allocation units (frames, or 16 byte units on flat
/// targets). Implementations serialize internally, hence `&self`.
pub trait FrameAlloc {
    /// Allocate `count` physically contiguous units of `color`, or `None`
    /// without complaint. For callers with a fallback.
    ///
    /// `count == 0` yields `None` without touching any list.
    fn try_alloc(&self, count: u64, color: Color) -> Option<PhysicalAddress>;

    /// [`try_alloc`](Self::try_alloc), logging exhaustion.
    fn alloc(&self, count: u64, color: Color) -> Option<PhysicalAddress> {
        let pa = self.try_alloc(count, color);
        if pa.is_none() && count > 0 {
            warn!("FrameAlloc::alloc: out of memory ({count} units of {color:?})");
        }
        pa
    }

    /// Take exactly the `count` units starting at `base`, if all of them are
    /// free in `color`.
    fn alloc_at(&self, base: PhysicalAddress, count: u64, color: Color) -> bool;

    /// [`alloc`](Self::alloc), zero-filled.
    fn calloc(&self, count: u64, color: Color) -> Option<PhysicalAddress>;

    /// Return `count` units starting at `base` to the list(s) of their color.
    fn free(&self, base: PhysicalAddress, count: u64);

    /// Return `count` units starting at `base` to the uncolored pool.
    fn white_free(&self, base: PhysicalAddress, count: u64);

    /// Free units of `color`.
    fn allocable(&self, color: Color) -> u64;

    /// The color `frame` belongs to.
    fn color_of(&self, frame: PhysicalAddress) -> Color;
}

/// Physical to logical translation for kernel access to frames.
///
/// # Safety
/// Every logical address handed out must alias the physical address it was
/// derived from, be valid for reads and writes, and stay valid for the
/// lifetime of the mapper.
pub unsafe trait PhysMapper {
    fn phy_to_log(&self, pa: PhysicalAddress) -> Option<LogicalAddress>;
    fn log_to_phy(&self, la: LogicalAddress) -> Option<PhysicalAddress>;
}
