//! # Address Translators
//!
//! An [`AddressTranslator`] describes one MMU format: how a logical address
//! splits into table indices and how neutral [`PageFlags`] pack into native
//! entries. Everything above this layer ([`PageTable`](crate::PageTable),
//! [`Chunk`](crate::Chunk), [`Directory`](crate::Directory)) is generic over
//! it and never looks at native bits.
//!
//! ## Logical address layout
//!
//! ```text
//!  ┌──────────────┬──────────────┬──────────────┬──────────────┐
//!  │   PD index   │ [AT index]   │   PT index   │    offset    │
//!  └──────────────┴──────────────┴──────────────┴──────────────┘
//!     PD_BITS        AT_BITS        PT_BITS        OFFSET_BITS
//!    PD_SHIFT       AT_SHIFT       PT_SHIFT            0
//! ```
//!
//! Two-level formats set `AT_BITS = 0`; the directory then points straight
//! at leaf page tables. Three-level formats insert "attacher" tables (AT)
//! between the directory and the leaves.

use crate::flags::PageFlags;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress, units};

/// Storage width of one native table entry.
pub trait RawEntry: Copy + Default + Eq + 'static {
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl RawEntry for u32 {
    #[inline]
    fn to_bits(self) -> u64 {
        u64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn from_bits(bits: u64) -> Self {
        debug_assert!(bits <= u64::from(Self::MAX));
        bits as Self
    }
}

impl RawEntry for u64 {
    #[inline]
    fn to_bits(self) -> u64 {
        self
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits
    }
}

/// One MMU translation format.
///
/// Entries travel as `u64` through this interface regardless of
/// [`Entry`](Self::Entry); the table code narrows them on store.
pub trait AddressTranslator: 'static {
    /// Human readable name, used in traces.
    const NAME: &'static str;

    const OFFSET_BITS: u32;
    const PT_BITS: u32;
    /// Attacher (intermediate) level bits; `0` for two-level formats.
    const AT_BITS: u32;
    const PD_BITS: u32;

    /// `false` for MMU-less targets: no tables, logical equals physical.
    const PAGING: bool = true;

    /// Required alignment of the page directory.
    const PD_ALIGN: u64 = 1 << Self::OFFSET_BITS;

    /// Native entry storage.
    type Entry: RawEntry;

    const PAGE_SIZE: u64 = 1 << Self::OFFSET_BITS;
    const PT_ENTRIES: u64 = 1 << Self::PT_BITS;
    const AT_ENTRIES: u64 = 1 << Self::AT_BITS;
    const PD_ENTRIES: u64 = 1 << Self::PD_BITS;

    const PT_SHIFT: u32 = Self::OFFSET_BITS;
    const AT_SHIFT: u32 = Self::PT_SHIFT + Self::PT_BITS;
    const PD_SHIFT: u32 = Self::AT_SHIFT + Self::AT_BITS;

    const ENTRY_SIZE: u64 = core::mem::size_of::<Self::Entry>() as u64;
    const PT_SIZE: u64 = Self::PT_ENTRIES * Self::ENTRY_SIZE;
    const AT_SIZE: u64 = Self::AT_ENTRIES * Self::ENTRY_SIZE;
    const PD_SIZE: u64 = Self::PD_ENTRIES * Self::ENTRY_SIZE;

    /// Leaf entry mapping `frame` with `flags`.
    fn pte(frame: PhysicalAddress, flags: PageFlags) -> u64;

    /// Frame a leaf entry points at; flag bits masked off.
    fn pte_frame(entry: u64) -> PhysicalAddress;

    /// Neutral flags decoded from a leaf entry.
    fn pte_flags(entry: u64) -> PageFlags;

    #[inline]
    fn pte_present(entry: u64) -> bool {
        Self::pte_flags(entry).contains(PageFlags::PRESENT)
    }

    /// Non-leaf entry pointing at the next-level table at `table`.
    fn table_entry(table: PhysicalAddress) -> u64;

    /// Table a non-leaf entry points at.
    fn table_address(entry: u64) -> PhysicalAddress;

    fn table_present(entry: u64) -> bool;

    /// The flags that survive a trip through a native entry.
    #[inline]
    fn normalize(flags: PageFlags) -> PageFlags {
        Self::pte_flags(Self::pte(PhysicalAddress::NULL, flags))
    }

    /// Pages needed to hold `bytes`.
    #[inline]
    fn pages(bytes: u64) -> u64 {
        units(bytes, Self::OFFSET_BITS)
    }

    /// Leaf tables needed to map `pages`.
    #[inline]
    fn pts(pages: u64) -> u64 {
        pages.div_ceil(Self::PT_ENTRIES)
    }

    /// Attacher tables needed to link `pts` leaf tables; `0` on two-level formats.
    #[inline]
    fn ats(pts: u64) -> u64 {
        if Self::AT_BITS == 0 {
            0
        } else {
            pts.div_ceil(Self::AT_ENTRIES)
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn pdi(la: LogicalAddress) -> usize {
        la.field(Self::PD_SHIFT, Self::PD_BITS) as usize
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn ati(la: LogicalAddress) -> usize {
        la.field(Self::AT_SHIFT, Self::AT_BITS) as usize
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn pti(la: LogicalAddress) -> usize {
        la.field(Self::PT_SHIFT, Self::PT_BITS) as usize
    }

    #[inline]
    fn off(la: LogicalAddress) -> u64 {
        la.field(0, Self::OFFSET_BITS)
    }

    /// Logical base of directory slot `slot`.
    #[inline]
    fn slot_address(slot: usize) -> LogicalAddress {
        LogicalAddress::new((slot as u64) << Self::PD_SHIFT)
    }
}
