//! # RISC-V Sv39
//!
//! Three levels of 512 entries each over 4 KiB pages: a 1 GiB root slot
//! (directory), a 2 MiB attacher slot and a 4 KiB leaf.

use crate::flags::PageFlags;
use crate::translator::AddressTranslator;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A single Sv39 page table entry.
///
/// | Bits   | Name   | Meaning |
/// |--------|--------|---------|
/// | 0      | `V`    | Valid |
/// | 1      | `R`    | Readable |
/// | 2      | `W`    | Writable |
/// | 3      | `X`    | Executable |
/// | 4      | `U`    | User accessible |
/// | 5      | `G`    | Global mapping |
/// | 6      | `A`    | Accessed |
/// | 7      | `D`    | Dirty |
/// | 8..=9  | `RSW`  | Reserved for software; used for `CONTIGUOUS` and `IO` |
/// | 10..=53| `PPN`  | Physical page number |
/// | 54..=63| -      | Reserved, must be zero |
///
/// An entry with `V` set and `R`, `W`, `X` all clear points at the next
/// level table; anything else is a leaf.
///
/// ```rust
/// # use kernel_vmem::arch::sv39::Sv39Entry;
/// let e = Sv39Entry::new().with_v(true).with_ppn(0x8_0000);
/// assert!(e.is_table());
/// assert_eq!(e.frame(), 0x8000_0000);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Sv39Entry {
    pub v: bool,
    pub r: bool,
    pub w: bool,
    pub x: bool,
    pub u: bool,
    pub g: bool,
    /// Pre-set on every leaf so the hardware never faults to update it.
    pub a: bool,
    /// Pre-set on every leaf, see `a`.
    pub d: bool,
    /// RSW bit 8: frame belongs to a physically contiguous run.
    pub contiguous: bool,
    /// RSW bit 9: device memory.
    pub io: bool,
    #[bits(44)]
    pub ppn: u64,
    #[bits(10)]
    __: u16,
}

impl Sv39Entry {
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.ppn() << Sv39::OFFSET_BITS
    }

    #[inline]
    #[must_use]
    pub const fn is_table(&self) -> bool {
        self.v() && !self.r() && !self.w() && !self.x()
    }
}

/// RISC-V Sv39 translation.
pub enum Sv39 {}

impl AddressTranslator for Sv39 {
    const NAME: &'static str = "Sv39";
    const OFFSET_BITS: u32 = 12;
    const PT_BITS: u32 = 9;
    const AT_BITS: u32 = 9;
    const PD_BITS: u32 = 9;

    type Entry = u64;

    fn pte(frame: PhysicalAddress, flags: PageFlags) -> u64 {
        let present = flags.contains(PageFlags::PRESENT);
        Sv39Entry::new()
            .with_v(present)
            // W without R is reserved; writable pages are always readable.
            .with_r(present && flags.intersects(PageFlags::READ | PageFlags::WRITE))
            .with_w(present && flags.contains(PageFlags::WRITE))
            .with_x(present && flags.contains(PageFlags::EXEC))
            .with_u(flags.contains(PageFlags::USER))
            .with_g(present && !flags.contains(PageFlags::USER))
            .with_a(present)
            .with_d(present)
            .with_contiguous(flags.contains(PageFlags::CONTIGUOUS))
            .with_io(flags.contains(PageFlags::IO))
            .with_ppn(frame.as_u64() >> Self::OFFSET_BITS)
            .into_bits()
    }

    fn pte_frame(entry: u64) -> PhysicalAddress {
        PhysicalAddress::new(Sv39Entry::from_bits(entry).frame())
    }

    fn pte_flags(entry: u64) -> PageFlags {
        let e = Sv39Entry::from_bits(entry);
        let mut flags = PageFlags::empty();
        flags.set(PageFlags::PRESENT, e.v());
        flags.set(PageFlags::READ, e.r());
        flags.set(PageFlags::WRITE, e.w());
        flags.set(PageFlags::EXEC, e.x());
        flags.set(PageFlags::USER, e.u());
        flags.set(PageFlags::CONTIGUOUS, e.contiguous());
        flags.set(PageFlags::IO, e.io());
        flags
    }

    fn table_entry(table: PhysicalAddress) -> u64 {
        Sv39Entry::new()
            .with_v(true)
            .with_ppn(table.as_u64() >> Self::OFFSET_BITS)
            .into_bits()
    }

    fn table_address(entry: u64) -> PhysicalAddress {
        PhysicalAddress::new(Sv39Entry::from_bits(entry).frame())
    }

    fn table_present(entry: u64) -> bool {
        Sv39Entry::from_bits(entry).is_table()
    }
}
