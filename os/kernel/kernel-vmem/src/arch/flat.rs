//! # Flat (no MMU)
//!
//! Targets without address translation. There are no tables: a chunk is a
//! single run of 16 byte allocation units and its logical address is its
//! physical address.

use crate::flags::PageFlags;
use crate::translator::AddressTranslator;
use kernel_memory_addresses::PhysicalAddress;

pub enum Flat {}

impl AddressTranslator for Flat {
    const NAME: &'static str = "flat";
    const OFFSET_BITS: u32 = 4;
    const PT_BITS: u32 = 0;
    const AT_BITS: u32 = 0;
    const PD_BITS: u32 = 0;
    const PAGING: bool = false;

    type Entry = u64;

    fn pte(frame: PhysicalAddress, _flags: PageFlags) -> u64 {
        frame.as_u64()
    }

    fn pte_frame(entry: u64) -> PhysicalAddress {
        PhysicalAddress::new(entry)
    }

    fn pte_flags(_entry: u64) -> PageFlags {
        PageFlags::empty()
    }

    fn table_entry(table: PhysicalAddress) -> u64 {
        table.as_u64()
    }

    fn table_address(entry: u64) -> PhysicalAddress {
        PhysicalAddress::new(entry)
    }

    fn table_present(_entry: u64) -> bool {
        false
    }

    /// Nothing is encoded, so nothing is lost.
    fn normalize(flags: PageFlags) -> PageFlags {
        flags
    }

    fn pts(_pages: u64) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_granular_units() {
        assert_eq!(Flat::PAGE_SIZE, 16);
        assert_eq!(Flat::pages(1024), 64);
        assert_eq!(Flat::pages(1), 1);
        assert_eq!(Flat::pts(64), 0);
        assert_eq!(Flat::ats(0), 0);
        assert_eq!(Flat::normalize(PageFlags::MMIO), PageFlags::MMIO);
    }
}
