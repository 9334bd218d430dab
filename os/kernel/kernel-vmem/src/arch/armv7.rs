//! # ARMv7-A short descriptors
//!
//! Two levels: a 4096-entry first-level table of 1 MiB sections (16 KiB,
//! 16 KiB aligned) pointing at 256-entry coarse tables (1 KiB) of 4 KiB
//! small pages. Access permissions use the `AP[2:0]` model with `AP[0]`
//! always set (access flag disabled), memory types use `TEX`/`C`/`B`
//! with TEX remapping disabled.

use crate::flags::PageFlags;
use crate::translator::AddressTranslator;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// Second-level small page descriptor.
///
/// | Bits    | Name      | Meaning |
/// |---------|-----------|---------|
/// | 0       | `XN`      | Execute never |
/// | 1       | -         | Small page marker, always `1` |
/// | 2       | `B`       | Bufferable |
/// | 3       | `C`       | Cacheable |
/// | 4..=5   | `AP[1:0]` | Access permissions |
/// | 6..=8   | `TEX`     | Type extension |
/// | 9       | `AP[2]`   | Read-only when set |
/// | 10      | `S`       | Shareable |
/// | 11      | `nG`      | Not global (ASID tagged) |
/// | 12..=31 | base      | Frame address bits `[31:12]` |
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct SmallPage {
    pub xn: bool,
    pub small_page: bool,
    pub b: bool,
    pub c: bool,
    pub ap0: bool,
    pub ap1: bool,
    #[bits(3)]
    pub tex: u8,
    pub ap2: bool,
    pub s: bool,
    pub ng: bool,
    #[bits(20)]
    pub base: u32,
}

/// First-level descriptor pointing at a coarse (second-level) table.
///
/// | Bits    | Name     | Meaning |
/// |---------|----------|---------|
/// | 0..=1   | type     | `0b01` |
/// | 2       | `PXN`    | Privileged execute never |
/// | 3       | `NS`     | Non-secure |
/// | 4       | -        | Should be zero |
/// | 5..=8   | domain   | Domain number |
/// | 9       | -        | Implementation defined |
/// | 10..=31 | base     | Table address bits `[31:10]` |
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct CoarseTable {
    #[bits(2)]
    pub kind: u8,
    pub pxn: bool,
    pub ns: bool,
    sbz: bool,
    #[bits(4)]
    pub domain: u8,
    imp: bool,
    #[bits(22)]
    pub base: u32,
}

const COARSE: u8 = 0b01;

/// Memory attributes `(TEX, C, B)`.
const NORMAL_WB: (u8, bool, bool) = (0b001, true, true);
const NORMAL_NC: (u8, bool, bool) = (0b001, false, false);
const NORMAL_WT: (u8, bool, bool) = (0b000, true, false);
const DEVICE: (u8, bool, bool) = (0b000, false, true);

/// ARMv7-A short-descriptor translation.
pub enum Armv7 {}

impl AddressTranslator for Armv7 {
    const NAME: &'static str = "ARMv7";
    const OFFSET_BITS: u32 = 12;
    const PT_BITS: u32 = 8;
    const AT_BITS: u32 = 0;
    const PD_BITS: u32 = 12;
    const PD_ALIGN: u64 = 16 * 1024;

    type Entry = u32;

    #[allow(clippy::cast_possible_truncation)]
    fn pte(frame: PhysicalAddress, flags: PageFlags) -> u64 {
        if !flags.contains(PageFlags::PRESENT) {
            return 0;
        }
        let io = flags.contains(PageFlags::IO);
        let (tex, c, b) = if io {
            DEVICE
        } else if flags.contains(PageFlags::CACHE_DISABLE) {
            NORMAL_NC
        } else if flags.contains(PageFlags::WRITE_THROUGH) {
            NORMAL_WT
        } else {
            NORMAL_WB
        };
        let user = flags.contains(PageFlags::USER);
        u64::from(
            SmallPage::new()
                .with_small_page(true)
                .with_xn(!flags.contains(PageFlags::EXEC))
                .with_ap0(true)
                .with_ap1(user)
                .with_ap2(!flags.contains(PageFlags::WRITE))
                .with_tex(tex)
                .with_c(c)
                .with_b(b)
                .with_s(!io)
                .with_ng(user)
                .with_base((frame.as_u64() >> Self::OFFSET_BITS) as u32)
                .into_bits(),
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pte_frame(entry: u64) -> PhysicalAddress {
        let e = SmallPage::from_bits(entry as u32);
        PhysicalAddress::new(u64::from(e.base()) << Self::OFFSET_BITS)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pte_flags(entry: u64) -> PageFlags {
        let e = SmallPage::from_bits(entry as u32);
        if !e.small_page() {
            return PageFlags::empty();
        }
        let mut flags = PageFlags::PRESENT | PageFlags::READ;
        flags.set(PageFlags::WRITE, !e.ap2());
        flags.set(PageFlags::USER, e.ap1());
        flags.set(PageFlags::EXEC, !e.xn());
        match (e.tex(), e.c(), e.b()) {
            t if t == DEVICE => flags |= PageFlags::IO | PageFlags::CACHE_DISABLE,
            t if t == NORMAL_NC => flags |= PageFlags::CACHE_DISABLE,
            t if t == NORMAL_WT => flags |= PageFlags::WRITE_THROUGH,
            _ => {}
        }
        flags
    }

    #[allow(clippy::cast_possible_truncation)]
    fn table_entry(table: PhysicalAddress) -> u64 {
        debug_assert!(table.is_aligned(Self::PT_SIZE));
        u64::from(
            CoarseTable::new()
                .with_kind(COARSE)
                .with_base((table.as_u64() >> 10) as u32)
                .into_bits(),
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    fn table_address(entry: u64) -> PhysicalAddress {
        PhysicalAddress::new(u64::from(CoarseTable::from_bits(entry as u32).base()) << 10)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn table_present(entry: u64) -> bool {
        CoarseTable::from_bits(entry as u32).kind() == COARSE
    }
}
