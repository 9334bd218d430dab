//! # Memory Layout
//!
//! Per-machine physical and logical memory maps. A [`MemoryMap`] is plain
//! data; the MMU core derives its application window and the physical
//! memory alias from it.

/// Physical and logical layout of one machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMap {
    /// First byte of physical RAM.
    pub ram_base: u64,
    /// Size of physical RAM in bytes.
    pub ram_size: u64,
    /// Logical address under which all of physical RAM is aliased (`PHY_MEM`).
    ///
    /// The kernel touches frames at `phy_mem + (pa - ram_base)`; when equal to
    /// `ram_base` the alias is an identity map.
    pub phy_mem: u64,
    /// First logical byte available to applications.
    pub app_low: u64,
    /// One past the last logical byte available to applications.
    pub app_high: u64,
    /// Default logical base of application code.
    pub app_code: u64,
    /// Default logical base of application data.
    pub app_data: u64,
    /// Logical base of the supervisor (system) region.
    pub sys: u64,
}

impl MemoryMap {
    /// One past the last byte of physical RAM.
    #[must_use]
    pub const fn ram_top(&self) -> u64 {
        self.ram_base + self.ram_size
    }

    /// Offset to add to a physical RAM address to reach its logical alias.
    #[must_use]
    pub const fn phy_to_log_offset(&self) -> u64 {
        self.phy_mem.wrapping_sub(self.ram_base)
    }

    #[must_use]
    pub const fn is_app(&self, logical: u64) -> bool {
        logical >= self.app_low && logical < self.app_high
    }
}

/// Size of one Sv39 root table slot.
const GIB: u64 = 1 << 30;

/// SiFive-U (RISC-V, Sv39): 128 MiB of RAM at 2 GiB.
///
/// The application window starts at 64 GiB and covers 128 root slots; code
/// and data get a slot each.
pub const SIFIVE_U: MemoryMap = MemoryMap {
    ram_base: 0x8000_0000,
    ram_size: 128 * 1024 * 1024,
    phy_mem: 0x8000_0000,
    app_low: 64 * GIB,
    app_high: 192 * GIB,
    app_code: 64 * GIB,
    app_data: 65 * GIB,
    sys: 192 * GIB,
};

/// Cortex-A (ARMv7-A, short descriptors): 256 MiB of RAM at 0.
pub const CORTEX_A: MemoryMap = MemoryMap {
    ram_base: 0x0000_0000,
    ram_size: 256 * 1024 * 1024,
    phy_mem: 0x8000_0000,
    app_low: 0x0040_0000,
    app_high: 0x8000_0000,
    app_code: 0x0040_0000,
    app_data: 0x0080_0000,
    sys: 0xFF70_0000,
};

/// MMU-less targets: everything is identity, applications share the RAM window.
pub const FLAT: MemoryMap = MemoryMap {
    ram_base: 0x8000_0000,
    ram_size: 16 * 1024 * 1024,
    phy_mem: 0x8000_0000,
    app_low: 0x8000_0000,
    app_high: 0x8100_0000,
    app_code: 0x8000_0000,
    app_data: 0x8000_0000,
    sys: 0x8000_0000,
};

const _: () = {
    assert!(SIFIVE_U.app_low < SIFIVE_U.app_high);
    assert!(SIFIVE_U.app_high <= SIFIVE_U.sys);
    assert!(SIFIVE_U.app_code >= SIFIVE_U.app_low && SIFIVE_U.app_data < SIFIVE_U.app_high);
    assert!(SIFIVE_U.ram_base.is_multiple_of(4096));
    assert!(SIFIVE_U.app_low.is_multiple_of(GIB) && SIFIVE_U.app_high.is_multiple_of(GIB));
    assert!(SIFIVE_U.app_data - SIFIVE_U.app_code >= GIB);
    assert!(SIFIVE_U.phy_mem + SIFIVE_U.ram_size <= SIFIVE_U.app_low);
    assert!(CORTEX_A.app_low.is_multiple_of(1 << 20) && CORTEX_A.app_high.is_multiple_of(1 << 20));
    assert!(CORTEX_A.app_low < CORTEX_A.app_high);
    assert!(CORTEX_A.app_high <= CORTEX_A.phy_mem);
    assert!(CORTEX_A.phy_mem + CORTEX_A.ram_size <= CORTEX_A.sys);
    assert!(FLAT.phy_mem == FLAT.ram_base);
};
