//! # Offset-based PhysMapper
//!
//! The kernel reaches physical RAM through one linear alias: RAM at
//! `[base, base + size)` appears at `[logical, logical + size)`. Turning a
//! physical address into a usable pointer is a bounds check and an add.
//!
//! ## Why is this needed?
//! - Code can only dereference logical addresses, not physical ones.
//! - Page tables, free-list headers and fresh frames are all named by
//!   physical address and must still be read and written.
//! - The alias differs between machines (identity on SiFive-U, a high
//!   window on Cortex-A) and in tests points into host memory, so the
//!   offset is data rather than a constant.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::OffsetPhysMapper;
//! use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
//! use kernel_vmem::PhysMapper;
//!
//! let mapper = unsafe {
//!     OffsetPhysMapper::new(
//!         PhysicalAddress::new(0x8000_0000),
//!         0x100_0000,
//!         LogicalAddress::new(0xC000_0000),
//!     )
//! };
//! let la = mapper.phy_to_log(PhysicalAddress::new(0x8000_1000)).unwrap();
//! assert_eq!(la, LogicalAddress::new(0xC000_1000));
//! assert_eq!(mapper.log_to_phy(la), Some(PhysicalAddress::new(0x8000_1000)));
//! assert_eq!(mapper.phy_to_log(PhysicalAddress::new(0x9000_0000)), None);
//! ```

use kernel_info::MemoryMap;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] over a single linear alias of physical RAM.
#[derive(Debug, Copy, Clone)]
pub struct OffsetPhysMapper {
    /// `logical - physical`, wrapping.
    offset: u64,
    base: u64,
    top: u64,
}

impl OffsetPhysMapper {
    /// Alias `[base, base + size)` at `logical`.
    ///
    /// # Safety
    /// The whole logical window must be mapped, writable and reserved for
    /// kernel access to physical memory.
    #[must_use]
    pub const unsafe fn new(base: PhysicalAddress, size: u64, logical: LogicalAddress) -> Self {
        Self {
            offset: logical.as_u64().wrapping_sub(base.as_u64()),
            base: base.as_u64(),
            top: base.as_u64() + size,
        }
    }

    /// The alias a machine's memory map describes.
    ///
    /// # Safety
    /// As for [`new`](Self::new): `map.phy_mem` must actually alias RAM.
    #[must_use]
    pub const unsafe fn for_map(map: &MemoryMap) -> Self {
        unsafe {
            Self::new(
                PhysicalAddress::new(map.ram_base),
                map.ram_size,
                LogicalAddress::new(map.phy_mem),
            )
        }
    }

    const fn logical_base(&self) -> u64 {
        self.base.wrapping_add(self.offset)
    }
}

unsafe impl PhysMapper for OffsetPhysMapper {
    fn phy_to_log(&self, pa: PhysicalAddress) -> Option<LogicalAddress> {
        let pa = pa.as_u64();
        (pa >= self.base && pa < self.top).then(|| LogicalAddress::new(pa.wrapping_add(self.offset)))
    }

    fn log_to_phy(&self, la: LogicalAddress) -> Option<PhysicalAddress> {
        let delta = la.as_u64().wrapping_sub(self.logical_base());
        (delta < self.top - self.base).then(|| PhysicalAddress::new(self.base + delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_map() {
        let map = kernel_info::memory::SIFIVE_U;
        let m = unsafe { OffsetPhysMapper::for_map(&map) };
        let pa = PhysicalAddress::new(map.ram_base + 0x2000);
        assert_eq!(m.phy_to_log(pa), Some(LogicalAddress::new(pa.as_u64())));
        assert_eq!(m.phy_to_log(PhysicalAddress::new(map.ram_top())), None);
    }

    #[test]
    fn window_below_ram() {
        // Logical window lower than the physical range: the offset wraps.
        let m = unsafe {
            OffsetPhysMapper::new(
                PhysicalAddress::new(0x8000_0000),
                0x1000,
                LogicalAddress::new(0x1000),
            )
        };
        let la = m.phy_to_log(PhysicalAddress::new(0x8000_0800)).unwrap();
        assert_eq!(la, LogicalAddress::new(0x1800));
        assert_eq!(m.log_to_phy(la), Some(PhysicalAddress::new(0x8000_0800)));
        assert_eq!(m.log_to_phy(LogicalAddress::new(0x0FFF)), None);
        assert_eq!(m.log_to_phy(LogicalAddress::new(0x2000)), None);
    }
}
