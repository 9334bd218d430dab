//! # Boot Information
//!
//! The setup stage hands the kernel a [`SystemInfo`] describing free physical
//! memory and where the application image ended up. It is consumed once,
//! while the memory allocator is seeded and the first task is built.

use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};

/// Maximum number of free physical ranges the setup stage can report.
pub const MAX_FREE_RANGES: usize = 4;

/// Information the kernel needs right after setup.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Physical memory map.
    pub pmm: PhysicalMemoryMap,

    /// Logical (load) map of the boot image.
    pub lm: LoadMap,
}

/// A half-open physical range `[base, top)`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FreeRange {
    pub base: u64,
    pub top: u64,
}

impl FreeRange {
    #[must_use]
    pub const fn new(base: u64, top: u64) -> Self {
        Self { base, top }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.top <= self.base
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.top.saturating_sub(self.base)
    }
}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct PhysicalMemoryMap {
    /// Memory left free by setup; unused slots are empty ranges.
    pub free: [FreeRange; MAX_FREE_RANGES],

    /// Physical address of the master page directory installed by setup.
    pub sys_pd: u64,

    /// Page tables setup built for the application code (leaf level).
    pub app_code_pt: u64,

    /// Attacher (intermediate) tables for the application code, or 0 on
    /// two-level translation schemes.
    pub app_code_at: u64,

    /// Page tables setup built for the application data (leaf level).
    pub app_data_pt: u64,

    /// Attacher tables for the application data, or 0.
    pub app_data_at: u64,
}

#[repr(C)]
#[derive(Debug, Clone)]
pub struct LoadMap {
    /// Whether an application is present in the image.
    pub has_app: bool,

    /// Whether an extra argument blob follows the application.
    pub has_ext: bool,

    /// Logical base and size of the application code.
    pub app_code: u64,
    pub app_code_size: u64,

    /// Logical base and size of the application data.
    pub app_data: u64,
    pub app_data_size: u64,

    /// Application entry point.
    pub app_entry: u64,

    /// Logical address and size of the extra blob (valid when `has_ext`).
    pub app_extra: u64,
    pub app_extra_size: u64,
}

impl PhysicalMemoryMap {
    /// Iterate the non-empty free ranges.
    pub fn free_ranges(&self) -> impl Iterator<Item = FreeRange> + '_ {
        self.free.iter().copied().filter(|r| !r.is_empty())
    }

    #[must_use]
    pub const fn master_directory(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.sys_pd)
    }
}

impl LoadMap {
    #[must_use]
    pub const fn code(&self) -> LogicalAddress {
        LogicalAddress::new(self.app_code)
    }

    #[must_use]
    pub const fn data(&self) -> LogicalAddress {
        LogicalAddress::new(self.app_data)
    }

    #[must_use]
    pub const fn entry(&self) -> LogicalAddress {
        LogicalAddress::new(self.app_entry)
    }

    /// The extra argument blob, if the image carries one.
    #[must_use]
    pub const fn extra(&self) -> Option<(LogicalAddress, u64)> {
        if self.has_ext {
            Some((LogicalAddress::new(self.app_extra), self.app_extra_size))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slots_are_skipped() {
        let pmm = PhysicalMemoryMap {
            free: [
                FreeRange::new(0x8000_0000, 0x8010_0000),
                FreeRange::default(),
                FreeRange::new(0x8020_0000, 0x8030_0000),
                FreeRange::new(0x9000_0000, 0x9000_0000),
            ],
            sys_pd: 0,
            app_code_pt: 0,
            app_code_at: 0,
            app_data_pt: 0,
            app_data_at: 0,
        };
        let ranges: Vec<_> = pmm.free_ranges().collect();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].len(), 0x10_0000);
    }
}
