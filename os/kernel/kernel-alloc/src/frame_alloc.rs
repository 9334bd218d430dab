//! # Colored physical frame allocator
//!
//! One [`FreeList`] per cache color plus the uncolored `WHITE` list. With a
//! single color everything lives in `WHITE`. With more, boot memory first
//! fills a `WHITE` reserve (page tables and directories need contiguous,
//! color-agnostic runs), then every remaining frame goes to the list of its
//! color. A frame's color is `(frame >> unit_bits) % COLORS`, so frames of
//! one color are never adjacent and colored allocations are single frames
//! in practice.
//!
//! All lists sit behind one [`SpinLock`] taken with interrupts masked.

use crate::error::AllocError;
use crate::free_list::FreeList;
use kernel_info::SystemInfo;
use kernel_info::config::{COLORS, WHITE_RESERVE_FRAMES};
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::SpinLock;
use kernel_vmem::{Color, FrameAlloc, PhysMapper};
use log::{debug, trace, warn};

struct Lists<const C: usize> {
    white: FreeList,
    colored: [FreeList; C],
    /// Units still owed to the `WHITE` reserve.
    reserve: u64,
}

impl<const C: usize> Lists<C> {
    fn list(&mut self, color: Color) -> &mut FreeList {
        if color.is_white() {
            &mut self.white
        } else {
            &mut self.colored[color.index()]
        }
    }
}

pub struct FrameAllocator<'m, const C: usize = COLORS> {
    lists: SpinLock<Lists<C>>,
    mapper: &'m dyn PhysMapper,
    unit_bits: u32,
}

impl<'m, const C: usize> FrameAllocator<'m, C> {
    const COLORFUL: bool = C > 1;

    /// An empty allocator handing out `1 << unit_bits` byte units, with the
    /// configured `WHITE` reserve.
    #[must_use]
    pub fn new(mapper: &'m dyn PhysMapper, unit_bits: u32) -> Self {
        Self::with_reserve(mapper, unit_bits, WHITE_RESERVE_FRAMES)
    }

    /// An empty allocator keeping the first `white_reserve` units it is given
    /// uncolored.
    #[must_use]
    pub fn with_reserve(mapper: &'m dyn PhysMapper, unit_bits: u32, white_reserve: u64) -> Self {
        assert!(C >= 1 && C < usize::from(u8::MAX), "unsupported color count {C}");
        Self {
            lists: SpinLock::new(Lists {
                white: FreeList::new(unit_bits),
                colored: core::array::from_fn(|_| FreeList::new(unit_bits)),
                reserve: if Self::COLORFUL { white_reserve } else { 0 },
            }),
            mapper,
            unit_bits,
        }
    }

    /// An allocator seeded with the free ranges setup reported. Ranges the
    /// allocator cannot use are logged and skipped.
    ///
    /// # Safety
    /// See [`add_region`](Self::add_region); applies to every range of `si`.
    pub unsafe fn from_system_info(
        mapper: &'m dyn PhysMapper,
        unit_bits: u32,
        si: &SystemInfo,
    ) -> Self {
        let alloc = Self::new(mapper, unit_bits);
        for range in si.pmm.free_ranges() {
            let result = unsafe {
                alloc.add_region(PhysicalAddress::new(range.base), PhysicalAddress::new(range.top))
            };
            if let Err(e) = result {
                warn!("FrameAllocator: skipping boot range: {e}");
            }
        }
        alloc
    }

    /// Hand `[base, top)` to the allocator. Partial units at either end are
    /// dropped.
    ///
    /// # Safety
    /// The range must be unused RAM and not already managed by this or any
    /// other allocator.
    pub unsafe fn add_region(
        &self,
        base: PhysicalAddress,
        top: PhysicalAddress,
    ) -> Result<(), AllocError> {
        let unit = 1u64 << self.unit_bits;
        let aligned_base = base.align_up(unit);
        let aligned_top = top.align_down(unit);
        if aligned_top <= aligned_base {
            return Err(AllocError::Empty { base, top });
        }
        let reachable = self.mapper.phy_to_log(aligned_base).is_some()
            && self
                .mapper
                .phy_to_log(PhysicalAddress::new(aligned_top.as_u64() - 1))
                .is_some();
        if !reachable {
            return Err(AllocError::Unreachable { base, top });
        }
        let base = aligned_base.as_u64();
        let top = aligned_top.as_u64();
        let units = (top - base) >> self.unit_bits;
        debug!("FrameAllocator::add_region({base:#x}, {top:#x}) = {units} units");

        let mut lists = self.lists.lock_irq();
        let white = lists.reserve.min(units);
        if white > 0 {
            unsafe { lists.white.insert_merging(self.mapper, base, white) };
            lists.reserve -= white;
        }
        if !Self::COLORFUL {
            if units > white {
                let rest = base + (white << self.unit_bits);
                unsafe { lists.white.insert_merging(self.mapper, rest, units - white) };
            }
            return Ok(());
        }
        // Ascending, so each run lands at the head of its list.
        for i in white..units {
            let frame = base + (i << self.unit_bits);
            let color = self.color(frame);
            unsafe { lists.list(color).insert_merging(self.mapper, frame, 1) };
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn color(&self, frame: u64) -> Color {
        if Self::COLORFUL {
            Color::new(((frame >> self.unit_bits) % C as u64) as u8)
        } else {
            Color::WHITE
        }
    }

    /// Without coloring every request is served from `WHITE`.
    const fn route(color: Color) -> Color {
        if Self::COLORFUL { color } else { Color::WHITE }
    }

    /// Largest run available in `color`.
    #[must_use]
    pub fn largest(&self, color: Color) -> u64 {
        let mut lists = self.lists.lock_irq();
        lists.list(Self::route(color)).largest(self.mapper)
    }

    /// Number of separate runs in `color`.
    #[must_use]
    pub fn runs(&self, color: Color) -> usize {
        let mut lists = self.lists.lock_irq();
        lists.list(Self::route(color)).runs()
    }

    #[must_use]
    pub const fn colors(&self) -> usize {
        C
    }

    #[must_use]
    pub const fn unit_bits(&self) -> u32 {
        self.unit_bits
    }
}

impl<const C: usize> FrameAlloc for FrameAllocator<'_, C> {
    fn try_alloc(&self, count: u64, color: Color) -> Option<PhysicalAddress> {
        if count == 0 {
            return None;
        }
        let color = Self::route(color);
        let found = {
            let mut lists = self.lists.lock_irq();
            lists.list(color).search_decrementing(self.mapper, count)
        };
        let pa = PhysicalAddress::new(found?);
        trace!("FrameAllocator::alloc({count}, {color:?}) = {pa}");
        Some(pa)
    }

    fn alloc_at(&self, base: PhysicalAddress, count: u64, color: Color) -> bool {
        if count == 0 {
            return false;
        }
        let color = Self::route(color);
        let claimed = {
            let mut lists = self.lists.lock_irq();
            lists.list(color).claim(self.mapper, base.as_u64(), count)
        };
        trace!("FrameAllocator::alloc_at({base}, {count}, {color:?}) = {claimed}");
        claimed
    }

    fn calloc(&self, count: u64, color: Color) -> Option<PhysicalAddress> {
        let pa = self.alloc(count, color)?;
        let Some(la) = self.mapper.phy_to_log(pa) else {
            panic!("allocated run at {pa} is not reachable");
        };
        #[allow(clippy::cast_possible_truncation)]
        unsafe {
            core::ptr::write_bytes(la.as_mut_ptr::<u8>(), 0, (count << self.unit_bits) as usize);
        }
        Some(pa)
    }

    fn free(&self, base: PhysicalAddress, count: u64) {
        if count == 0 {
            return;
        }
        trace!("FrameAllocator::free({base}, {count})");
        if !Self::COLORFUL {
            self.white_free(base, count);
            return;
        }
        let mut lists = self.lists.lock_irq();
        for i in 0..count {
            let frame = base.as_u64() + (i << self.unit_bits);
            let color = self.color(frame);
            unsafe { lists.list(color).insert_merging(self.mapper, frame, 1) };
        }
    }

    fn white_free(&self, base: PhysicalAddress, count: u64) {
        if count == 0 {
            return;
        }
        trace!("FrameAllocator::white_free({base}, {count})");
        let mut lists = self.lists.lock_irq();
        unsafe { lists.white.insert_merging(self.mapper, base.as_u64(), count) };
    }

    fn allocable(&self, color: Color) -> u64 {
        let mut lists = self.lists.lock_irq();
        lists.list(Self::route(color)).free()
    }

    fn color_of(&self, frame: PhysicalAddress) -> Color {
        self.color(frame.as_u64())
    }
}
