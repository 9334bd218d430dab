//! # Page tables
//!
//! A [`PageTable`] is a view over `entries` consecutive leaf entries in
//! physical memory, read and written through the context's physical mapper.
//! A chunk's tables are allocated as one contiguous area, so one view spans
//! all of them and entry `i` maps page `i` of the chunk.

use crate::chunk::Layout;
use crate::context::MemoryKernelContext;
use crate::error::MmuError;
use crate::flags::PageFlags;
use crate::frames::Color;
use crate::translator::AddressTranslator;
use kernel_memory_addresses::PhysicalAddress;
use log::{trace, warn};

pub struct PageTable<'k, A: AddressTranslator> {
    ctx: &'k MemoryKernelContext<'k, A>,
    base: PhysicalAddress,
    entries: u64,
}

impl<'k, A: AddressTranslator> PageTable<'k, A> {
    /// View `entries` leaf entries starting at `base`.
    ///
    /// # Safety
    /// `base` must point at `entries` entries of table memory that is
    /// reachable through the context's mapper and not aliased as anything
    /// but page table entries.
    #[must_use]
    pub const unsafe fn new(
        ctx: &'k MemoryKernelContext<'k, A>,
        base: PhysicalAddress,
        entries: u64,
    ) -> Self {
        Self { ctx, base, entries }
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.entries
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Raw entry `i`.
    #[must_use]
    pub fn entry(&self, i: u64) -> u64 {
        assert!(i < self.entries, "entry {i} out of {}", self.entries);
        self.ctx.read_entry(self.base, i)
    }

    pub fn set(&mut self, i: u64, entry: u64) {
        assert!(i < self.entries, "entry {i} out of {}", self.entries);
        self.ctx.write_entry(self.base, i, entry);
    }

    /// Frame mapped by entry `i`, if present.
    #[must_use]
    pub fn frame(&self, i: u64) -> Option<PhysicalAddress> {
        let e = self.entry(i);
        A::pte_present(e).then(|| A::pte_frame(e))
    }

    /// Flags of entry `i`, if present.
    #[must_use]
    pub fn flags(&self, i: u64) -> Option<PageFlags> {
        let e = self.entry(i);
        A::pte_present(e).then(|| A::pte_flags(e))
    }

    /// Back `[from, to)` with fresh frames, one contiguous run if the
    /// allocator has one, otherwise frame by frame.
    pub fn map(
        &mut self,
        from: u64,
        to: u64,
        flags: PageFlags,
        color: Color,
    ) -> Result<Layout, MmuError> {
        // Colored frames are never adjacent, so only single pages can come
        // out of one run. Missing runs are expected here and stay quiet.
        let count = to - from;
        if let Some(phy) = self.ctx.frames().try_alloc(count, color) {
            self.remap(phy, from, to, flags);
            return Ok(Layout::Contiguous);
        }
        trace!("PageTable::map: no run of {count} frames, mapping one by one");
        self.map_scattered(from, to, flags, color)?;
        Ok(Layout::Scattered)
    }

    /// Back `[from, to)` with a single run of frames; returns its base.
    pub fn map_contiguous(
        &mut self,
        from: u64,
        to: u64,
        flags: PageFlags,
        color: Color,
    ) -> Result<PhysicalAddress, MmuError> {
        let count = to - from;
        let phy = self
            .ctx
            .frames()
            .alloc(count, color)
            .ok_or(MmuError::OutOfMemory { requested: count })?;
        self.remap(phy, from, to, flags);
        Ok(phy)
    }

    /// Back `[from, to)` frame by frame. On exhaustion every frame taken so
    /// far is returned and the range is left unmapped.
    pub fn map_scattered(
        &mut self,
        from: u64,
        to: u64,
        flags: PageFlags,
        color: Color,
    ) -> Result<(), MmuError> {
        for i in from..to {
            let Some(frame) = self.ctx.frames().try_alloc(1, color) else {
                warn!("PageTable::map_scattered: out of frames at {i} of [{from}, {to})");
                self.unmap(from, i, color);
                return Err(MmuError::OutOfMemory { requested: to - i });
            };
            self.set(i, A::pte(frame, flags));
        }
        Ok(())
    }

    /// Point `[from, to)` at consecutive frames starting at `phy`.
    pub fn remap(&mut self, phy: PhysicalAddress, from: u64, to: u64, flags: PageFlags) {
        let mut frame = phy;
        for i in from..to {
            self.set(i, A::pte(frame, flags));
            frame += A::PAGE_SIZE;
        }
    }

    /// Rewrite the flags of the present entries in `[from, to)`.
    pub fn reflag(&mut self, from: u64, to: u64, flags: PageFlags) {
        for i in from..to {
            if let Some(frame) = self.frame(i) {
                self.set(i, A::pte(frame, flags));
            }
        }
    }

    /// Release the frames mapped by `[from, to)` and clear the entries.
    ///
    /// Physically consecutive frames are returned as one run.
    pub fn unmap(&mut self, from: u64, to: u64, color: Color) {
        let mut run: Option<(PhysicalAddress, u64)> = None;
        for i in from..to {
            let Some(frame) = self.frame(i) else {
                continue;
            };
            run = match run {
                Some((base, n)) if base + n * A::PAGE_SIZE == frame => Some((base, n + 1)),
                Some((base, n)) => {
                    self.ctx.release(base, n, color);
                    Some((frame, 1))
                }
                None => Some((frame, 1)),
            };
        }
        if let Some((base, n)) = run {
            self.ctx.release(base, n, color);
        }
        self.clear(from, to);
    }

    /// Zero `[from, to)` without releasing anything.
    pub fn clear(&mut self, from: u64, to: u64) {
        for i in from..to {
            self.set(i, 0);
        }
    }
}
