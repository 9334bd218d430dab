//! # Chunks
//!
//! A [`Chunk`] is the backing store of one segment: a run of pages, the
//! leaf tables that map them and, on three-level formats, the attacher
//! tables that link those leaves. Pages are numbered from the chunk's own
//! base; page `i` is entry `i` of the chunk's table area. A directory
//! places the whole chunk at a slot-aligned logical address.
//!
//! Ownership of frames and of tables is recorded explicitly at
//! construction and is the only thing `Drop` consults.

use crate::context::MemoryKernelContext;
use crate::error::MmuError;
use crate::flags::PageFlags;
use crate::frames::Color;
use crate::page_table::PageTable;
use crate::translator::AddressTranslator;
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, trace, warn};

/// How the backing frames are laid out in physical memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Layout {
    /// One physical run; [`Chunk::phy_address`] is its base.
    Contiguous,
    /// Frame by frame.
    Scattered,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOwnership {
    /// Frames return to the allocator on drop.
    Owns,
    /// Frames belong to someone else (device windows, boot image).
    Borrows,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TableOwnership {
    Owns,
    Borrows,
}

pub struct Chunk<'k, A: AddressTranslator> {
    ctx: &'k MemoryKernelContext<'k, A>,
    from: u64,
    to: u64,
    pts: u64,
    ats: u64,
    pt: PhysicalAddress,
    at: PhysicalAddress,
    /// Base of the backing run, null unless [`Layout::Contiguous`].
    phy: PhysicalAddress,
    flags: PageFlags,
    color: Color,
    layout: Layout,
    frames: FrameOwnership,
    tables: TableOwnership,
}

impl<'k, A: AddressTranslator> Chunk<'k, A> {
    fn empty(
        ctx: &'k MemoryKernelContext<'k, A>,
        flags: PageFlags,
        color: Color,
        frames: FrameOwnership,
    ) -> Self {
        Self {
            ctx,
            from: 0,
            to: 0,
            pts: 0,
            ats: 0,
            pt: PhysicalAddress::NULL,
            at: PhysicalAddress::NULL,
            phy: PhysicalAddress::NULL,
            flags: A::normalize(flags),
            color,
            layout: Layout::Scattered,
            frames,
            tables: TableOwnership::Owns,
        }
    }

    /// Allocate and map `bytes` of fresh memory.
    ///
    /// Requests carrying [`PageFlags::CONTIGUOUS`] get a single physical run
    /// or fail. Other cacheable requests prefer a single run and fall back to
    /// frame by frame; uncached and device requests are always mapped frame
    /// by frame.
    pub fn new(
        ctx: &'k MemoryKernelContext<'k, A>,
        bytes: u64,
        flags: PageFlags,
        color: Color,
    ) -> Result<Self, MmuError> {
        trace!("Chunk::new(bytes={bytes}, flags={flags:?}, color={color:?})");
        let pages = A::pages(bytes);
        if pages == 0 {
            return Err(MmuError::Empty);
        }

        let mut chunk = Self::empty(ctx, flags, color, FrameOwnership::Owns);
        if !A::PAGING {
            chunk.phy = ctx
                .frames()
                .alloc(pages, color)
                .ok_or(MmuError::OutOfMemory { requested: pages })?;
            chunk.layout = Layout::Contiguous;
            chunk.to = pages;
            return Ok(chunk);
        }

        chunk.alloc_tables(A::pts(pages))?;
        let mut table = chunk.table();
        if flags.contains(PageFlags::CONTIGUOUS) {
            chunk.phy = table.map_contiguous(0, pages, chunk.flags, color)?;
            chunk.layout = Layout::Contiguous;
        } else if flags.is_cacheable() {
            chunk.layout = table.map(0, pages, chunk.flags, color)?;
            if chunk.layout == Layout::Contiguous {
                chunk.phy = A::pte_frame(table.entry(0));
            }
        } else {
            table.map_scattered(0, pages, chunk.flags, color)?;
        }
        chunk.to = pages;
        Ok(chunk)
    }

    /// Map `bytes` of existing physical memory starting at `phy`.
    ///
    /// The chunk owns its tables; `frames` says whether the backing memory
    /// is released on drop.
    pub fn remapped(
        ctx: &'k MemoryKernelContext<'k, A>,
        phy: PhysicalAddress,
        bytes: u64,
        flags: PageFlags,
        frames: FrameOwnership,
    ) -> Result<Self, MmuError> {
        trace!("Chunk::remapped(phy={phy}, bytes={bytes}, flags={flags:?}, {frames:?})");
        let pages = A::pages(bytes);
        if pages == 0 {
            return Err(MmuError::Empty);
        }
        debug_assert!(phy.is_aligned(A::PAGE_SIZE));

        let color = ctx.frames().color_of(phy);
        let mut chunk = Self::empty(ctx, flags, color, frames);
        chunk.phy = phy;
        chunk.layout = Layout::Contiguous;
        if A::PAGING {
            chunk.alloc_tables(A::pts(pages))?;
            chunk.table().remap(phy, 0, pages, chunk.flags);
        }
        chunk.to = pages;
        Ok(chunk)
    }

    /// Wrap pages `[from, to)` of tables somebody else built. Nothing is
    /// allocated, nothing is released on drop.
    ///
    /// `at` may be null on two-level formats; on flat targets `pt` is the
    /// base of the memory itself.
    #[must_use]
    pub fn wrap(
        ctx: &'k MemoryKernelContext<'k, A>,
        pt: PhysicalAddress,
        at: PhysicalAddress,
        from: u64,
        to: u64,
        flags: PageFlags,
    ) -> Self {
        trace!("Chunk::wrap(pt={pt}, at={at}, [{from}, {to}), flags={flags:?})");
        assert!(from <= to);
        let mut chunk = Self::empty(ctx, flags, Color::WHITE, FrameOwnership::Borrows);
        chunk.tables = TableOwnership::Borrows;
        chunk.from = from;
        chunk.to = to;
        if A::PAGING {
            chunk.pt = pt;
            chunk.at = at;
            chunk.pts = A::pts(to);
            chunk.ats = A::ats(chunk.pts);
        } else {
            chunk.phy = pt;
            chunk.layout = Layout::Contiguous;
        }
        chunk
    }

    /// [`wrap`](Self::wrap), pointing the wrapped entries at consecutive
    /// frames from `phy`.
    #[must_use]
    pub fn wrap_remapped(
        ctx: &'k MemoryKernelContext<'k, A>,
        pt: PhysicalAddress,
        at: PhysicalAddress,
        from: u64,
        to: u64,
        flags: PageFlags,
        phy: PhysicalAddress,
    ) -> Self {
        let mut chunk = Self::wrap(ctx, pt, at, from, to, flags);
        if A::PAGING {
            chunk.table().remap(phy, from, to, chunk.flags);
        }
        chunk.phy = phy;
        chunk.layout = Layout::Contiguous;
        chunk
    }

    fn alloc_tables(&mut self, pts: u64) -> Result<(), MmuError> {
        let ats = A::ats(pts);
        self.pt = self.ctx.table_alloc(pts * A::PT_SIZE)?;
        self.pts = pts;
        if ats > 0 {
            self.at = self.ctx.table_alloc(ats * A::AT_SIZE)?;
            self.ats = ats;
        }
        self.link_attachers();
        Ok(())
    }

    /// Point attacher entry `k` at leaf table `k`.
    fn link_attachers(&self) {
        if self.at.is_null() {
            return;
        }
        for k in 0..self.pts {
            self.ctx
                .write_entry(self.at, k, A::table_entry(self.pt + k * A::PT_SIZE));
        }
    }

    /// View over the chunk's whole leaf table area.
    fn table(&self) -> PageTable<'k, A> {
        unsafe { PageTable::new(self.ctx, self.pt, self.pts * A::PT_ENTRIES) }
    }

    /// Mapped size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        (self.to - self.from) * A::PAGE_SIZE
    }

    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.to - self.from
    }

    #[must_use]
    pub const fn from(&self) -> u64 {
        self.from
    }

    #[must_use]
    pub const fn to(&self) -> u64 {
        self.to
    }

    /// Number of leaf page tables.
    #[must_use]
    pub const fn pts(&self) -> u64 {
        self.pts
    }

    /// Number of attacher tables; `0` on two-level formats.
    #[must_use]
    pub const fn ats(&self) -> u64 {
        self.ats
    }

    #[must_use]
    pub const fn pt(&self) -> PhysicalAddress {
        self.pt
    }

    #[must_use]
    pub const fn at(&self) -> PhysicalAddress {
        self.at
    }

    /// Directory slots the chunk spans once attached.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn slots(&self) -> usize {
        if !A::PAGING {
            0
        } else if A::AT_BITS > 0 {
            self.ats as usize
        } else {
            self.pts as usize
        }
    }

    /// Table that directory slot `i` of the chunk points at, null if the
    /// chunk has no such table area.
    #[must_use]
    pub fn slot_table(&self, i: usize) -> PhysicalAddress {
        let (area, size) = if A::AT_BITS > 0 {
            (self.at, A::AT_SIZE)
        } else {
            (self.pt, A::PT_SIZE)
        };
        if area.is_null() {
            PhysicalAddress::NULL
        } else {
            area + i as u64 * size
        }
    }

    /// Physical base of a [`Layout::Contiguous`] chunk.
    #[must_use]
    pub const fn phy_address(&self) -> Option<PhysicalAddress> {
        match self.layout {
            Layout::Contiguous if !self.phy.is_null() => Some(self.phy),
            _ => None,
        }
    }

    /// Frame backing page `i` of the chunk.
    #[must_use]
    pub fn frame(&self, i: u64) -> Option<PhysicalAddress> {
        if !(self.from..self.to).contains(&i) {
            return None;
        }
        if A::PAGING {
            self.table().frame(i)
        } else {
            Some(self.phy + (i - self.from) * A::PAGE_SIZE)
        }
    }

    /// Effective flags, as the hardware sees them.
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        self.flags
    }

    #[must_use]
    pub const fn color(&self) -> Color {
        self.color
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub const fn frame_ownership(&self) -> FrameOwnership {
        self.frames
    }

    #[must_use]
    pub const fn table_ownership(&self) -> TableOwnership {
        self.tables
    }

    #[must_use]
    pub const fn context(&self) -> &'k MemoryKernelContext<'k, A> {
        self.ctx
    }

    /// Change the protection of every page.
    pub fn reflag(&mut self, flags: PageFlags) {
        trace!("Chunk::reflag({flags:?})");
        self.flags = A::normalize(flags);
        if A::PAGING {
            self.table().reflag(self.from, self.to, self.flags);
            self.ctx.mmu().flush_tlb();
        }
    }

    /// Grow (positive) or shrink (negative) by `amount` bytes; returns the
    /// new size, or `0` if the chunk cannot be resized.
    ///
    /// Only contiguous chunks that own both their frames and their tables
    /// resize. Growth first claims the frames right behind the run; if they
    /// are taken the contents move to a larger run so the chunk stays
    /// contiguous. Flat targets only grow in place. Shrinking drops whole
    /// pages and keeps at least one.
    ///
    /// Growth beyond the chunk's current directory span moves its table
    /// area; such a chunk has to be detached before and re-attached after.
    pub fn resize(&mut self, amount: i64) -> u64 {
        trace!("Chunk::resize({amount})");
        if self.layout != Layout::Contiguous
            || self.frames != FrameOwnership::Owns
            || self.tables != TableOwnership::Owns
        {
            return 0;
        }
        match amount {
            0 => self.size(),
            a if a > 0 => self.grow(a.unsigned_abs()),
            a => self.shrink(a.unsigned_abs()),
        }
    }

    fn grow(&mut self, bytes: u64) -> u64 {
        let old = self.pages();
        let add = A::pages(bytes);
        let pages = old + add;
        let to = self.from + pages;

        // The run right behind the chunk keeps it in place.
        let tail = self.phy + old * A::PAGE_SIZE;
        if self.ctx.frames().alloc_at(tail, add, self.color) {
            if A::PAGING {
                if A::pts(to) > self.pts && self.grow_tables(A::pts(to)).is_err() {
                    warn!("Chunk::resize: out of table memory");
                    self.ctx.release(tail, add, self.color);
                    return 0;
                }
                self.table().remap(tail, self.to, to, self.flags);
                self.ctx.mmu().flush_tlb();
            }
            debug!("Chunk::resize: grew in place at {}, {old} -> {pages} pages", self.phy);
            self.to = to;
            return self.size();
        }

        if !A::PAGING {
            // Logical equals physical; moving would move the chunk.
            warn!("Chunk::resize: {add} units behind {tail} are taken");
            return 0;
        }
        self.relocate(pages)
    }

    /// Move the contents to a fresh run of `pages` frames.
    fn relocate(&mut self, pages: u64) -> u64 {
        let old = self.pages();
        let to = self.from + pages;
        let Some(phy) = self.ctx.frames().try_alloc(pages, self.color) else {
            warn!("Chunk::resize: no run of {pages} frames");
            return 0;
        };
        if A::pts(to) > self.pts && self.grow_tables(A::pts(to)).is_err() {
            warn!("Chunk::resize: out of table memory");
            self.ctx.release(phy, pages, self.color);
            return 0;
        }

        #[allow(clippy::cast_possible_truncation)]
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.ctx.ptr::<u8>(self.phy),
                self.ctx.ptr::<u8>(phy),
                (old * A::PAGE_SIZE) as usize,
            );
        }
        self.table().remap(phy, self.from, to, self.flags);
        self.ctx.release(self.phy, old, self.color);
        self.ctx.mmu().flush_tlb();
        debug!("Chunk::resize: moved {} -> {phy}, {old} -> {pages} pages", self.phy);

        self.phy = phy;
        self.to = to;
        self.size()
    }

    /// Replace the table area by one of `pts` leaf tables.
    fn grow_tables(&mut self, pts: u64) -> Result<(), MmuError> {
        let ats = A::ats(pts);
        let pt = self.ctx.table_alloc(pts * A::PT_SIZE)?;
        let at = if ats > self.ats {
            match self.ctx.table_alloc(ats * A::AT_SIZE) {
                Ok(at) => at,
                Err(e) => {
                    self.ctx.table_free(pt, pts * A::PT_SIZE);
                    return Err(e);
                }
            }
        } else {
            self.at
        };

        for i in 0..self.pts * A::PT_ENTRIES {
            self.ctx.write_entry(pt, i, self.ctx.read_entry(self.pt, i));
        }
        self.ctx.table_free(self.pt, self.pts * A::PT_SIZE);
        if at != self.at {
            self.ctx.table_free(self.at, self.ats * A::AT_SIZE);
        }

        debug!("Chunk::resize: table area {} -> {pt}, {} -> {pts} tables", self.pt, self.pts);
        self.pt = pt;
        self.pts = pts;
        self.at = at;
        self.ats = ats;
        self.link_attachers();
        Ok(())
    }

    fn shrink(&mut self, bytes: u64) -> u64 {
        let count = (bytes / A::PAGE_SIZE).min(self.pages() - 1);
        if count > 0 {
            let to = self.to - count;
            if A::PAGING {
                self.table().unmap(to, self.to, self.color);
                self.ctx.mmu().flush_tlb();
            } else {
                self.ctx
                    .release(self.phy + (to - self.from) * A::PAGE_SIZE, count, self.color);
            }
            self.to = to;
        }
        self.size()
    }
}

impl<A: AddressTranslator> Drop for Chunk<'_, A> {
    fn drop(&mut self) {
        trace!(
            "Chunk::drop([{}, {}), {:?}, {:?})",
            self.from, self.to, self.frames, self.tables
        );
        if self.frames == FrameOwnership::Owns {
            if A::PAGING {
                self.table().unmap(self.from, self.to, self.color);
            } else {
                self.ctx.release(self.phy, self.pages(), self.color);
            }
        }
        if self.tables == TableOwnership::Owns {
            self.ctx.table_free(self.pt, self.pts * A::PT_SIZE);
            self.ctx.table_free(self.at, self.ats * A::AT_SIZE);
        }
    }
}
