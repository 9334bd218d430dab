//! # Page directories
//!
//! A [`Directory`] owns or borrows one root table. The slots covering the
//! application window are private to it; every other slot is copied from
//! the master directory when a fresh directory is built, so all address
//! spaces share one supervisor view.
//!
//! Chunks are attached whole: a chunk spanning `n` slots occupies `n`
//! consecutive directory entries, each pointing at one of the chunk's
//! attacher tables (three-level formats) or leaf tables (two-level).

use crate::chunk::Chunk;
use crate::context::MemoryKernelContext;
use crate::error::MmuError;
use crate::flags::PageFlags;
use crate::frames::Color;
use crate::translator::AddressTranslator;
use core::fmt;
use core::mem::ManuallyDrop;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use log::{debug, trace, warn};

pub struct Directory<'k, A: AddressTranslator> {
    ctx: &'k MemoryKernelContext<'k, A>,
    pd: PhysicalAddress,
    owns: bool,
}

impl<'k, A: AddressTranslator> Directory<'k, A> {
    /// A fresh directory sharing the supervisor slots of the master.
    ///
    /// Directories stricter aligned than a frame are carved out of an
    /// over-sized run; the excess goes straight back to the allocator.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(ctx: &'k MemoryKernelContext<'k, A>) -> Result<Self, MmuError> {
        if !A::PAGING {
            return Ok(Self {
                ctx,
                pd: PhysicalAddress::NULL,
                owns: false,
            });
        }

        let frames = A::pages(A::PD_SIZE);
        let total = frames + (A::PD_ALIGN / A::PAGE_SIZE).max(1) - 1;
        let base = ctx
            .frames()
            .calloc(total, Color::WHITE)
            .ok_or(MmuError::OutOfMemory { requested: total })?;
        let pd = base.align_up(A::PD_ALIGN);
        let lead = (pd - base) / A::PAGE_SIZE;
        let trail = total - lead - frames;
        if lead > 0 {
            ctx.frames().white_free(base, lead);
        }
        if trail > 0 {
            ctx.frames().white_free(pd + frames * A::PAGE_SIZE, trail);
        }
        if total > frames {
            debug!("Directory::new: {pd} from {total} frames at {base} ({lead} + {trail} returned)");
        }

        let master = ctx.master();
        if !master.is_null() {
            let app = ctx.app_slots();
            for slot in (0..A::PD_ENTRIES).filter(|&s| !app.contains(&(s as usize))) {
                ctx.write_entry(pd, slot, ctx.read_entry(master, slot));
            }
        }
        trace!("Directory::new() = {pd}");

        Ok(Self { ctx, pd, owns: true })
    }

    /// Borrow the directory at `pd`.
    #[must_use]
    pub const fn wrap(ctx: &'k MemoryKernelContext<'k, A>, pd: PhysicalAddress) -> Self {
        Self {
            ctx,
            pd,
            owns: false,
        }
    }

    /// Borrow the active directory.
    #[must_use]
    pub fn current(ctx: &'k MemoryKernelContext<'k, A>) -> Self {
        if A::PAGING {
            Self::wrap(ctx, ctx.current())
        } else {
            Self::wrap(ctx, PhysicalAddress::NULL)
        }
    }

    /// Give up ownership, returning the root table.
    #[must_use]
    pub fn into_raw(self) -> PhysicalAddress {
        ManuallyDrop::new(self).pd
    }

    #[must_use]
    pub const fn pd(&self) -> PhysicalAddress {
        self.pd
    }

    #[must_use]
    pub const fn owns(&self) -> bool {
        self.owns
    }

    /// Make this the CPU's active directory.
    pub fn activate(&self) {
        if !A::PAGING {
            return;
        }
        trace!("Directory::activate({})", self.pd);
        let mmu = self.ctx.mmu();
        mmu.barrier();
        mmu.set_root(self.pd);
        mmu.flush_tlb();
    }

    fn entry(&self, slot: usize) -> u64 {
        self.ctx.read_entry(self.pd, slot as u64)
    }

    fn set(&mut self, slot: usize, entry: u64) {
        self.ctx.write_entry(self.pd, slot as u64, entry);
    }

    fn span(chunk: &Chunk<'k, A>) -> Result<usize, MmuError> {
        let span = chunk.slots();
        if span == 0 || chunk.slot_table(0).is_null() {
            return Err(MmuError::NoTables);
        }
        Ok(span)
    }

    /// Logical address of a flat chunk: its own base.
    fn flat_address(&self, chunk: &Chunk<'k, A>) -> Result<LogicalAddress, MmuError> {
        let phy = chunk.phy_address().ok_or(MmuError::NoTables)?;
        Ok(self
            .ctx
            .phy_to_log(phy)
            .unwrap_or_else(|| LogicalAddress::new(phy.as_u64())))
    }

    /// Attach `chunk` at the lowest run of free application slots.
    pub fn attach(&mut self, chunk: &Chunk<'k, A>) -> Result<LogicalAddress, MmuError> {
        self.attach_from(chunk, self.ctx.app_slots().start)
    }

    /// Attach `chunk` at the lowest run of free application slots that
    /// starts at slot `from` or above.
    pub fn attach_from(
        &mut self,
        chunk: &Chunk<'k, A>,
        from: usize,
    ) -> Result<LogicalAddress, MmuError> {
        if !A::PAGING {
            return self.flat_address(chunk);
        }
        let span = Self::span(chunk)?;
        let app = self.ctx.app_slots();
        let mut run = 0;
        for slot in from.max(app.start)..app.end {
            if self.entry(slot) != 0 {
                run = 0;
                continue;
            }
            run += 1;
            if run == span {
                let first = slot + 1 - span;
                self.install(chunk, first, span);
                return Ok(A::slot_address(first));
            }
        }
        warn!("Directory::attach: no run of {span} free slots from {from} in {}", self.pd);
        Err(MmuError::NoFreeSlots { span })
    }

    /// Attach `chunk` at `addr`, which must be slot aligned and have the
    /// whole span free. Nothing is installed on failure.
    ///
    /// Flat targets cannot move memory; the chunk's own address is returned.
    pub fn attach_at(
        &mut self,
        chunk: &Chunk<'k, A>,
        addr: LogicalAddress,
    ) -> Result<LogicalAddress, MmuError> {
        if !A::PAGING {
            return self.flat_address(chunk);
        }
        let span = Self::span(chunk)?;
        if !addr.is_aligned(1 << A::PD_SHIFT) {
            return Err(MmuError::Misplaced(addr));
        }
        #[allow(clippy::cast_possible_truncation)]
        let slot = (addr.as_u64() >> A::PD_SHIFT) as usize;
        let end = slot + span;
        let app = self.ctx.app_slots();
        if slot < app.start || end > app.end {
            return Err(MmuError::OutOfRange { slot, end });
        }
        if let Some(busy) = (slot..end).find(|&s| self.entry(s) != 0) {
            return Err(MmuError::SlotOccupied { slot: busy });
        }
        self.install(chunk, slot, span);
        Ok(addr)
    }

    fn install(&mut self, chunk: &Chunk<'k, A>, slot: usize, span: usize) {
        debug!("Directory::attach: {} slots at {slot} of {}", span, self.pd);
        for i in 0..span {
            self.set(slot + i, A::table_entry(chunk.slot_table(i)));
        }
        self.ctx.mmu().barrier();
    }

    /// Detach `chunk` wherever it is attached.
    pub fn detach(&mut self, chunk: &Chunk<'k, A>) -> Result<(), MmuError> {
        if !A::PAGING {
            return Ok(());
        }
        let span = Self::span(chunk)?;
        let head = A::table_entry(chunk.slot_table(0));
        let Some(slot) = self.ctx.app_slots().find(|&s| self.entry(s) == head) else {
            warn!("Directory::detach: chunk {} not attached to {}", chunk.slot_table(0), self.pd);
            return Err(MmuError::NotFound);
        };
        self.clear(chunk, slot, span);
        Ok(())
    }

    /// Detach `chunk` from `addr`.
    pub fn detach_at(
        &mut self,
        chunk: &Chunk<'k, A>,
        addr: LogicalAddress,
    ) -> Result<(), MmuError> {
        if !A::PAGING {
            return Ok(());
        }
        let span = Self::span(chunk)?;
        #[allow(clippy::cast_possible_truncation)]
        let slot = (addr.as_u64() >> A::PD_SHIFT) as usize;
        let attached = self.ctx.app_slots().contains(&slot)
            && self.entry(slot) == A::table_entry(chunk.slot_table(0));
        if !attached {
            warn!("Directory::detach: chunk {} not attached at {addr}", chunk.slot_table(0));
            return Err(MmuError::NotAttached(addr));
        }
        self.clear(chunk, slot, span);
        Ok(())
    }

    fn clear(&mut self, chunk: &Chunk<'k, A>, slot: usize, span: usize) {
        debug!("Directory::detach: {span} slots at {slot} of {}", self.pd);
        let end = (slot + span).min(self.ctx.app_slots().end);
        for (i, s) in (slot..end).enumerate() {
            if self.entry(s) == A::table_entry(chunk.slot_table(i)) {
                self.set(s, 0);
            }
        }
        let mmu = self.ctx.mmu();
        mmu.barrier();
        mmu.flush_tlb_range(A::slot_address(slot), (span as u64) << A::PD_SHIFT);
    }

    /// Walk the tables for `la`.
    #[must_use]
    pub fn translation(&self, la: LogicalAddress) -> Translation {
        let mut t = Translation {
            la,
            pde: None,
            ate: None,
            pte: None,
            phy: None,
            flags: None,
        };
        if !A::PAGING {
            t.phy = Some(
                self.ctx
                    .mapper()
                    .log_to_phy(la)
                    .unwrap_or_else(|| PhysicalAddress::new(la.as_u64())),
            );
            return t;
        }

        let pde = self.entry(A::pdi(la));
        t.pde = Some(pde);
        if !A::table_present(pde) {
            return t;
        }
        let mut table = A::table_address(pde);
        if A::AT_BITS > 0 {
            let ate = self.ctx.read_entry(table, A::ati(la) as u64);
            t.ate = Some(ate);
            if !A::table_present(ate) {
                return t;
            }
            table = A::table_address(ate);
        }
        let pte = self.ctx.read_entry(table, A::pti(la) as u64);
        t.pte = Some(pte);
        if A::pte_present(pte) {
            t.phy = Some(A::pte_frame(pte) + A::off(la));
            t.flags = Some(A::pte_flags(pte));
        }
        t
    }

    /// Physical address `la` translates to.
    #[must_use]
    pub fn physical(&self, la: LogicalAddress) -> Option<PhysicalAddress> {
        self.translation(la).phy
    }

    /// Flags of the page mapping `la`.
    #[must_use]
    pub fn flags(&self, la: LogicalAddress) -> Option<PageFlags> {
        self.translation(la).flags
    }
}

impl<A: AddressTranslator> Drop for Directory<'_, A> {
    fn drop(&mut self) {
        if !self.owns {
            return;
        }
        let live = self
            .ctx
            .app_slots()
            .filter(|&s| self.entry(s) != 0)
            .count();
        if live > 0 {
            debug!("Directory::drop({}): {live} slots still attached", self.pd);
        }
        self.ctx
            .frames()
            .white_free(self.pd, A::pages(A::PD_SIZE));
    }
}

/// One table walk, for diagnostics.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Translation {
    pub la: LogicalAddress,
    pub pde: Option<u64>,
    pub ate: Option<u64>,
    pub pte: Option<u64>,
    pub phy: Option<PhysicalAddress>,
    pub flags: Option<PageFlags>,
}

impl fmt::Display for Translation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.la)?;
        if let Some(pde) = self.pde {
            write!(f, " pde={pde:#x}")?;
        }
        if let Some(ate) = self.ate {
            write!(f, " ate={ate:#x}")?;
        }
        if let Some(pte) = self.pte {
            write!(f, " pte={pte:#x}")?;
        }
        match (self.phy, self.flags) {
            (Some(phy), Some(flags)) => write!(f, " -> {phy} {flags:?}"),
            (Some(phy), None) => write!(f, " -> {phy}"),
            _ => f.write_str(" -> unmapped"),
        }
    }
}
