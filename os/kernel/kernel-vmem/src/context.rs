//! # Memory kernel context
//!
//! The capability every MMU structure is built from: the frame allocator,
//! the physical mapper, the CPU translation control, the machine memory map
//! and the master page directory. Constructed once at boot and borrowed by
//! chunks, directories and tasks.

use crate::error::MmuError;
use crate::frames::{Color, FrameAlloc, PhysMapper};
use crate::mmu::MmuControl;
use crate::translator::{AddressTranslator, RawEntry};
use core::marker::PhantomData;
use core::ops::Range;
use kernel_info::MemoryMap;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use log::trace;

pub struct MemoryKernelContext<'k, A: AddressTranslator> {
    frames: &'k dyn FrameAlloc,
    mapper: &'k dyn PhysMapper,
    mmu: &'k dyn MmuControl,
    map: MemoryMap,
    master: PhysicalAddress,
    _arch: PhantomData<fn() -> A>,
}

impl<'k, A: AddressTranslator> MemoryKernelContext<'k, A> {
    /// A context over an explicit master directory.
    ///
    /// A null `master` means "no supervisor entries to clone", which is what
    /// building the master itself needs.
    pub fn new(
        frames: &'k dyn FrameAlloc,
        mapper: &'k dyn PhysMapper,
        mmu: &'k dyn MmuControl,
        map: MemoryMap,
        master: PhysicalAddress,
    ) -> Self {
        trace!("MemoryKernelContext<{}>::new(master={master})", A::NAME);
        Self {
            frames,
            mapper,
            mmu,
            map,
            master,
            _arch: PhantomData,
        }
    }

    /// The boot-time context: the directory setup left active is the master.
    pub fn boot(
        frames: &'k dyn FrameAlloc,
        mapper: &'k dyn PhysMapper,
        mmu: &'k dyn MmuControl,
        map: MemoryMap,
    ) -> Self {
        let master = if A::PAGING {
            mmu.current_root()
        } else {
            PhysicalAddress::NULL
        };
        Self::new(frames, mapper, mmu, map, master)
    }

    #[must_use]
    pub fn frames(&self) -> &'k dyn FrameAlloc {
        self.frames
    }

    #[must_use]
    pub fn mapper(&self) -> &'k dyn PhysMapper {
        self.mapper
    }

    #[must_use]
    pub fn mmu(&self) -> &'k dyn MmuControl {
        self.mmu
    }

    #[must_use]
    pub const fn memory_map(&self) -> &MemoryMap {
        &self.map
    }

    #[must_use]
    pub const fn master(&self) -> PhysicalAddress {
        self.master
    }

    /// The active root table.
    #[must_use]
    pub fn current(&self) -> PhysicalAddress {
        self.mmu.current_root()
    }

    /// Directory slots owned by each address space; all others are shared
    /// with the master.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn app_slots(&self) -> Range<usize> {
        if !A::PAGING {
            return 0..0;
        }
        let entries = A::PD_ENTRIES as usize;
        let low = (self.map.app_low >> A::PD_SHIFT) as usize;
        let high = ((self.map.app_high - 1) >> A::PD_SHIFT) as usize + 1;
        low.min(entries)..high.min(entries)
    }

    /// Kernel pointer to the frame at `pa`.
    ///
    /// # Panics
    /// If `pa` lies outside the mapper's window; frames handed to the MMU
    /// core must always be reachable.
    #[must_use]
    pub fn ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        match self.mapper.phy_to_log(pa) {
            Some(la) => la.as_mut_ptr(),
            None => panic!("{pa} is not reachable through the physical mapper"),
        }
    }

    /// Read entry `index` of the table at `table`.
    #[must_use]
    pub fn read_entry(&self, table: PhysicalAddress, index: u64) -> u64 {
        let p = self.ptr::<A::Entry>(table + index * A::ENTRY_SIZE);
        unsafe { p.read_volatile() }.to_bits()
    }

    /// Write entry `index` of the table at `table`.
    pub fn write_entry(&self, table: PhysicalAddress, index: u64, entry: u64) {
        let p = self.ptr::<A::Entry>(table + index * A::ENTRY_SIZE);
        unsafe { p.write_volatile(A::Entry::from_bits(entry)) };
    }

    /// Zero `bytes` starting at `pa`.
    pub fn zero(&self, pa: PhysicalAddress, bytes: u64) {
        let p = self.ptr::<u8>(pa);
        #[allow(clippy::cast_possible_truncation)]
        unsafe {
            core::ptr::write_bytes(p, 0, bytes as usize);
        }
    }

    /// Return `count` units to the pool they were taken from.
    pub fn release(&self, base: PhysicalAddress, count: u64, color: Color) {
        if count == 0 {
            return;
        }
        if color.is_white() {
            self.frames.white_free(base, count);
        } else {
            self.frames.free(base, count);
        }
    }

    /// Zeroed, uncolored table memory of at least `bytes`.
    pub fn table_alloc(&self, bytes: u64) -> Result<PhysicalAddress, MmuError> {
        let frames = A::pages(bytes);
        self.frames
            .calloc(frames, Color::WHITE)
            .ok_or(MmuError::OutOfMemory { requested: frames })
    }

    /// Give back table memory from [`table_alloc`](Self::table_alloc).
    pub fn table_free(&self, table: PhysicalAddress, bytes: u64) {
        if !table.is_null() {
            self.frames.white_free(table, A::pages(bytes));
        }
    }

    /// Logical alias of `pa`, for handing to the CPU.
    #[must_use]
    pub fn phy_to_log(&self, pa: PhysicalAddress) -> Option<LogicalAddress> {
        self.mapper.phy_to_log(pa)
    }
}
