//! Simulated machine for the integration tests: RAM is a vector of
//! 4 KiB-aligned frames at physical [`RAM`], reached through the same
//! offset mapper the kernel uses, and the MMU only records what it is told.

#![allow(dead_code)]

use kernel_alloc::{FrameAllocator, OffsetPhysMapper};
use kernel_info::MemoryMap;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use kernel_vmem::{AddressTranslator, Directory, MemoryKernelContext, MmuControl};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Physical RAM starts here.
pub const RAM: u64 = 0x8000_0000;

/// First application slot.
pub const APP_SLOT: usize = 16;

/// Application slots available.
pub const APP_SLOTS: usize = 8;

#[repr(align(4096))]
pub struct Aligned4K([u8; 4096]);

pub struct Ram {
    frames: Vec<Aligned4K>,
}

impl Ram {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames).map(|_| Aligned4K([0; 4096])).collect(),
        }
    }

    pub fn base(&self) -> PhysicalAddress {
        PhysicalAddress::new(RAM)
    }

    pub fn top(&self) -> PhysicalAddress {
        self.base() + self.size()
    }

    pub fn size(&self) -> u64 {
        self.frames.len() as u64 * 4096
    }

    pub fn host(&self) -> LogicalAddress {
        LogicalAddress::from_ptr(self.frames.as_ptr())
    }

    pub fn mapper(&self) -> OffsetPhysMapper {
        unsafe { OffsetPhysMapper::new(self.base(), self.size(), self.host()) }
    }
}

#[derive(Default)]
pub struct SoftMmu {
    root: AtomicU64,
    pub flushes: AtomicUsize,
    pub ranged: AtomicUsize,
}

impl MmuControl for SoftMmu {
    fn current_root(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.root.load(Ordering::Relaxed))
    }

    fn set_root(&self, root: PhysicalAddress) {
        self.root.store(root.as_u64(), Ordering::Relaxed);
    }

    fn flush_tlb(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn flush_tlb_range(&self, _base: LogicalAddress, _len: u64) {
        self.ranged.fetch_add(1, Ordering::Relaxed);
    }
}

/// Application window of [`APP_SLOTS`] slots from [`APP_SLOT`].
pub fn memory_map<A: AddressTranslator>(ram: &Ram) -> MemoryMap {
    let slot = |s: usize| (s as u64) << A::PD_SHIFT;
    MemoryMap {
        ram_base: RAM,
        ram_size: ram.size(),
        phy_mem: ram.host().as_u64(),
        app_low: slot(APP_SLOT),
        app_high: slot(APP_SLOT + APP_SLOTS),
        app_code: slot(APP_SLOT),
        app_data: slot(APP_SLOT + 1),
        sys: slot(APP_SLOT + APP_SLOTS),
    }
}

pub struct Machine<'a, A: AddressTranslator> {
    pub ctx: &'a MemoryKernelContext<'a, A>,
    pub frames: &'a FrameAllocator<'a>,
    pub mmu: &'a SoftMmu,
}

impl<A: AddressTranslator> Machine<'_, A> {
    /// Logical base of application slot `i`.
    pub fn slot(&self, i: usize) -> LogicalAddress {
        A::slot_address(APP_SLOT + i)
    }
}

/// Boot a machine with `frames` frames of RAM, all free except the master
/// directory, which is active.
pub fn with_machine<A: AddressTranslator, R>(
    frames: usize,
    f: impl FnOnce(&Machine<'_, A>) -> R,
) -> R {
    let ram = Ram::new(frames);
    let mapper = ram.mapper();
    let alloc = FrameAllocator::<1>::new(&mapper, A::OFFSET_BITS);
    unsafe { alloc.add_region(ram.base(), ram.top()) }.expect("test RAM");
    let mmu = SoftMmu::default();
    let map = memory_map::<A>(&ram);

    if A::PAGING {
        let boot = MemoryKernelContext::<A>::new(&alloc, &mapper, &mmu, map, PhysicalAddress::NULL);
        let master = Directory::new(&boot).expect("master directory").into_raw();
        mmu.set_root(master);
    }
    let ctx = MemoryKernelContext::<A>::boot(&alloc, &mapper, &mmu, map);
    f(&Machine {
        ctx: &ctx,
        frames: &alloc,
        mmu: &mmu,
    })
}
