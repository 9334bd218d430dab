//! A simulated machine with a scheduler that only takes notes.

#![allow(dead_code)]

use kernel_alloc::{FrameAllocator, OffsetPhysMapper};
use kernel_info::MemoryMap;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use kernel_task::{ContextInit, Criterion, Link, Scheduler, State, TaskKernelContext, ThreadId};
use kernel_vmem::{AddressTranslator, Directory, MemoryKernelContext, MmuControl};
use std::cell::{Cell, RefCell};

pub const RAM: u64 = 0x8000_0000;
pub const APP_SLOT: usize = 16;
pub const APP_SLOTS: usize = 8;

/// Bytes of the register frame [`FakeCpu`] pretends to push.
pub const FRAME: u64 = 64;

#[repr(align(4096))]
struct Aligned4K([u8; 4096]);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    Insert(ThreadId, State),
    Remove(ThreadId),
    Suspend(ThreadId),
    Resume(ThreadId),
    Update(ThreadId, Criterion),
    WaitFor(ThreadId),
    Wakeup(ThreadId),
    Reschedule,
}

#[derive(Default)]
pub struct NoteTaker {
    pub events: RefCell<Vec<Event>>,
    pub running: Cell<Option<ThreadId>>,
}

impl NoteTaker {
    pub fn take(&self) -> Vec<Event> {
        self.events.take()
    }

    fn note(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl Scheduler for NoteTaker {
    fn insert(&self, link: Link, state: State) {
        self.note(Event::Insert(link.thread, state));
    }

    fn remove(&self, thread: ThreadId) {
        self.note(Event::Remove(thread));
    }

    fn suspend(&self, thread: ThreadId) {
        self.note(Event::Suspend(thread));
    }

    fn resume(&self, thread: ThreadId) {
        self.note(Event::Resume(thread));
    }

    fn update(&self, link: Link) {
        self.note(Event::Update(link.thread, link.criterion));
    }

    fn running(&self) -> Option<ThreadId> {
        self.running.get()
    }

    fn wait_for(&self, thread: ThreadId) {
        self.note(Event::WaitFor(thread));
    }

    fn wakeup_joiners(&self, thread: ThreadId) {
        self.note(Event::Wakeup(thread));
    }

    fn reschedule(&self) {
        self.note(Event::Reschedule);
    }
}

/// Records every frame it is asked to build.
#[derive(Default)]
pub struct FakeCpu {
    pub frames: RefCell<Vec<(LogicalAddress, LogicalAddress, u64)>>,
}

impl ContextInit for FakeCpu {
    fn init_stack(&self, top: LogicalAddress, entry: LogicalAddress, arg: u64) -> LogicalAddress {
        self.frames.borrow_mut().push((top, entry, arg));
        LogicalAddress::new(top.as_u64() - FRAME)
    }
}

#[derive(Default)]
pub struct SoftMmu {
    root: Cell<u64>,
}

// Tests are single threaded.
unsafe impl Sync for SoftMmu {}

impl MmuControl for SoftMmu {
    fn current_root(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.root.get())
    }

    fn set_root(&self, root: PhysicalAddress) {
        self.root.set(root.as_u64());
    }

    fn flush_tlb(&self) {}
}

pub struct Machine<'a, A: AddressTranslator> {
    pub kernel: &'a TaskKernelContext<'a, A>,
    pub memory: &'a MemoryKernelContext<'a, A>,
    pub frames: &'a FrameAllocator<'a>,
    pub scheduler: &'a NoteTaker,
    pub cpu: &'a FakeCpu,
}

impl<A: AddressTranslator> Machine<'_, A> {
    /// Logical base of application slot `i`.
    pub fn slot(&self, i: usize) -> LogicalAddress {
        A::slot_address(APP_SLOT + i)
    }
}

/// Boot a machine with `frames` frames of RAM and an active master
/// directory; the application code and data slots are the first two of the
/// window.
pub fn with_machine<A: AddressTranslator, R>(
    frames: usize,
    f: impl FnOnce(&Machine<'_, A>) -> R,
) -> R {
    let ram: Vec<Aligned4K> = (0..frames).map(|_| Aligned4K([0; 4096])).collect();
    let size = frames as u64 * 4096;
    let base = PhysicalAddress::new(RAM);
    let mapper = unsafe { OffsetPhysMapper::new(base, size, LogicalAddress::from_ptr(ram.as_ptr())) };
    let alloc = FrameAllocator::<1>::new(&mapper, A::OFFSET_BITS);
    unsafe { alloc.add_region(base, base + size) }.expect("test RAM");

    let slot = |s: usize| (s as u64) << A::PD_SHIFT;
    let map = MemoryMap {
        ram_base: RAM,
        ram_size: size,
        phy_mem: ram.as_ptr() as u64,
        app_low: slot(APP_SLOT),
        app_high: slot(APP_SLOT + APP_SLOTS),
        app_code: slot(APP_SLOT),
        app_data: slot(APP_SLOT + 1),
        sys: slot(APP_SLOT + APP_SLOTS),
    };

    let mmu = SoftMmu::default();
    if A::PAGING {
        let boot = MemoryKernelContext::<A>::new(&alloc, &mapper, &mmu, map, PhysicalAddress::NULL);
        let master = Directory::new(&boot).expect("master directory").into_raw();
        mmu.set_root(master);
    }
    let memory = MemoryKernelContext::<A>::boot(&alloc, &mapper, &mmu, map);
    let scheduler = NoteTaker::default();
    let cpu = FakeCpu::default();
    let kernel = TaskKernelContext {
        memory: &memory,
        scheduler: &scheduler,
        cpu: &cpu,
    };
    f(&Machine {
        kernel: &kernel,
        memory: &memory,
        frames: &alloc,
        scheduler: &scheduler,
        cpu: &cpu,
    })
}
