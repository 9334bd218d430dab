mod common;

use common::{APP_SLOT, APP_SLOTS, Ram, SoftMmu, memory_map, with_machine};
use kernel_alloc::FrameAllocator;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use kernel_vmem::arch::{Armv7, Flat, Sv39};
use kernel_vmem::{
    AddressTranslator, Chunk, Color, Directory, DmaBuffer, FrameAlloc, Layout, MemoryKernelContext,
    MmuError, PageFlags,
};
use std::cell::Cell;
use std::sync::atomic::Ordering;

thread_local! {
    static WARNINGS: Cell<usize> = const { Cell::new(0) };
}

/// Counts warnings per thread, so parallel tests do not see each other's.
struct WarningCounter;

impl log::Log for WarningCounter {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            WARNINGS.with(|w| w.set(w.get() + 1));
        }
    }

    fn flush(&self) {}
}

/// Warnings logged on this thread so far.
fn warnings() -> usize {
    static LOGGER: WarningCounter = WarningCounter;
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Warn);
    }
    WARNINGS.with(Cell::get)
}

#[test]
fn chunk_size_and_release() {
    with_machine::<Sv39, _>(64, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let chunk = Chunk::new(m.ctx, 5 * 4096 + 1, PageFlags::APPD, Color::WHITE).unwrap();
        assert_eq!(chunk.size(), 6 * 4096);
        // Six pages, one leaf table, one attacher table.
        assert_eq!(m.frames.allocable(Color::WHITE), before - 8);
        drop(chunk);
        assert_eq!(m.frames.allocable(Color::WHITE), before);
        assert_eq!(m.frames.runs(Color::WHITE), 1);
    });
}

#[test]
fn zero_sized_requests() {
    with_machine::<Sv39, _>(16, |m| {
        let before = m.frames.allocable(Color::WHITE);
        assert_eq!(m.frames.alloc(0, Color::WHITE), None);
        assert!(matches!(
            Chunk::new(m.ctx, 0, PageFlags::APPD, Color::WHITE),
            Err(MmuError::Empty)
        ));
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn attached_flags_round_trip() {
    fn check<A: AddressTranslator>() {
        with_machine::<A, _>(64, |m| {
            let mut dir = Directory::new(m.ctx).unwrap();
            for flags in [PageFlags::APPC, PageFlags::APPD, PageFlags::SYS, PageFlags::MMIO] {
                let chunk = Chunk::new(m.ctx, 3 * 4096, flags, Color::WHITE).unwrap();
                let la = dir.attach(&chunk).unwrap();
                for page in 0..3 {
                    let at = la + page * 4096 + 8;
                    assert_eq!(dir.flags(at), Some(chunk.flags()), "{flags:?} on {}", A::NAME);
                    assert_eq!(dir.physical(at), chunk.frame(page).map(|f| f + 8));
                }
                dir.detach(&chunk).unwrap();
            }
        });
    }
    check::<Sv39>();
    check::<Armv7>();
}

#[test]
fn uncached_chunks_are_scattered() {
    with_machine::<Armv7, _>(64, |m| {
        let mut io = Chunk::new(m.ctx, 2 * 4096, PageFlags::MMIO, Color::WHITE).unwrap();
        assert_eq!(io.layout(), Layout::Scattered);
        assert_eq!(io.phy_address(), None);
        assert_eq!(io.resize(4096), 0);
        assert_eq!(io.resize(-4096), 0);
        assert_eq!(io.size(), 2 * 4096);

        let ram = Chunk::new(m.ctx, 2 * 4096, PageFlags::SYS, Color::WHITE).unwrap();
        assert_eq!(ram.layout(), Layout::Contiguous);
        assert!(ram.phy_address().is_some());
    });
}

#[test]
fn detach_is_idempotent() {
    with_machine::<Armv7, _>(64, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let chunk = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let la = dir.attach(&chunk).unwrap();

        assert_eq!(dir.detach(&chunk), Ok(()));
        let snapshot: Vec<u64> = (0..Armv7::PD_ENTRIES)
            .map(|i| m.ctx.read_entry(dir.pd(), i))
            .collect();
        let flushes = m.mmu.ranged.load(Ordering::Relaxed);

        assert_eq!(dir.detach(&chunk), Err(MmuError::NotFound));
        assert_eq!(dir.detach_at(&chunk, la), Err(MmuError::NotAttached(la)));
        let after: Vec<u64> = (0..Armv7::PD_ENTRIES)
            .map(|i| m.ctx.read_entry(dir.pd(), i))
            .collect();
        assert_eq!(snapshot, after);
        assert_eq!(m.mmu.ranged.load(Ordering::Relaxed), flushes);
    });
}

#[test]
fn detach_invalidates_the_range() {
    with_machine::<Sv39, _>(64, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let chunk = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let la = dir.attach_at(&chunk, m.slot(3)).unwrap();
        assert_eq!(la, m.slot(3));
        dir.detach_at(&chunk, la).unwrap();
        assert_eq!(m.mmu.ranged.load(Ordering::Relaxed), 1);
        assert_eq!(dir.physical(la), None);
    });
}

#[test]
fn attach_at_checks_before_installing() {
    with_machine::<Armv7, _>(600, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let small = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let wide = Chunk::new(m.ctx, 300 * 4096, PageFlags::APPD, Color::WHITE).unwrap();
        assert_eq!(wide.slots(), 2);

        let odd = m.slot(0) + 4096;
        assert_eq!(dir.attach_at(&small, odd), Err(MmuError::Misplaced(odd)));
        assert!(matches!(
            dir.attach_at(&small, LogicalAddress::new(0)),
            Err(MmuError::OutOfRange { .. })
        ));
        assert!(matches!(
            dir.attach_at(&wide, m.slot(7)),
            Err(MmuError::OutOfRange { .. })
        ));

        dir.attach_at(&small, m.slot(1)).unwrap();
        assert_eq!(
            dir.attach_at(&wide, m.slot(0)),
            Err(MmuError::SlotOccupied { slot: 17 })
        );
        // Nothing of the wide chunk was installed.
        assert_eq!(dir.physical(m.slot(0)), None);
        assert_eq!(dir.attach_at(&wide, m.slot(2)), Ok(m.slot(2)));
    });
}

#[test]
fn three_level_wrap_without_attachers_cannot_attach() {
    with_machine::<Sv39, _>(16, |m| {
        let pt = m.ctx.table_alloc(Sv39::PT_SIZE).unwrap();
        let wrapped = Chunk::wrap(m.ctx, pt, PhysicalAddress::NULL, 0, 4, PageFlags::APPD);
        let mut dir = Directory::current(m.ctx);
        assert_eq!(dir.attach(&wrapped), Err(MmuError::NoTables));
        drop(wrapped);
        // Wrappers free nothing.
        m.ctx.table_free(pt, Sv39::PT_SIZE);
    });
}

#[test]
fn contiguous_chunks_grow_and_shrink() {
    with_machine::<Sv39, _>(64, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let mut chunk = Chunk::new(m.ctx, 2 * 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let la = dir.attach(&chunk).unwrap();
        let marker = 0x5EED_u64;
        unsafe { m.ctx.ptr::<u64>(chunk.phy_address().unwrap()).write(marker) };

        assert_eq!(chunk.resize(3 * 4096), 5 * 4096);
        assert_eq!(chunk.layout(), Layout::Contiguous);
        let phy = chunk.phy_address().unwrap();
        assert_eq!(unsafe { m.ctx.ptr::<u64>(phy).read() }, marker);
        assert_eq!(dir.physical(la + 4 * 4096), Some(phy + 4 * 4096));

        assert_eq!(chunk.resize(-3 * 4096 - 100), 2 * 4096);
        assert_eq!(dir.physical(la + 2 * 4096), None);
        assert_eq!(chunk.resize(-100 * 4096), 4096);
        assert_eq!(chunk.resize(0), 4096);
        dir.detach(&chunk).unwrap();
    });
}

#[test]
fn growth_claims_the_frame_behind_the_run() {
    with_machine::<Armv7, _>(32, |m| {
        let mut chunk = Chunk::new(m.ctx, 2 * 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let phy = chunk.phy_address().unwrap();
        let behind = phy + 4096;
        assert_eq!(chunk.resize(-4096), 4096);

        // Everything else is taken: the only free frame is the one behind.
        let mut held = Vec::new();
        while let Some(frame) = m.frames.try_alloc(1, Color::WHITE) {
            if frame != behind {
                held.push(frame);
            }
        }
        m.frames.free(behind, 1);
        assert_eq!(m.frames.allocable(Color::WHITE), 1);

        assert_eq!(chunk.resize(4096), 2 * 4096);
        assert_eq!(chunk.phy_address(), Some(phy));
        assert_eq!(chunk.frame(1), Some(behind));
        assert_eq!(m.frames.allocable(Color::WHITE), 0);

        // No room behind and no larger run: the chunk stays as it is.
        assert_eq!(chunk.resize(4096), 0);
        assert_eq!(chunk.size(), 2 * 4096);

        for frame in held {
            m.frames.free(frame, 1);
        }
    });
}

#[test]
fn growth_relocates_when_the_frames_behind_are_taken() {
    with_machine::<Sv39, _>(64, |m| {
        let mut chunk = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let phy = chunk.phy_address().unwrap();
        assert!(!m.frames.alloc_at(phy + 4096, 1, Color::WHITE));
        unsafe { m.ctx.ptr::<u64>(phy).write(0xC0FFEE) };

        assert_eq!(chunk.resize(4096), 2 * 4096);
        let moved = chunk.phy_address().unwrap();
        assert_ne!(moved, phy);
        assert_eq!(unsafe { m.ctx.ptr::<u64>(moved).read() }, 0xC0FFEE);
        assert_eq!(chunk.frame(1), Some(moved + 4096));
    });
}

#[test]
fn flat_chunks_only_grow_in_place() {
    with_machine::<Flat, _>(2, |m| {
        let above = Chunk::new(m.ctx, 64, PageFlags::SYS, Color::WHITE).unwrap();
        let mut chunk = Chunk::new(m.ctx, 32, PageFlags::SYS, Color::WHITE).unwrap();
        let phy = chunk.phy_address().unwrap();

        assert_eq!(chunk.resize(32), 0);
        assert_eq!(chunk.size(), 32);

        drop(above);
        assert_eq!(chunk.resize(32), 64);
        assert_eq!(chunk.phy_address(), Some(phy));
        assert_eq!(m.frames.allocable(Color::WHITE), (8192 - 64) / 16);
    });
}

#[test]
fn colored_chunks_take_frames_of_their_color() {
    let ram = Ram::new(64);
    let mapper = ram.mapper();
    let frames = FrameAllocator::<4>::with_reserve(&mapper, Sv39::OFFSET_BITS, 8);
    unsafe { frames.add_region(ram.base(), ram.top()) }.unwrap();
    let mmu = SoftMmu::default();
    let ctx = MemoryKernelContext::<Sv39>::new(
        &frames,
        &mapper,
        &mmu,
        memory_map::<Sv39>(&ram),
        PhysicalAddress::NULL,
    );

    for k in 0..4 {
        let color = Color::new(k);
        let before = frames.allocable(color);
        let white = frames.allocable(Color::WHITE);
        let warned = warnings();

        let chunk = Chunk::new(&ctx, 3 * 4096, PageFlags::APPD, color).unwrap();
        // Colored frames are never adjacent, and that is no cause for alarm.
        assert_eq!(chunk.layout(), Layout::Scattered);
        assert_eq!(warnings(), warned);
        for page in 0..3 {
            let frame = chunk.frame(page).unwrap();
            assert_eq!(frames.color_of(frame), color, "page {page} of {color:?}");
        }
        assert_eq!(frames.allocable(color), before - 3);

        drop(chunk);
        assert_eq!(frames.allocable(color), before);
        assert_eq!(frames.allocable(Color::WHITE), white);
    }
}

#[test]
fn attach_from_skips_lower_slots() {
    with_machine::<Armv7, _>(64, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let one = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let two = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let three = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();

        assert_eq!(dir.attach_from(&one, APP_SLOT + 3), Ok(m.slot(3)));
        // Below the application window counts from its start.
        assert_eq!(dir.attach_from(&two, 0), Ok(m.slot(0)));
        assert_eq!(dir.attach(&three), Ok(m.slot(1)));
        assert_eq!(
            dir.attach_from(&three, APP_SLOT + APP_SLOTS),
            Err(MmuError::NoFreeSlots { span: 1 })
        );
        for chunk in [&one, &two, &three] {
            dir.detach(chunk).unwrap();
        }
    });
}

#[test]
fn growth_past_the_table_moves_the_area() {
    with_machine::<Armv7, _>(600, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let mut chunk = Chunk::new(m.ctx, 256 * 4096, PageFlags::SYS, Color::WHITE).unwrap();
        assert_eq!(chunk.pts(), 1);
        assert_eq!(chunk.resize(4096), 257 * 4096);
        assert_eq!(chunk.pts(), 2);
        assert_eq!(chunk.frame(256), chunk.phy_address().map(|p| p + 256 * 4096));
        drop(chunk);
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn reflag_rewrites_every_entry() {
    with_machine::<Sv39, _>(64, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let mut chunk = Chunk::new(m.ctx, 2 * 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let la = dir.attach(&chunk).unwrap();
        let flushes = m.mmu.flushes.load(Ordering::Relaxed);
        chunk.reflag(PageFlags::APPC);
        assert_eq!(dir.flags(la + 4096), Some(PageFlags::APPC));
        assert_eq!(m.mmu.flushes.load(Ordering::Relaxed), flushes + 1);
        dir.detach(&chunk).unwrap();
    });
}

#[test]
fn dma_buffers_have_both_addresses() {
    with_machine::<Sv39, _>(64, |m| {
        let before = m.frames.allocable(Color::WHITE);
        let data = [1u8, 2, 3, 4, 5];
        let buffer = DmaBuffer::with_data(m.ctx, &data).unwrap();
        assert_eq!(buffer.size(), 4096);
        let la = buffer.log_address();
        let current = Directory::current(m.ctx);
        assert_eq!(current.physical(la), Some(buffer.phy_address()));
        let bytes = unsafe { core::slice::from_raw_parts(m.ctx.ptr::<u8>(buffer.phy_address()), 5) };
        assert_eq!(bytes, &data);
        assert_eq!(
            current.flags(la),
            Some(PageFlags::DMA - PageFlags::CACHE_DISABLE)
        );

        drop(buffer);
        assert_eq!(current.physical(la), None);
        assert_eq!(m.frames.allocable(Color::WHITE), before);
    });
}

#[test]
fn translation_describes_the_walk() {
    with_machine::<Sv39, _>(32, |m| {
        let mut dir = Directory::new(m.ctx).unwrap();
        let chunk = Chunk::new(m.ctx, 4096, PageFlags::APPD, Color::WHITE).unwrap();
        let la = dir.attach(&chunk).unwrap();
        let walk = dir.translation(la);
        assert!(walk.pde.is_some() && walk.ate.is_some() && walk.pte.is_some());
        assert!(walk.to_string().contains("->"));
        assert!(dir.translation(m.slot(5)).to_string().ends_with("unmapped"));
        dir.detach(&chunk).unwrap();
    });
}
