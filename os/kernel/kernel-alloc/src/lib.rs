//! # Physical Memory Allocation
//!
//! The physical side of the MMU core: where frames come from and how the
//! kernel touches them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        kernel-vmem (chunks, directories, tasks)     │
//! │    • asks for runs of frames by color               │
//! │    • reads/writes tables through the mapper         │
//! └──────────────┬─────────────────────────┬────────────┘
//!                │ FrameAlloc              │ PhysMapper
//! ┌──────────────▼──────────────┐ ┌────────▼────────────┐
//! │     FrameAllocator          │ │  OffsetPhysMapper   │
//! │  • WHITE + per-color lists  │ │  • linear RAM alias │
//! │  • descending, merging      │ │  • bounds checked   │
//! │  • headers in free memory   │─►                     │
//! └─────────────────────────────┘ └─────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Frame Allocator ([`frame_alloc`])
//!
//! Free physical memory is kept in intrusive lists: each free run starts
//! with a small header (length, next run) written into the run itself, so
//! the allocator needs no memory of its own. Runs are sorted by descending
//! address and merged with both neighbors on insertion, which bounds
//! fragmentation and lets a freed range be reused as a whole.
//!
//! * **First fit from the top**: allocation walks from the highest run and
//!   carves the request off the run's upper end.
//! * **Cache coloring**: with `COLORS > 1` every frame belongs to the list
//!   of its color; an uncolored `WHITE` reserve serves page tables and
//!   other contiguous structures.
//! * **Units**: a unit is a page on paging targets and 16 bytes on flat
//!   ones, where chunks are carved straight out of RAM.
//! * **Seeding**: [`FrameAllocator::from_system_info`] adds the free ranges
//!   the setup stage reported.
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! [`OffsetPhysMapper`] translates between physical RAM and its kernel
//! alias with explicit bounds checks in both directions.
//!
//! ## Concurrency
//!
//! The lists live behind a `kernel_sync::SpinLock` that is always taken
//! with interrupts masked, the kernel's coarse exclusion for memory
//! management structures.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_alloc::{FrameAllocator, OffsetPhysMapper};
//! use kernel_info::memory::SIFIVE_U;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::{Color, FrameAlloc};
//!
//! let mapper = unsafe { OffsetPhysMapper::for_map(&SIFIVE_U) };
//! let frames = FrameAllocator::<1>::new(&mapper, 12);
//! unsafe {
//!     frames
//!         .add_region(PhysicalAddress::new(0x8040_0000), PhysicalAddress::new(0x8800_0000))
//!         .expect("boot RAM");
//! }
//! if let Some(frame) = frames.alloc(1, Color::WHITE) {
//!     frames.free(frame, 1);
//! }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;
pub mod frame_alloc;
mod free_list;
pub mod phys_mapper;

pub use crate::error::AllocError;
pub use crate::frame_alloc::FrameAllocator;
pub use crate::phys_mapper::OffsetPhysMapper;
