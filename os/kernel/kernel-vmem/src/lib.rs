//! # Virtual Memory Support
//!
//! The MMU core of the kernel: page tables, chunks of mapped memory, page
//! directories and address spaces, generic over the translation format.
//!
//! ## What you get
//! - Architecture-neutral [`PageFlags`].
//! - The [`AddressTranslator`] trait plus [`Sv39`](arch::Sv39) (RISC-V),
//!   [`Armv7`](arch::Armv7) (short descriptors) and [`Flat`](arch::Flat)
//!   (no MMU); [`Target`](arch::Target) names the configured one.
//! - A [`MemoryKernelContext`] carrying the collaborators every structure
//!   needs: a [`FrameAlloc`], a [`PhysMapper`] and an [`MmuControl`].
//! - [`PageTable`] views, [`Chunk`]s and [`Segment`]s of mapped memory,
//!   [`Directory`] / [`AddressSpace`] to place them, [`DmaBuffer`] for
//!   device-visible memory.
//!
//! ## Translation
//!
//! ```text
//!   Directory            Attacher (AT)          Page table (PT)       Frame
//!  ┌──────────┐         ┌──────────┐           ┌──────────┐         ┌───────┐
//!  │ slot  i  │───────► │ entry j  │─────────► │ entry k  │───────► │ page  │
//!  └──────────┘         └──────────┘           └──────────┘         └───────┘
//!    PD_SHIFT             AT_SHIFT               PT_SHIFT            offset
//! ```
//!
//! Two-level formats skip the attacher level. A chunk owns the AT and PT
//! levels below it; a directory only ever holds pointers to a chunk's top
//! tables, so attaching and detaching is a matter of writing or clearing a
//! few directory slots.
//!
//! ## Physical memory access
//!
//! Tables live in physical frames. They are always read and written
//! through [`PhysMapper::phy_to_log`], which on a real machine adds the
//! offset of the kernel's physical memory alias and in tests points into
//! host memory.
//!
//! ## Locking
//!
//! Nothing here locks. Chunks and directories are mutated with interrupts
//! masked by the caller; the frame allocator serializes itself.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
pub mod arch;
pub mod chunk;
pub mod context;
pub mod directory;
pub mod dma;
mod error;
pub mod flags;
pub mod frames;
pub mod mmu;
pub mod page_table;
pub mod segment;
pub mod translator;

pub use crate::address_space::AddressSpace;
pub use crate::chunk::{Chunk, FrameOwnership, Layout, TableOwnership};
pub use crate::context::MemoryKernelContext;
pub use crate::directory::{Directory, Translation};
pub use crate::dma::DmaBuffer;
pub use crate::error::MmuError;
pub use crate::flags::PageFlags;
pub use crate::frames::{Color, FrameAlloc, PhysMapper};
pub use crate::mmu::MmuControl;
pub use crate::page_table::PageTable;
pub use crate::segment::Segment;
pub use crate::translator::{AddressTranslator, RawEntry};
pub use kernel_info::memory as info;
