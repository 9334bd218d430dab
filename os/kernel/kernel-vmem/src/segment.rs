//! # Segments
//!
//! A [`Segment`] is a chunk with a purpose (code, data, stack, device
//! window). It adds no state; address spaces and tasks traffic in segments
//! so that the purpose shows in signatures.

use crate::chunk::{Chunk, FrameOwnership};
use crate::context::MemoryKernelContext;
use crate::error::MmuError;
use crate::flags::PageFlags;
use crate::frames::Color;
use crate::translator::AddressTranslator;
use core::ops::{Deref, DerefMut};
use kernel_memory_addresses::PhysicalAddress;

pub struct Segment<'k, A: AddressTranslator>(Chunk<'k, A>);

impl<'k, A: AddressTranslator> Segment<'k, A> {
    pub fn new(
        ctx: &'k MemoryKernelContext<'k, A>,
        bytes: u64,
        flags: PageFlags,
        color: Color,
    ) -> Result<Self, MmuError> {
        Chunk::new(ctx, bytes, flags, color).map(Self)
    }

    /// A segment over device or boot memory that is not released on drop.
    pub fn io(
        ctx: &'k MemoryKernelContext<'k, A>,
        phy: PhysicalAddress,
        bytes: u64,
        flags: PageFlags,
    ) -> Result<Self, MmuError> {
        Chunk::remapped(ctx, phy, bytes, flags, FrameOwnership::Borrows).map(Self)
    }

    #[must_use]
    pub const fn from_chunk(chunk: Chunk<'k, A>) -> Self {
        Self(chunk)
    }

    #[must_use]
    pub const fn as_chunk(&self) -> &Chunk<'k, A> {
        &self.0
    }

    #[must_use]
    pub fn into_chunk(self) -> Chunk<'k, A> {
        self.0
    }
}

impl<'k, A: AddressTranslator> Deref for Segment<'k, A> {
    type Target = Chunk<'k, A>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<A: AddressTranslator> DerefMut for Segment<'_, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'k, A: AddressTranslator> From<Chunk<'k, A>> for Segment<'k, A> {
    fn from(chunk: Chunk<'k, A>) -> Self {
        Self(chunk)
    }
}
