//! # DMA buffers
//!
//! Memory shared with bus-mastering devices: one physical run, uncached,
//! attached into the address space that was active at construction so the
//! driver can fill it through [`log_address`](DmaBuffer::log_address) and
//! hand [`phy_address`](DmaBuffer::phy_address) to the device.

use crate::chunk::Chunk;
use crate::context::MemoryKernelContext;
use crate::directory::Directory;
use crate::error::MmuError;
use crate::flags::PageFlags;
use crate::frames::Color;
use crate::translator::AddressTranslator;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};
use log::trace;

pub struct DmaBuffer<'k, A: AddressTranslator> {
    chunk: Chunk<'k, A>,
    phy: PhysicalAddress,
    log: LogicalAddress,
    root: PhysicalAddress,
}

impl<'k, A: AddressTranslator> DmaBuffer<'k, A> {
    pub fn new(ctx: &'k MemoryKernelContext<'k, A>, bytes: u64) -> Result<Self, MmuError> {
        trace!("DmaBuffer::new({bytes})");
        let chunk = Chunk::new(ctx, bytes, PageFlags::DMA, Color::WHITE)?;
        let phy = chunk.phy_address().ok_or(MmuError::NoTables)?;
        let mut directory = Directory::current(ctx);
        let log = directory.attach(&chunk)?;
        Ok(Self {
            chunk,
            phy,
            log,
            root: directory.pd(),
        })
    }

    /// A buffer holding a copy of `data`.
    pub fn with_data(ctx: &'k MemoryKernelContext<'k, A>, data: &[u8]) -> Result<Self, MmuError> {
        let buffer = Self::new(ctx, data.len() as u64)?;
        let dst = ctx.ptr::<u8>(buffer.phy);
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(buffer)
    }

    #[must_use]
    pub const fn phy_address(&self) -> PhysicalAddress {
        self.phy
    }

    #[must_use]
    pub const fn log_address(&self) -> LogicalAddress {
        self.log
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.chunk.size()
    }

    #[must_use]
    pub const fn chunk(&self) -> &Chunk<'k, A> {
        &self.chunk
    }
}

impl<A: AddressTranslator> Drop for DmaBuffer<'_, A> {
    fn drop(&mut self) {
        // Failure is already logged; the chunk goes away regardless.
        let _ = Directory::wrap(self.chunk.context(), self.root).detach_at(&self.chunk, self.log);
    }
}
