//! # Address spaces
//!
//! One [`Directory`] per task. The address space is what segments get
//! attached to; the directory is how.

use crate::chunk::Chunk;
use crate::context::MemoryKernelContext;
use crate::directory::Directory;
use crate::error::MmuError;
use crate::translator::AddressTranslator;
use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};

pub struct AddressSpace<'k, A: AddressTranslator> {
    directory: Directory<'k, A>,
}

impl<'k, A: AddressTranslator> AddressSpace<'k, A> {
    /// A fresh address space with its own directory.
    pub fn new(ctx: &'k MemoryKernelContext<'k, A>) -> Result<Self, MmuError> {
        Ok(Self {
            directory: Directory::new(ctx)?,
        })
    }

    /// The active address space, borrowed. Used by the boot task.
    #[must_use]
    pub fn from_current(ctx: &'k MemoryKernelContext<'k, A>) -> Self {
        Self {
            directory: Directory::current(ctx),
        }
    }

    pub fn attach(&mut self, chunk: &Chunk<'k, A>) -> Result<LogicalAddress, MmuError> {
        self.directory.attach(chunk)
    }

    pub fn attach_from(
        &mut self,
        chunk: &Chunk<'k, A>,
        from: usize,
    ) -> Result<LogicalAddress, MmuError> {
        self.directory.attach_from(chunk, from)
    }

    pub fn attach_at(
        &mut self,
        chunk: &Chunk<'k, A>,
        addr: LogicalAddress,
    ) -> Result<LogicalAddress, MmuError> {
        self.directory.attach_at(chunk, addr)
    }

    pub fn detach(&mut self, chunk: &Chunk<'k, A>) -> Result<(), MmuError> {
        self.directory.detach(chunk)
    }

    pub fn detach_at(&mut self, chunk: &Chunk<'k, A>, addr: LogicalAddress) -> Result<(), MmuError> {
        self.directory.detach_at(chunk, addr)
    }

    #[must_use]
    pub fn physical(&self, la: LogicalAddress) -> Option<PhysicalAddress> {
        self.directory.physical(la)
    }

    #[must_use]
    pub const fn pd(&self) -> PhysicalAddress {
        self.directory.pd()
    }

    #[must_use]
    pub const fn directory(&self) -> &Directory<'k, A> {
        &self.directory
    }

    pub fn activate(&self) {
        self.directory.activate();
    }
}
