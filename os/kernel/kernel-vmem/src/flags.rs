//! # Architecture-neutral page flags
//!
//! Every mapping request is phrased in [`PageFlags`]; each
//! [`AddressTranslator`](crate::AddressTranslator) translates them into its
//! native descriptor bits and back. Not every architecture can express
//! every flag (ARMv7 short descriptors have no spare bit for
//! [`CONTIGUOUS`](PageFlags::CONTIGUOUS), Sv39 without Svpbmt has no cache
//! attributes), so the flags read back from a table are the *normalized*
//! form, see [`AddressTranslator::normalize`](crate::AddressTranslator::normalize).

use bitflags::bitflags;

bitflags! {
    /// Neutral page flags.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct PageFlags: u32 {
        /// The entry maps a frame.
        const PRESENT       = 1 << 0;

        /// Readable.
        const READ          = 1 << 1;

        /// Writable. Implies readable on every supported architecture.
        const WRITE         = 1 << 2;

        /// Executable.
        const EXEC          = 1 << 3;

        /// Accessible from user mode; otherwise supervisor only.
        const USER          = 1 << 4;

        /// Caching disabled.
        const CACHE_DISABLE = 1 << 5;

        /// Write-through caching.
        const WRITE_THROUGH = 1 << 6;

        /// Backed by one physically contiguous run of frames.
        const CONTIGUOUS    = 1 << 7;

        /// Device memory (register windows); never merged or reordered.
        const IO            = 1 << 8;

        /// Supervisor read/write/execute.
        const SYS  = Self::PRESENT.bits() | Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();

        /// Application read/write/execute.
        const APP  = Self::SYS.bits() | Self::USER.bits();

        /// Application code.
        const APPC = Self::PRESENT.bits() | Self::READ.bits() | Self::EXEC.bits() | Self::USER.bits();

        /// Application data.
        const APPD = Self::PRESENT.bits() | Self::READ.bits() | Self::WRITE.bits() | Self::USER.bits();

        /// Memory-mapped I/O.
        const MMIO = Self::PRESENT.bits() | Self::READ.bits() | Self::WRITE.bits()
                   | Self::CACHE_DISABLE.bits() | Self::IO.bits();

        /// Buffers shared with bus-mastering devices.
        const DMA  = Self::PRESENT.bits() | Self::READ.bits() | Self::WRITE.bits()
                   | Self::CACHE_DISABLE.bits() | Self::CONTIGUOUS.bits();
    }
}

impl PageFlags {
    /// Ordinary write-back memory: no cache-disable, no write-through, no device semantics.
    ///
    /// Cacheable chunks prefer a single contiguous backing run; everything
    /// else is mapped one frame per entry.
    #[inline]
    #[must_use]
    pub const fn is_cacheable(self) -> bool {
        !self.intersects(
            Self::CACHE_DISABLE
                .union(Self::WRITE_THROUGH)
                .union(Self::IO),
        )
    }
}
