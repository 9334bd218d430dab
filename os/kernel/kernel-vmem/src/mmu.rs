//! # CPU translation control
//!
//! The few privileged operations the MMU core needs from the CPU: read and
//! install the translation root, invalidate TLB entries, order table
//! writes against the table walker.

use kernel_memory_addresses::{LogicalAddress, PhysicalAddress};

pub trait MmuControl: Sync {
    /// Physical address of the active root table.
    fn current_root(&self) -> PhysicalAddress;

    /// Install `root` as the active root table.
    fn set_root(&self, root: PhysicalAddress);

    /// Invalidate the whole TLB.
    fn flush_tlb(&self);

    /// Invalidate translations of `[base, base + len)`.
    ///
    /// Falls back to a full flush where the CPU has no range invalidation.
    fn flush_tlb_range(&self, base: LogicalAddress, len: u64) {
        let _ = (base, len);
        self.flush_tlb();
    }

    /// Make prior table writes visible to the table walker.
    fn barrier(&self) {}
}

/// Supervisor-mode Sv39 control through `satp` and `sfence.vma`.
#[cfg(target_arch = "riscv64")]
pub struct Sv39Control;

#[cfg(target_arch = "riscv64")]
impl Sv39Control {
    const MODE_SV39: u64 = 8 << 60;
    const PPN_MASK: u64 = (1 << 44) - 1;
}

#[cfg(target_arch = "riscv64")]
impl MmuControl for Sv39Control {
    fn current_root(&self) -> PhysicalAddress {
        let satp: u64;
        unsafe { core::arch::asm!("csrr {}, satp", out(reg) satp, options(nomem, nostack)) };
        PhysicalAddress::new((satp & Self::PPN_MASK) << 12)
    }

    fn set_root(&self, root: PhysicalAddress) {
        let satp = Self::MODE_SV39 | (root.as_u64() >> 12);
        unsafe {
            core::arch::asm!("csrw satp, {}", "sfence.vma", in(reg) satp, options(nostack));
        }
    }

    fn flush_tlb(&self) {
        unsafe { core::arch::asm!("sfence.vma", options(nostack)) };
    }

    fn flush_tlb_range(&self, base: LogicalAddress, len: u64) {
        // Past a handful of pages a full flush is cheaper.
        if len > 64 * 4096 {
            self.flush_tlb();
            return;
        }
        let mut page = base.align_down(4096).as_u64();
        let end = base.as_u64().saturating_add(len);
        while page < end {
            unsafe { core::arch::asm!("sfence.vma {}, zero", in(reg) page, options(nostack)) };
            page += 4096;
        }
    }

    fn barrier(&self) {
        unsafe { core::arch::asm!("fence rw, rw", options(nostack)) };
    }
}

/// ARMv7-A control through `TTBR0` and the CP15 TLB maintenance operations.
#[cfg(target_arch = "arm")]
pub struct Armv7Control;

#[cfg(target_arch = "arm")]
impl MmuControl for Armv7Control {
    fn current_root(&self) -> PhysicalAddress {
        let ttbr0: u32;
        unsafe {
            core::arch::asm!("mrc p15, 0, {}, c2, c0, 0", out(reg) ttbr0, options(nomem, nostack));
        }
        PhysicalAddress::new(u64::from(ttbr0 & !0x3FFF))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn set_root(&self, root: PhysicalAddress) {
        let ttbr0 = root.as_u64() as u32;
        unsafe {
            core::arch::asm!(
                "mcr p15, 0, {0}, c2, c0, 0",
                "mcr p15, 0, {1}, c8, c7, 0",
                "dsb",
                "isb",
                in(reg) ttbr0,
                in(reg) 0u32,
                options(nostack)
            );
        }
    }

    fn flush_tlb(&self) {
        unsafe {
            core::arch::asm!("mcr p15, 0, {}, c8, c7, 0", "dsb", "isb", in(reg) 0u32, options(nostack));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn flush_tlb_range(&self, base: LogicalAddress, len: u64) {
        if len > 64 * 4096 {
            self.flush_tlb();
            return;
        }
        let mut page = base.align_down(4096).as_u64();
        let end = base.as_u64().saturating_add(len);
        while page < end {
            unsafe {
                core::arch::asm!("mcr p15, 0, {}, c8, c7, 1", in(reg) page as u32, options(nostack));
            }
            page += 4096;
        }
        unsafe { core::arch::asm!("dsb", "isb", options(nostack)) };
    }

    fn barrier(&self) {
        unsafe { core::arch::asm!("dsb", options(nostack)) };
    }
}
