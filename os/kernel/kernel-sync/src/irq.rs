//! Interrupt masking for coarse kernel critical sections.
//!
//! The MMU structures (frame lists, page tables, directories) are mutated
//! with interrupts masked on the current core. How interrupts are masked is
//! an architecture concern, so the kernel installs an [`InterruptControl`]
//! once during early init; before that (and on hosted test builds) the
//! guards only provide the spin-lock half.

use crate::{SpinLock, SpinLockGuard, SyncOnceCell};
use core::ops::{Deref, DerefMut};

/// Architecture hook to mask and unmask interrupts on the current core.
pub trait InterruptControl: Sync {
    /// Mask interrupts and report whether they were enabled before.
    fn disable(&self) -> bool;

    /// Unmask interrupts.
    fn enable(&self);
}

static CONTROL: SyncOnceCell<&'static dyn InterruptControl> = SyncOnceCell::new();

/// Install the interrupt control used by every [`IrqGuard`].
///
/// Returns `false` if a different control was already installed.
pub fn install(control: &'static dyn InterruptControl) -> bool {
    let installed: *const dyn InterruptControl = *CONTROL.get_or_init(|| control);
    core::ptr::addr_eq(installed, control as *const dyn InterruptControl)
}

/// The installed interrupt control, if any.
#[must_use]
pub fn control() -> Option<&'static dyn InterruptControl> {
    CONTROL.get().copied()
}

/// RAII guard that masks interrupts on creation and restores them on drop.
///
/// Nesting is fine: an inner guard sees interrupts already masked and
/// leaves them masked when it drops.
///
/// ```rust
/// use kernel_sync::irq::IrqGuard;
///
/// {
///     let _g = IrqGuard::new(); // masked here, if a control is installed
///     // critical section
/// }
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = control().is_some_and(InterruptControl::disable);
        Self { were_enabled }
    }

    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled
            && let Some(c) = control()
        {
            c.enable();
        }
    }
}

/// A [`SpinLock`] guard that also keeps interrupts masked while held.
///
/// Field order matters: the lock is released before interrupts come back.
pub struct IrqSpinLockGuard<'a, T> {
    guard: SpinLockGuard<'a, T>,
    _irq: IrqGuard,
}

impl<T> SpinLock<T> {
    /// Mask interrupts, then spin for the lock.
    #[inline]
    pub fn lock_irq(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqSpinLockGuard { guard, _irq: irq }
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Supervisor-mode interrupt control for RISC-V (`sstatus.SIE`).
#[cfg(target_arch = "riscv64")]
pub struct RiscvSupervisor;

#[cfg(target_arch = "riscv64")]
impl InterruptControl for RiscvSupervisor {
    #[inline]
    fn disable(&self) -> bool {
        let prev: usize;
        unsafe {
            core::arch::asm!("csrrci {}, sstatus, 2", out(reg) prev, options(nomem, nostack));
        }
        prev & 2 != 0
    }

    #[inline]
    fn enable(&self) {
        unsafe { core::arch::asm!("csrsi sstatus, 2", options(nomem, nostack)) }
    }
}

/// IRQ masking for ARMv7-A (`CPSR.I`).
#[cfg(target_arch = "arm")]
pub struct ArmCpsr;

#[cfg(target_arch = "arm")]
impl InterruptControl for ArmCpsr {
    #[inline]
    fn disable(&self) -> bool {
        let cpsr: u32;
        unsafe {
            core::arch::asm!("mrs {}, cpsr", "cpsid i", out(reg) cpsr, options(nomem, nostack));
        }
        cpsr & (1 << 7) == 0
    }

    #[inline]
    fn enable(&self) {
        unsafe { core::arch::asm!("cpsie i", options(nomem, nostack)) }
    }
}
