//! # Kernel synchronization primitives
//!
//! Spin locks and one-shot cells for `no_std` kernel code, plus the
//! interrupt-masking guard ([`irq`]) the memory manager uses for its coarse
//! critical sections.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::{InterruptControl, IrqGuard, IrqSpinLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
