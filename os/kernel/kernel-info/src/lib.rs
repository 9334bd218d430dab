//! # Kernel Configuration and Boot Interface
//!
//! The authoritative source for the machine memory maps, the compile-time
//! tunables of the MMU and the process model, and the [`SystemInfo`]
//! structure the setup stage leaves behind for the kernel.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! * **Physical RAM**: base and size per machine
//! * **Physical alias**: the logical window (`phy_mem`) through which the
//!   kernel touches any frame
//! * **Application window**: `[app_low, app_high)`; the page-directory
//!   slots covering it belong to each address space, all others are
//!   cloned from the master directory
//!
//! ```text
//! SiFive-U logical layout (Sv39, one row per group of 1 GiB root slots):
//!
//! 0x00_0000_0000 ┌─────────────────────────────────┐
//!                │   I/O window                    │
//! 0x00_8000_0000 ├─────────────────────────────────┤ phy_mem = ram_base
//!                │   RAM (identity, kernel view)   │
//! 0x10_0000_0000 ├─────────────────────────────────┤ app_low = app_code
//!                │   Application code              │
//! 0x10_4000_0000 ├─────────────────────────────────┤ app_data
//!                │   data, stacks, attached chunks │
//! 0x30_0000_0000 ├─────────────────────────────────┤ app_high = sys
//!                │   System                        │
//! 0x3F_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ### Tunables ([`config`])
//! Cache colors, uncolored reserve, default stack sizes.
//!
//! ### Boot Information ([`boot`])
//! `#[repr(C)]` hand-off from setup: free physical ranges, the master page
//! directory, the page tables setup built for the application image and
//! the image's load map.
//!
//! All layout constants are checked at compile time with `const` asserts.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod config;
pub mod memory;

pub use crate::boot::SystemInfo;
pub use crate::memory::MemoryMap;
