//! # Kernel Log Sink
//!
//! A `log::Log` implementation for `no_std` kernels. Records are formatted
//! straight into a [`core::fmt::Write`] sink the kernel registers once its
//! console (typically the UART mediator) is up; nothing is allocated.
//!
//! ```text
//! trace!/debug!/info!/warn!/error!
//!     ↓
//! KernelLogger (level filter)
//!     ↓
//! "[LEVEL] target: message\n"
//!     ↓
//! registered sink (fmt::Write), interrupts masked while writing
//! ```
//!
//! Records logged before a sink is registered are dropped.
//!
//! ## Usage
//! ```rust,no_run
//! use core::fmt::{self, Write};
//! use kernel_log::KernelLogger;
//! use log::{LevelFilter, info};
//!
//! struct Uart;
//!
//! impl Write for Uart {
//!     fn write_str(&mut self, s: &str) -> fmt::Result {
//!         // push bytes into the transmit FIFO
//!         Ok(())
//!     }
//! }
//!
//! static mut UART: Uart = Uart;
//!
//! let logger = KernelLogger::init(LevelFilter::Debug).expect("logger initialization");
//! logger.set_sink(unsafe { &mut *core::ptr::addr_of_mut!(UART) });
//! info!("memory manager up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod logger;

pub use logger::{KernelLogger, Sink};
