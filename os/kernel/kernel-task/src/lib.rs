//! # Tasks and Threads
//!
//! The process model on top of the MMU core. A [`Task`] owns an
//! [`AddressSpace`](kernel_vmem::AddressSpace), its code and data
//! [`Segment`](kernel_vmem::Segment)s and a set of [`Thread`]s; a thread
//! owns a stack segment attached into its task's address space.
//!
//! ```text
//!  Task ──┬── AddressSpace ── Directory
//!         ├── code Segment ─┐
//!         ├── data Segment ─┴─ attached at the memory map's app_code / app_data
//!         └── threads ── Thread ── stack Segment (attached first fit)
//! ```
//!
//! ## Collaborators
//!
//! Ordering and switching threads is not done here. The kernel supplies a
//! [`Scheduler`] (ready queue, dispatcher, joins) and a [`ContextInit`]
//! (initial register frames) through a [`TaskKernelContext`].
//!
//! ## Forking
//!
//! [`Task::fork`] builds a child that shares the parent's code and data
//! without copying frames. The segments are reference counted; only the
//! last task holding them releases the memory, and
//! [`Task::owns_segments`] tells the original from the copies.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod bootstrap;
mod error;
pub mod scheduler;
pub mod task;
pub mod thread;

pub use crate::bootstrap::bootstrap;
pub use crate::error::TaskError;
pub use crate::scheduler::{ContextInit, Scheduler};
pub use crate::task::{SegmentOwnership, Task, TaskId, TaskKernelContext};
pub use crate::thread::{Configuration, Criterion, Link, State, Thread, ThreadId};
