//! # Collaborators
//!
//! The task layer decides *which* threads exist and what state they are
//! in. Ordering them, switching between them and building their first
//! register frame belongs to the [`Scheduler`] and the [`ContextInit`]
//! implementations the kernel plugs in.

use crate::thread::{Link, State, ThreadId};
use kernel_memory_addresses::LogicalAddress;

/// The ready queue and dispatcher.
///
/// Implementations lock internally (interrupts masked); every method may be
/// called from any thread.
pub trait Scheduler {
    /// Start tracking a new thread in `state`.
    fn insert(&self, link: Link, state: State);

    /// Forget a thread; it is finished or about to be destroyed.
    fn remove(&self, thread: ThreadId);

    /// Take a thread off the ready queue until [`resume`](Self::resume).
    fn suspend(&self, thread: ThreadId);

    fn resume(&self, thread: ThreadId);

    /// The thread's criterion changed.
    fn update(&self, link: Link);

    /// The thread on the CPU, if the scheduler runs one.
    fn running(&self) -> Option<ThreadId>;

    /// Block the running thread until `thread` finishes.
    ///
    /// The task has already recorded the caller as `WAITING`. Returns once
    /// the scheduler picks the caller again, after handing it back through
    /// [`Task::dispatch`](crate::Task::dispatch).
    fn wait_for(&self, thread: ThreadId);

    /// Make every thread blocked in [`wait_for`](Self::wait_for) on `thread`
    /// ready again. The task has already moved its own joiners to `READY`.
    fn wakeup_joiners(&self, thread: ThreadId);

    /// Pick the next thread to run. The choice is reported back through
    /// [`Task::dispatch`](crate::Task::dispatch) and
    /// [`Task::preempt`](crate::Task::preempt).
    fn reschedule(&self);
}

/// Builds a thread's initial register frame.
pub trait ContextInit {
    /// Lay out a frame on the stack ending at `top` that starts `entry`
    /// with `arg`; returns the stack pointer to restore it from.
    fn init_stack(&self, top: LogicalAddress, entry: LogicalAddress, arg: u64) -> LogicalAddress;
}
