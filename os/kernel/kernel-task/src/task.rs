//! # Tasks
//!
//! A [`Task`] is the composition root of a process: one address space, a
//! code and a data segment attached at the machine's fixed application
//! offsets, and the threads running in it. Exactly one of them is the
//! task's main thread.
//!
//! Dropping a task tears it down in order: threads (and their stacks)
//! first, then the code and data segments, then the address space.

use crate::error::TaskError;
use crate::scheduler::{ContextInit, Scheduler};
use crate::thread::{Configuration, Criterion, State, Thread, ThreadId};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::config::MAX_THREADS;
use kernel_memory_addresses::LogicalAddress;
use kernel_vmem::{AddressSpace, AddressTranslator, MemoryKernelContext, PageFlags, Segment};
use log::{debug, trace, warn};

/// Kernel-wide unique task identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// The collaborators every task is built from.
pub struct TaskKernelContext<'k, A: AddressTranslator> {
    pub memory: &'k MemoryKernelContext<'k, A>,
    pub scheduler: &'k dyn Scheduler,
    pub cpu: &'k dyn ContextInit,
}

/// Who the code and data segments belong to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SegmentOwnership {
    /// Built for this task.
    Owns,
    /// Shared with the task this one was forked from. The memory goes away
    /// with the last task holding it.
    Shares,
}

struct Image<'k, A: AddressTranslator> {
    code_segment: Arc<Segment<'k, A>>,
    data_segment: Arc<Segment<'k, A>>,
    code: LogicalAddress,
    data: LogicalAddress,
    entry: LogicalAddress,
}

pub struct Task<'k, A: AddressTranslator> {
    id: TaskId,
    kernel: &'k TaskKernelContext<'k, A>,
    threads: BTreeMap<ThreadId, Thread<'k, A>>,
    code_segment: Arc<Segment<'k, A>>,
    data_segment: Arc<Segment<'k, A>>,
    space: AddressSpace<'k, A>,
    code: LogicalAddress,
    data: LogicalAddress,
    entry: LogicalAddress,
    main: ThreadId,
    segments: SegmentOwnership,
}

impl<'k, A: AddressTranslator> Task<'k, A> {
    /// A task over fresh `code` and `data`, started at byte `entry` of the
    /// code segment.
    ///
    /// The segments are attached at the application code and data offsets
    /// of the memory map in a new address space; the main thread starts
    /// out `READY`.
    pub fn new(
        kernel: &'k TaskKernelContext<'k, A>,
        code: Segment<'k, A>,
        data: Segment<'k, A>,
        entry: u64,
    ) -> Result<Self, TaskError> {
        trace!("Task::new(code={}, data={}, entry={entry:#x})", code.size(), data.size());
        check_entry(&code, entry)?;
        let map = kernel.memory.memory_map();
        let mut space = AddressSpace::new(kernel.memory)?;
        let code_at = space.attach_at(&code, LogicalAddress::new(map.app_code))?;
        let data_at = space.attach_at(&data, LogicalAddress::new(map.app_data))?;

        let image = Image {
            code_segment: Arc::new(code),
            data_segment: Arc::new(data),
            code: code_at,
            data: data_at,
            entry: code_at + entry,
        };
        let main = Configuration::new(State::Ready, Criterion::MAIN);
        Self::assemble(kernel, space, image, SegmentOwnership::Owns, main, 0)
    }

    /// A child sharing this task's code and data, at the same addresses,
    /// in an address space of its own.
    pub fn fork(&self, entry: u64) -> Result<Self, TaskError> {
        trace!("Task::fork({}, entry={entry:#x})", self.id);
        check_entry(&self.code_segment, entry)?;
        let mut space = AddressSpace::new(self.kernel.memory)?;
        space.attach_at(&self.code_segment, self.code)?;
        space.attach_at(&self.data_segment, self.data)?;

        let image = Image {
            code_segment: Arc::clone(&self.code_segment),
            data_segment: Arc::clone(&self.data_segment),
            code: self.code,
            data: self.data,
            entry: self.code + entry,
        };
        let main = Configuration::new(State::Ready, Criterion::MAIN);
        Self::assemble(self.kernel, space, image, SegmentOwnership::Shares, main, 0)
    }

    /// The first task: runs in the active address space over segments that
    /// are already attached there. Its main thread is the one running.
    pub fn bootstrap(
        kernel: &'k TaskKernelContext<'k, A>,
        code: (Segment<'k, A>, LogicalAddress),
        data: (Segment<'k, A>, LogicalAddress),
        entry: LogicalAddress,
        arg: u64,
    ) -> Result<Self, TaskError> {
        trace!("Task::bootstrap(code={}, data={}, entry={entry})", code.1, data.1);
        let image = Image {
            code_segment: Arc::new(code.0),
            data_segment: Arc::new(data.0),
            code: code.1,
            data: data.1,
            entry,
        };
        let space = AddressSpace::from_current(kernel.memory);
        let main = Configuration::new(State::Running, Criterion::MAIN);
        Self::assemble(kernel, space, image, SegmentOwnership::Owns, main, arg)
    }

    fn assemble(
        kernel: &'k TaskKernelContext<'k, A>,
        space: AddressSpace<'k, A>,
        image: Image<'k, A>,
        segments: SegmentOwnership,
        main: Configuration,
        arg: u64,
    ) -> Result<Self, TaskError> {
        let mut task = Self {
            id: TaskId::next(),
            kernel,
            threads: BTreeMap::new(),
            code_segment: image.code_segment,
            data_segment: image.data_segment,
            space,
            code: image.code,
            data: image.data,
            entry: image.entry,
            main: ThreadId::next(),
            segments,
        };
        task.start(task.main, main, task.entry, arg)?;
        debug!(
            "Task {}: pd={}, code={}, data={}, entry={}, {:?}",
            task.id, task.space.pd(), task.code, task.data, task.entry, task.segments
        );
        Ok(task)
    }

    /// Create a thread in this task.
    pub fn spawn(
        &mut self,
        conf: Configuration,
        entry: LogicalAddress,
        arg: u64,
    ) -> Result<ThreadId, TaskError> {
        let id = ThreadId::next();
        self.start(id, conf, entry, arg)?;
        Ok(id)
    }

    fn start(
        &mut self,
        id: ThreadId,
        conf: Configuration,
        entry: LogicalAddress,
        arg: u64,
    ) -> Result<(), TaskError> {
        if self.threads.len() >= MAX_THREADS {
            warn!("Task::spawn: {} already runs {MAX_THREADS} threads", self.id);
            return Err(TaskError::TooManyThreads { limit: MAX_THREADS });
        }

        let stack = if conf.stack_size > 0 {
            let segment = Segment::new(
                self.kernel.memory,
                conf.stack_size,
                PageFlags::APPD,
                self.code_segment.color(),
            )?;
            let at = self.space.attach(&segment)?;
            Some((segment, at))
        } else {
            None
        };
        let context = stack.as_ref().map_or(LogicalAddress::NULL, |(segment, at)| {
            self.kernel.cpu.init_stack(*at + segment.size(), entry, arg)
        });

        let thread = Thread::new(id, &conf, stack, context);
        self.kernel.scheduler.insert(thread.link(), conf.state);
        debug!(
            "Task::spawn: {id} in {} ({:?}, {:?}, stack {:?})",
            self.id,
            conf.state,
            conf.criterion,
            thread.stack()
        );
        self.threads.insert(id, thread);
        Ok(())
    }

    /// Take a thread down, stack included.
    pub fn destroy_thread(&mut self, id: ThreadId) -> Result<(), TaskError> {
        trace!("Task::destroy_thread({id})");
        let mut thread = self.threads.remove(&id).ok_or(TaskError::NoSuchThread(id))?;
        if thread.state() != State::Finishing {
            self.kernel.scheduler.remove(id);
            self.wake_joiners(id);
        }
        self.release_stack(&mut thread);
        Ok(())
    }

    fn release_stack(&mut self, thread: &mut Thread<'k, A>) {
        if let Some((segment, at)) = thread.stack.take()
            && let Err(e) = self.space.detach_at(&segment, at)
        {
            warn!("Task: stack of {} was not attached at {at}: {e}", thread.id());
        }
    }

    /// Threads of this task waiting for `id` become ready, then the
    /// scheduler wakes its own waiters.
    fn wake_joiners(&mut self, id: ThreadId) {
        for joiner in self.threads.values_mut().filter(|t| t.joining() == Some(id)) {
            trace!("Task: {} no longer waits for {id}", joiner.id());
            joiner.set_state(State::Ready);
        }
        self.kernel.scheduler.wakeup_joiners(id);
    }

    /// Whether `thread` holds the CPU, by its own record or the scheduler's.
    fn on_cpu(&self, thread: &Thread<'k, A>) -> bool {
        thread.state() == State::Running || self.kernel.scheduler.running() == Some(thread.id())
    }

    /// The scheduler switched to `id`: `READY` becomes `RUNNING`.
    pub fn dispatch(&mut self, id: ThreadId) -> Result<(), TaskError> {
        self.transition(id, State::Ready, State::Running)
    }

    /// The scheduler took the CPU away from `id`: `RUNNING` becomes `READY`.
    pub fn preempt(&mut self, id: ThreadId) -> Result<(), TaskError> {
        self.transition(id, State::Running, State::Ready)
    }

    fn transition(&mut self, id: ThreadId, from: State, to: State) -> Result<(), TaskError> {
        let thread = self.thread_mut(id)?;
        if thread.state() != from {
            return Err(TaskError::BadTransition {
                thread: id,
                from: thread.state(),
                to,
            });
        }
        trace!("Task: {id} {from:?} -> {to:?}");
        thread.set_state(to);
        Ok(())
    }

    /// Finish a thread with `status`; joiners are woken.
    pub fn exit(&mut self, id: ThreadId, status: i32) -> Result<(), TaskError> {
        trace!("Task::exit({id}, {status})");
        let thread = self.thread(id)?;
        if thread.state() == State::Finishing {
            return Ok(());
        }
        let running = self.on_cpu(thread);
        self.thread_mut(id)?.finish(status);
        self.kernel.scheduler.remove(id);
        self.wake_joiners(id);
        if running {
            self.kernel.scheduler.reschedule();
        }
        Ok(())
    }

    pub fn suspend(&mut self, id: ThreadId) -> Result<(), TaskError> {
        let thread = self.thread(id)?;
        if matches!(thread.state(), State::Finishing | State::Suspended) {
            return Ok(());
        }
        let running = self.on_cpu(thread);
        self.thread_mut(id)?.set_state(State::Suspended);
        self.kernel.scheduler.suspend(id);
        if running {
            self.kernel.scheduler.reschedule();
        }
        Ok(())
    }

    pub fn resume(&mut self, id: ThreadId) -> Result<(), TaskError> {
        let scheduler = self.kernel.scheduler;
        let thread = self.thread_mut(id)?;
        if thread.state() == State::Suspended {
            thread.set_state(State::Ready);
            scheduler.resume(id);
        }
        Ok(())
    }

    pub fn set_priority(&mut self, id: ThreadId, criterion: Criterion) -> Result<(), TaskError> {
        let scheduler = self.kernel.scheduler;
        let thread = self.thread_mut(id)?;
        thread.set_priority(criterion);
        scheduler.update(thread.link());
        Ok(())
    }

    /// Wait for a thread to finish and return its exit status.
    ///
    /// Unless the target has finished already, the running thread is
    /// recorded as `WAITING` on it (when it belongs to this task) and blocks
    /// in [`Scheduler::wait_for`]. Exiting or destroying the target makes it
    /// `READY`; the scheduler [`dispatch`](Self::dispatch)es it from there.
    pub fn join_thread(&mut self, id: ThreadId) -> Result<i32, TaskError> {
        trace!("Task::join_thread({id})");
        let scheduler = self.kernel.scheduler;
        let caller = scheduler.running();
        if caller == Some(id) {
            return Err(TaskError::JoinSelf(id));
        }
        if self.thread(id)?.state() != State::Finishing {
            if let Some(joiner) = caller.and_then(|c| self.threads.get_mut(&c)) {
                joiner.wait_on(id);
            }
            scheduler.wait_for(id);
        }
        self.thread(id)?.status().ok_or(TaskError::NotFinished(id))
    }

    /// [`join_thread`](Self::join_thread) on the main thread.
    pub fn join(&mut self) -> Result<i32, TaskError> {
        self.join_thread(self.main)
    }

    /// Switch the CPU to this task's address space.
    pub fn activate(&self) {
        trace!("Task::activate({})", self.id);
        self.space.activate();
    }

    fn thread_mut(&mut self, id: ThreadId) -> Result<&mut Thread<'k, A>, TaskError> {
        self.threads.get_mut(&id).ok_or(TaskError::NoSuchThread(id))
    }

    pub fn thread(&self, id: ThreadId) -> Result<&Thread<'k, A>, TaskError> {
        self.threads.get(&id).ok_or(TaskError::NoSuchThread(id))
    }

    pub fn threads(&self) -> impl Iterator<Item = &Thread<'k, A>> {
        self.threads.values()
    }

    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub const fn address_space(&self) -> &AddressSpace<'k, A> {
        &self.space
    }

    /// Logical base of the code segment.
    #[must_use]
    pub const fn code(&self) -> LogicalAddress {
        self.code
    }

    /// Logical base of the data segment.
    #[must_use]
    pub const fn data(&self) -> LogicalAddress {
        self.data
    }

    #[must_use]
    pub fn code_segment(&self) -> &Segment<'k, A> {
        &self.code_segment
    }

    #[must_use]
    pub fn data_segment(&self) -> &Segment<'k, A> {
        &self.data_segment
    }

    #[must_use]
    pub const fn entry(&self) -> LogicalAddress {
        self.entry
    }

    #[must_use]
    pub const fn main(&self) -> ThreadId {
        self.main
    }

    #[must_use]
    pub fn owns_segments(&self) -> bool {
        self.segments == SegmentOwnership::Owns
    }

    #[must_use]
    pub const fn segment_ownership(&self) -> SegmentOwnership {
        self.segments
    }
}

fn check_entry<A: AddressTranslator>(code: &Segment<'_, A>, entry: u64) -> Result<(), TaskError> {
    if entry >= code.size() {
        return Err(TaskError::EntryOutsideCode {
            offset: entry,
            size: code.size(),
        });
    }
    Ok(())
}

impl<A: AddressTranslator> Drop for Task<'_, A> {
    fn drop(&mut self) {
        trace!("Task::drop({}, {} threads)", self.id, self.threads.len());
        while let Some((id, mut thread)) = self.threads.pop_first() {
            if thread.state() != State::Finishing {
                self.kernel.scheduler.remove(id);
            }
            self.release_stack(&mut thread);
        }

        for (segment, at) in [(&self.code_segment, self.code), (&self.data_segment, self.data)] {
            if let Err(e) = self.space.detach_at(segment, at) {
                warn!("Task::drop: segment at {at} of {} was not attached: {e}", self.id);
            }
        }
        match self.segments {
            SegmentOwnership::Owns => debug!("Task::drop({}): releasing code and data", self.id),
            SegmentOwnership::Shares => debug!(
                "Task::drop({}): code and data stay with {} other holder(s)",
                self.id,
                Arc::strong_count(&self.code_segment) - 1
            ),
        }
    }
}
