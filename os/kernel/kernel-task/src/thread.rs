//! # Threads
//!
//! A [`Thread`] is a stack, a saved context and a scheduling link. It is
//! always owned by a [`Task`](crate::Task): the task attaches the stack
//! into its address space, and only the task can take it down again.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::config::STACK_SIZE;
use kernel_memory_addresses::LogicalAddress;
use kernel_vmem::{AddressTranslator, Segment};

/// Kernel-wide unique thread identifier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Scheduling state.
///
/// ```text
///            dispatch
///   READY ───────────► RUNNING ──► FINISHING
///     ▲ ◄─────────────   │ │           ▲
///     │     preempt      │ │ join      │
///     │                  │ ▼           │
///     ├──── wakeup ─── WAITING ────────┤
///     │                  │ suspend     │
///     └──── resume ── SUSPENDED ───────┘
/// ```
///
/// Every state but `FINISHING` can be suspended; only `READY` threads are
/// dispatched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Running,
    Ready,
    Suspended,
    Waiting,
    /// Terminal; the thread has exited and waits to be destroyed.
    Finishing,
}

/// Scheduling rank, opaque to the task layer. Lower ranks run first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Criterion(u8);

impl Criterion {
    /// Main thread of a task.
    pub const MAIN: Self = Self(0);
    pub const HIGH: Self = Self(1);
    pub const NORMAL: Self = Self(63);
    pub const LOW: Self = Self(127);
    /// Runs when nothing else can.
    pub const IDLE: Self = Self(u8::MAX);

    #[must_use]
    pub const fn new(rank: u8) -> Self {
        Self(rank)
    }

    #[must_use]
    pub const fn rank(self) -> u8 {
        self.0
    }
}

impl Default for Criterion {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// How a thread starts out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Configuration {
    pub state: State,
    pub criterion: Criterion,
    /// Bytes of stack segment; `0` gives the thread no stack of its own.
    pub stack_size: u64,
}

impl Configuration {
    #[must_use]
    pub const fn new(state: State, criterion: Criterion) -> Self {
        Self {
            state,
            criterion,
            stack_size: STACK_SIZE,
        }
    }

    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: u64) -> Self {
        self.stack_size = stack_size;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(State::Ready, Criterion::NORMAL)
    }
}

/// What the scheduler gets to see of a thread.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Link {
    pub thread: ThreadId,
    pub criterion: Criterion,
}

pub struct Thread<'k, A: AddressTranslator> {
    id: ThreadId,
    state: State,
    criterion: Criterion,
    /// Stack segment and where it is attached.
    pub(crate) stack: Option<(Segment<'k, A>, LogicalAddress)>,
    context: LogicalAddress,
    status: Option<i32>,
    /// The thread a `WAITING` thread joins.
    joining: Option<ThreadId>,
}

impl<'k, A: AddressTranslator> Thread<'k, A> {
    pub(crate) fn new(
        id: ThreadId,
        conf: &Configuration,
        stack: Option<(Segment<'k, A>, LogicalAddress)>,
        context: LogicalAddress,
    ) -> Self {
        Self {
            id,
            state: conf.state,
            criterion: conf.criterion,
            stack,
            context,
            status: None,
            joining: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ThreadId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    pub(crate) const fn set_state(&mut self, state: State) {
        self.state = state;
        self.joining = None;
    }

    pub(crate) const fn wait_on(&mut self, target: ThreadId) {
        self.state = State::Waiting;
        self.joining = Some(target);
    }

    /// The thread this one waits for, while `WAITING`.
    #[must_use]
    pub const fn joining(&self) -> Option<ThreadId> {
        self.joining
    }

    #[must_use]
    pub const fn priority(&self) -> Criterion {
        self.criterion
    }

    pub(crate) const fn set_priority(&mut self, criterion: Criterion) {
        self.criterion = criterion;
    }

    #[must_use]
    pub const fn link(&self) -> Link {
        Link {
            thread: self.id,
            criterion: self.criterion,
        }
    }

    /// Logical base and size of the stack, if the thread has one.
    #[must_use]
    pub fn stack(&self) -> Option<(LogicalAddress, u64)> {
        self.stack.as_ref().map(|(segment, at)| (*at, segment.size()))
    }

    /// Saved stack pointer of the suspended context.
    #[must_use]
    pub const fn context(&self) -> LogicalAddress {
        self.context
    }

    /// Record the stack pointer a context switch left behind.
    pub const fn save_context(&mut self, sp: LogicalAddress) {
        self.context = sp;
    }

    /// Exit status, once the thread has finished.
    #[must_use]
    pub const fn status(&self) -> Option<i32> {
        self.status
    }

    pub(crate) const fn finish(&mut self, status: i32) {
        self.state = State::Finishing;
        self.joining = None;
        self.status = Some(status);
    }
}
