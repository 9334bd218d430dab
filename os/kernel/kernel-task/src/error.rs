use crate::thread::{State, ThreadId};
use kernel_vmem::MmuError;

/// Errors of the task layer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("memory: {0}")]
    Memory(#[from] MmuError),

    #[error("no such thread: {0}")]
    NoSuchThread(ThreadId),

    #[error("task already runs {limit} threads")]
    TooManyThreads { limit: usize },

    #[error("entry offset {offset:#x} lies outside the {size:#x} byte code segment")]
    EntryOutsideCode { offset: u64, size: u64 },

    #[error("{0} cannot join itself")]
    JoinSelf(ThreadId),

    #[error("{thread} cannot go from {from:?} to {to:?}")]
    BadTransition { thread: ThreadId, from: State, to: State },

    #[error("{0} has not finished")]
    NotFinished(ThreadId),

    #[error("the boot image carries no application")]
    NoImage,
}
