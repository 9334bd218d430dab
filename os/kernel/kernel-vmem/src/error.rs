use kernel_memory_addresses::LogicalAddress;

/// Errors of the MMU core.
///
/// All of them are recoverable; broken invariants are assertions instead.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum MmuError {
    #[error("out of physical memory ({requested} units requested)")]
    OutOfMemory { requested: u64 },

    #[error("no run of {span} free directory slots")]
    NoFreeSlots { span: usize },

    #[error("directory slot {slot} is occupied")]
    SlotOccupied { slot: usize },

    #[error("directory slots {slot}..{end} lie outside the application window")]
    OutOfRange { slot: usize, end: usize },

    #[error("chunk is not attached at {0}")]
    NotAttached(LogicalAddress),

    #[error("chunk is not attached to this directory")]
    NotFound,

    #[error("zero-sized chunk")]
    Empty,

    #[error("{0} is not aligned to a directory slot")]
    Misplaced(LogicalAddress),

    #[error("chunk has no tables to attach")]
    NoTables,
}
