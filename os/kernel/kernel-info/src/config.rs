//! # Tunables
//!
//! Compile-time knobs of the MMU and the process model.

/// Number of cache colors. `1` disables coloring: every frame lives in the
/// uncolored (`WHITE`) list.
pub const COLORS: usize = 1;

/// Colored builds keep this many frames uncolored for page tables,
/// directories and other structures that need contiguous runs.
pub const WHITE_RESERVE_FRAMES: u64 = 1024;

/// Default size of a thread's stack segment.
pub const STACK_SIZE: u64 = 16 * 1024;

/// Default size of the boot (idle) thread stack.
pub const IDLE_STACK_SIZE: u64 = 4 * 1024;

/// Upper bound on threads per task.
pub const MAX_THREADS: usize = 16;

const _: () = {
    assert!(COLORS >= 1 && COLORS <= 128);
    assert!(STACK_SIZE.is_multiple_of(4096));
    assert!(IDLE_STACK_SIZE.is_multiple_of(4096));
    assert!(MAX_THREADS >= 2);
};
