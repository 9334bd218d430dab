use kernel_memory_addresses::PhysicalAddress;

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// Nothing left once both ends are aligned to whole units.
    #[error("region {base}..{top} holds no whole unit")]
    Empty {
        base: PhysicalAddress,
        top: PhysicalAddress,
    },

    /// The physical mapper does not cover the region.
    #[error("region {base}..{top} is not reachable through the physical mapper")]
    Unreachable {
        base: PhysicalAddress,
        top: PhysicalAddress,
    },
}
