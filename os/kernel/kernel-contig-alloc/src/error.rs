use crate::{OwnerId, PhysicalAddress, Region};

/// Errors reported by the allocator's request handlers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),
    /// No free region inside the address-class window can hold the buffer.
    #[error("out of space: no free region can hold {length:#x} bytes")]
    OutOfSpace { length: u64 },
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The region table was found corrupted by this operation; the allocator
    /// is halted from now on.
    #[error("region table invariant violated: {0}")]
    InvariantViolation(#[from] InvariantViolation),
    /// An earlier operation found the region table corrupted.
    #[error("allocator halted after an invariant violation")]
    Halted,
}

/// Request arguments the allocator refuses to act on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidArgument {
    #[error("batch of {count} buffers exceeds the per-call maximum of {max}")]
    TooManyBuffers { count: usize, max: usize },
    #[error("no allocation owned by {owner} spans {base}+{length:#x}")]
    NoMatchingAllocation {
        owner: OwnerId,
        base: PhysicalAddress,
        length: u64,
    },
    #[error("zero-length buffer requested")]
    ZeroLength,
    #[error("unknown control command {0:#010x}")]
    UnknownCommand(u32),
}

/// Reasons the allocator cannot come into service.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no usable reserved physical extents")]
    NoReservedExtents,
    #[error("extent at {start} of {size:#x} bytes runs past the address space")]
    ExtentOverflow { start: PhysicalAddress, size: u64 },
    #[error("reserved extents {first:?} and {second:?} overlap")]
    OverlappingExtents { first: Region, second: Region },
}

/// A broken region-table invariant. Never a caller error the allocator can
/// recover from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("no region covers [{start}, {end}]")]
    NoCoveringRegion {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("neighbouring regions {first:?} and {second:?} overlap")]
    OverlappingNeighbours { first: Region, second: Region },
    #[error("region [{start}, {end}] ends before it starts")]
    MalformedRegion {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("regions {first:?} and {second:?} are out of order")]
    Unsorted { first: Region, second: Region },
    #[error("free regions {first:?} and {second:?} are adjacent but not coalesced")]
    Uncoalesced { first: Region, second: Region },
}

impl From<kernel_sync::Halted> for AllocError {
    fn from(_: kernel_sync::Halted) -> Self {
        Self::Halted
    }
}
