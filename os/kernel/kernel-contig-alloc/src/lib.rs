//! # Physically Contiguous Buffer Allocator
//!
//! Hands out physically contiguous address ranges to DMA-capable requesters.
//! A fixed set of physical extents is reserved at boot (see `kernel-memmap`);
//! this crate carves buffers out of them on request, takes them back when
//! freed, and reclaims everything a requester still holds when it terminates.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │       Control endpoint / OwnerSession               │
//! │    • ALLOC_A64, ALLOC_A32, FREE command codes       │
//! │    • per-requester lifetime, cleanup on drop        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              ContigAllocator                        │
//! │    • batches of up to 64 buffers per call           │
//! │    • one spin lock around the table                 │
//! │    • halts on a broken table invariant              │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        RegionTable + best-fit search                │
//! │    • sorted, non-overlapping regions                │
//! │    • splice / coalesce                              │
//! │    • A32 clipping, A64 high-memory preference       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Placement policy
//!
//! Requests are served by best fit: among the free regions that can hold the
//! buffer, the one leaving the fewest bytes over wins, ties going to the lowest
//! address. [`AddressClass::A32`] requesters only see memory at or below
//! [`A32_LIMIT`]. [`AddressClass::A64`] requesters are served from above
//! [`HIGH_MEMORY_START`] while possible, so that low memory is kept for those
//! that need it.
//!
//! ## Usage
//!
//! ```
//! use contig_abi::ReservedExtent;
//! use kernel_contig_alloc::{AddressClass, Buffer, ContigAllocator, OwnerId};
//!
//! let pool = ContigAllocator::initialize(&[ReservedExtent::new(0x10_0000, 0x10_0000)])?;
//! let owner = OwnerId::new(1);
//!
//! let bases = pool.allocate_batch(owner, AddressClass::A32, &[0x1000])?;
//! let base = bases[0]?;
//! assert!(pool.mapping_for(owner, base, 0x1000).is_some());
//!
//! pool.free_batch(owner, &[Buffer::new(base, 0x1000)])?;
//! # Ok::<(), kernel_contig_alloc::AllocError>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod address;
mod allocator;
mod bootstrap;
mod control;
mod error;
mod region;
mod search;
mod session;
mod table;

pub use address::{A32_LIMIT, HIGH_MEMORY_START, PhysicalAddress};
pub use allocator::{Buffer, ContigAllocator, PoolStats};
pub use contig_abi::MAX_BUFFERS_PER_CALL;
pub use error::{AllocError, ConfigurationError, InvalidArgument, InvariantViolation};
pub use region::{OwnerId, Region, RegionState};
pub use search::AddressClass;
pub use session::OwnerSession;
pub use table::RegionTable;
