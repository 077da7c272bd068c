use crate::{
    AddressClass, AllocError, InvalidArgument, OwnerId, PhysicalAddress, Region, RegionState,
    RegionTable,
};
use alloc::vec::Vec;
use contig_abi::{BufferDescriptor, MAX_BUFFERS_PER_CALL};
use kernel_sync::{SpinLock, SpinLockGuard};
use log::{debug, error, warn};

/// A buffer handed out by the allocator: physical base and length in bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub base: PhysicalAddress,
    pub length: u64,
}

impl Buffer {
    #[must_use]
    pub const fn new(base: PhysicalAddress, length: u64) -> Self {
        Self { base, length }
    }
}

impl From<BufferDescriptor> for Buffer {
    fn from(d: BufferDescriptor) -> Self {
        Self::new(PhysicalAddress::new(d.base_address), d.length)
    }
}

impl From<&BufferDescriptor> for Buffer {
    fn from(d: &BufferDescriptor) -> Self {
        Self::from(*d)
    }
}

/// Occupancy summary of the pool.
///
/// Byte counts saturate at `u64::MAX`, which a pool covering the whole 64-bit
/// space reaches one byte short of its real size (see [`Region::len`]).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of regions in the table.
    pub regions: usize,
    pub free_bytes: u64,
    pub allocated_bytes: u64,
    /// Size of the largest free region; the longest buffer that can still be
    /// granted without an address-class restriction.
    pub largest_free: u64,
}

/// Brokers physically contiguous ranges out of the reserved extents.
///
/// All operations that touch the region table run under one [`SpinLock`] for
/// their whole duration. Once an operation finds the table corrupted, the lock
/// is latched and every later operation fails with [`AllocError::Halted`].
pub struct ContigAllocator {
    pub(crate) table: SpinLock<RegionTable>,
}

impl ContigAllocator {
    pub const fn from_table(table: RegionTable) -> Self {
        Self {
            table: SpinLock::new(table),
        }
    }

    /// Allocate one buffer per entry of `lengths` for `owner`.
    ///
    /// Requests are served in order. Each entry either succeeds with the base
    /// address of a freshly carved region or fails on its own
    /// ([`AllocError::OutOfSpace`], or [`InvalidArgument::ZeroLength`]); earlier
    /// successes in the batch are kept either way.
    ///
    /// # Errors
    /// - [`InvalidArgument::TooManyBuffers`] if the batch exceeds
    ///   [`MAX_BUFFERS_PER_CALL`]; nothing is allocated.
    /// - [`AllocError::Halted`] if the allocator was halted earlier.
    /// - [`AllocError::InvariantViolation`] if this call found the table
    ///   corrupted; the allocator is halted afterwards.
    pub fn allocate_batch(
        &self,
        owner: OwnerId,
        class: AddressClass,
        lengths: &[u64],
    ) -> Result<Vec<Result<PhysicalAddress, AllocError>>, AllocError> {
        ensure_batch_size(lengths.len())?;

        let mut table = self.table.lock()?;
        let mut results = Vec::with_capacity(lengths.len());
        for (index, &length) in lengths.iter().enumerate() {
            match allocate_one(&mut table, owner, class, length) {
                Err(fatal @ AllocError::InvariantViolation(_)) => {
                    error!(
                        "{owner}: batch aborted at buffer {index}; already granted and still allocated: {:?}",
                        granted_bases(&results)
                    );
                    return Err(fatal);
                }
                Err(e) => {
                    warn!("{owner}: buffer {index} ({length:#x} bytes, {class:?}) not allocated: {e}");
                    results.push(Err(e));
                }
                Ok(base) => results.push(Ok(base)),
            }
        }
        Ok(results)
    }

    /// Free `buffers`, each of which must exactly match an allocation of `owner`.
    ///
    /// All or nothing: if any entry does not match, nothing is freed.
    ///
    /// # Errors
    /// - [`InvalidArgument::TooManyBuffers`] if the batch exceeds
    ///   [`MAX_BUFFERS_PER_CALL`].
    /// - [`InvalidArgument::NoMatchingAllocation`] for the first entry that is
    ///   not an allocation of `owner` (wrong owner, partial range, already freed,
    ///   or listed twice).
    /// - [`AllocError::Halted`] / [`AllocError::InvariantViolation`] as for
    ///   [`allocate_batch`](Self::allocate_batch).
    pub fn free_batch(&self, owner: OwnerId, buffers: &[Buffer]) -> Result<(), AllocError> {
        ensure_batch_size(buffers.len())?;

        let mut table = self.table.lock()?;

        let mut targets: Vec<Region> = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            let matched = buffer
                .base
                .last_of(buffer.length)
                .and_then(|end| table.find_allocation(buffer.base, end, owner))
                .copied()
                .filter(|region| !targets.contains(region));

            let Some(region) = matched else {
                warn!(
                    "{owner}: refusing to free {}+{:#x}: no such allocation",
                    buffer.base, buffer.length
                );
                return Err(InvalidArgument::NoMatchingAllocation {
                    owner,
                    base: buffer.base,
                    length: buffer.length,
                }
                .into());
            };
            targets.push(region);
        }

        for region in targets {
            commit(&mut table, region.with_state(RegionState::Free))?;
            debug!("{owner}: freed {region:?}");
        }
        Ok(())
    }

    /// The allocated region of `owner` that fully contains
    /// `[base, base + length)`, if any.
    ///
    /// This is what a mapping handler checks before exposing a physical range
    /// to a requester. A halted allocator grants no mappings.
    #[must_use]
    pub fn mapping_for(&self, owner: OwnerId, base: PhysicalAddress, length: u64) -> Option<Region> {
        let end = base.last_of(length)?;
        let table = self.table.lock().ok()?;
        table
            .covering(base, end)
            .filter(|region| region.is_owned_by(owner))
            .copied()
    }

    /// Copy of the region table, ascending by address.
    ///
    /// Available even after a halt so the table can be examined.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Region> {
        self.table.inspect(|table| table.as_slice().to_vec())
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.table.inspect(|table| {
            table.iter().fold(
                PoolStats {
                    regions: table.len(),
                    ..PoolStats::default()
                },
                |mut stats, region| {
                    if region.is_free() {
                        stats.free_bytes = stats.free_bytes.saturating_add(region.len());
                        stats.largest_free = stats.largest_free.max(region.len());
                    } else {
                        stats.allocated_bytes =
                            stats.allocated_bytes.saturating_add(region.len());
                    }
                    stats
                },
            )
        })
    }

    /// Whether an invariant violation has taken the allocator out of service.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.table.is_halted()
    }
}

/// Bases of the successful entries in a partially processed batch.
fn granted_bases(results: &[Result<PhysicalAddress, AllocError>]) -> Vec<PhysicalAddress> {
    results.iter().filter_map(|r| r.as_ref().ok().copied()).collect()
}

pub const fn ensure_batch_size(count: usize) -> Result<(), InvalidArgument> {
    if count > MAX_BUFFERS_PER_CALL {
        return Err(InvalidArgument::TooManyBuffers {
            count,
            max: MAX_BUFFERS_PER_CALL,
        });
    }
    Ok(())
}

fn allocate_one(
    table: &mut SpinLockGuard<'_, RegionTable>,
    owner: OwnerId,
    class: AddressClass,
    length: u64,
) -> Result<PhysicalAddress, AllocError> {
    if length == 0 {
        return Err(InvalidArgument::ZeroLength.into());
    }

    let region = table
        .find_for_class(class, length, owner)
        .ok_or(AllocError::OutOfSpace { length })?;

    commit(table, region)?;
    debug!("{owner}: allocated {region:?} ({class:?})");
    Ok(region.start())
}

/// Splice `region` into the table; on a broken invariant, log it and halt.
pub fn commit(
    table: &mut SpinLockGuard<'_, RegionTable>,
    region: Region,
) -> Result<(), AllocError> {
    let mut outcome = table.splice(region);
    if outcome.is_ok() && cfg!(debug_assertions) {
        outcome = table.check_invariants();
    }

    if let Err(violation) = outcome {
        error!("region table corrupted while splicing {region:?}: {violation}; halting allocator");
        table.halt();
        return Err(violation.into());
    }
    Ok(())
}
