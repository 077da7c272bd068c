use crate::{
    AllocError, ConfigurationError, ContigAllocator, PhysicalAddress, Region, RegionState,
    RegionTable,
};
use alloc::vec::Vec;
use contig_abi::ReservedExtent;
use log::{info, warn};

impl ContigAllocator {
    /// Bring the allocator into service over the reserved `extents`.
    ///
    /// Every extent becomes a free region; adjacent extents are coalesced.
    /// Extents of size zero are skipped with a warning.
    ///
    /// # Errors
    /// - [`ConfigurationError::NoReservedExtents`] if no non-empty extent remains.
    /// - [`ConfigurationError::ExtentOverflow`] if an extent runs past the end of
    ///   the 64-bit address space.
    /// - [`ConfigurationError::OverlappingExtents`] if two extents overlap.
    pub fn initialize(extents: &[ReservedExtent]) -> Result<Self, AllocError> {
        let mut seeds = Vec::with_capacity(extents.len());
        for extent in extents {
            let start = PhysicalAddress::new(extent.start);
            if extent.size == 0 {
                warn!("skipping empty reserved extent at {start}");
                continue;
            }

            let region = Region::spanning(start, extent.size, RegionState::Free).ok_or(
                ConfigurationError::ExtentOverflow {
                    start,
                    size: extent.size,
                },
            )?;
            seeds.push(region);
        }

        if seeds.is_empty() {
            return Err(ConfigurationError::NoReservedExtents.into());
        }

        seeds.sort_unstable_by_key(Region::start);
        if let Some(pair) = seeds.windows(2).find(|pair| pair[0].overlaps(&pair[1])) {
            return Err(ConfigurationError::OverlappingExtents {
                first: pair[0],
                second: pair[1],
            }
            .into());
        }

        let mut table = RegionTable::new();
        let mut total: u64 = 0;
        for region in seeds {
            table.insert_initial(region)?;
            total = total.saturating_add(region.len());
            info!(
                "reserved extent {} - {} ({} KiB) added to the contiguous pool",
                region.start(),
                region.end(),
                region.len() / 1024
            );
        }

        info!(
            "contiguous pool ready: {} region(s), {} MiB",
            table.len(),
            total / (1024 * 1024)
        );
        Ok(Self::from_table(table))
    }
}
