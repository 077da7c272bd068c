//! Best-fit search over the free regions of a [`RegionTable`].

use crate::{
    A32_LIMIT, HIGH_MEMORY_START, OwnerId, PhysicalAddress, Region, RegionState, RegionTable,
};
use core::cmp::{max, min};
use log::trace;

/// Which part of the physical address space a requester can reach.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressClass {
    /// Limited to 32-bit addresses; every byte must lie at or below [`A32_LIMIT`].
    A32,
    /// Full 64-bit addressing. Prefers memory above [`HIGH_MEMORY_START`] so low
    /// memory stays available for [`A32`](Self::A32) requesters.
    A64,
}

impl AddressClass {
    /// Last address a requester of this class can reach.
    #[must_use]
    pub const fn limit(self) -> PhysicalAddress {
        match self {
            Self::A32 => A32_LIMIT,
            Self::A64 => PhysicalAddress::MAX,
        }
    }
}

impl RegionTable {
    /// Find the free region that fits `length` bytes at or above `min_start`
    /// with the least space left over.
    ///
    /// Regions above the class limit are skipped and regions straddling it are
    /// clipped. Ties go to the lowest region. The result is the carved-out
    /// interval, marked as allocated to `owner`; the table itself is not
    /// modified. Pass it to [`splice`](Self::splice) to commit.
    #[must_use]
    pub fn find_best_fit(
        &self,
        class: AddressClass,
        min_start: PhysicalAddress,
        length: u64,
        owner: OwnerId,
    ) -> Option<Region> {
        if length == 0 {
            return None;
        }

        let limit = class.limit();
        let mut best: Option<(PhysicalAddress, u64)> = None;

        for region in self.iter().filter(|r| r.is_free()) {
            if region.end() < min_start || region.start() > limit {
                continue;
            }

            let usable_start = max(region.start(), min_start);
            let usable_end = min(region.end(), limit);
            if usable_start > usable_end {
                continue;
            }

            let usable_size = (usable_end.as_u64() - usable_start.as_u64()).saturating_add(1);
            if usable_size < length {
                continue;
            }

            let leftover = usable_size - length;
            if best.is_none_or(|(_, best_leftover)| leftover < best_leftover) {
                best = Some((usable_start, leftover));
            }
        }

        let (start, _) = best?;
        Region::spanning(start, length, RegionState::Allocated(owner))
    }

    /// Apply the placement policy of `class`.
    ///
    /// [`AddressClass::A64`] first looks above [`HIGH_MEMORY_START`] and falls
    /// back to the whole address space; [`AddressClass::A32`] searches from zero
    /// up to [`A32_LIMIT`].
    #[must_use]
    pub fn find_for_class(&self, class: AddressClass, length: u64, owner: OwnerId) -> Option<Region> {
        match class {
            AddressClass::A64 => self
                .find_best_fit(class, HIGH_MEMORY_START, length, owner)
                .or_else(|| {
                    trace!("no fit for {length:#x} bytes above 4 GiB, retrying unrestricted");
                    self.find_best_fit(class, PhysicalAddress::zero(), length, owner)
                }),
            AddressClass::A32 => self.find_best_fit(class, PhysicalAddress::zero(), length, owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    const fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    const fn owner() -> OwnerId {
        OwnerId::new(1)
    }

    fn table(extents: &[(u64, u64)]) -> RegionTable {
        let mut t = RegionTable::new();
        for &(start, size) in extents {
            t.insert_initial(Region::spanning(pa(start), size, RegionState::Free).unwrap())
                .unwrap();
        }
        t
    }

    #[test]
    fn picks_smallest_leftover_not_first_fit() {
        let t = table(&[(0x1000, 0x4000), (0x10000, 0x1000), (0x20000, 0x2000)]);
        let r = t
            .find_best_fit(AddressClass::A64, pa(0), 0x1000, owner())
            .unwrap();
        assert_eq!(r, Region::allocated(pa(0x10000), pa(0x10FFF), owner()));
    }

    #[test]
    fn ties_go_to_the_lowest_region() {
        let t = table(&[(0x1000, 0x1000), (0x10000, 0x1000)]);
        let r = t
            .find_best_fit(AddressClass::A32, pa(0), 0x800, owner())
            .unwrap();
        assert_eq!(r.start(), pa(0x1000));
    }

    #[test]
    fn skips_allocated_regions() {
        let mut t = table(&[(0x1000, 0x1000), (0x10000, 0x4000)]);
        t.splice(Region::allocated(pa(0x1000), pa(0x1FFF), OwnerId::new(9)))
            .unwrap();
        let r = t
            .find_best_fit(AddressClass::A32, pa(0), 0x1000, owner())
            .unwrap();
        assert_eq!(r.start(), pa(0x10000));
    }

    #[test]
    fn min_start_clips_the_usable_range() {
        let t = table(&[(0x1000, 0x4000)]);
        let r = t
            .find_best_fit(AddressClass::A64, pa(0x2000), 0x1000, owner())
            .unwrap();
        assert_eq!(r.start(), pa(0x2000));
        assert!(
            t.find_best_fit(AddressClass::A64, pa(0x4800), 0x1000, owner())
                .is_none()
        );
    }

    #[test]
    fn a32_never_crosses_the_4gib_boundary() {
        // 4 GiB - 4 KiB .. 4 GiB + 4 KiB
        let t = table(&[(4 * GIB - 0x1000, 0x2000)]);
        let r = t
            .find_best_fit(AddressClass::A32, pa(0), 0x1000, owner())
            .unwrap();
        assert_eq!(r, Region::allocated(pa(4 * GIB - 0x1000), A32_LIMIT, owner()));
        assert!(
            t.find_best_fit(AddressClass::A32, pa(0), 0x1001, owner())
                .is_none()
        );
    }

    #[test]
    fn a32_skips_regions_entirely_above_4gib() {
        let t = table(&[(8 * GIB, 0x10000)]);
        assert!(t.find_for_class(AddressClass::A32, 0x1000, owner()).is_none());
        assert!(t.find_for_class(AddressClass::A64, 0x1000, owner()).is_some());
    }

    #[test]
    fn a64_prefers_high_memory() {
        let t = table(&[(0x1000, 0x1000), (8 * GIB, 0x10000)]);
        let r = t.find_for_class(AddressClass::A64, 0x1000, owner()).unwrap();
        assert_eq!(r.start(), pa(8 * GIB));
    }

    #[test]
    fn a64_prefers_the_high_part_of_a_region_straddling_4gib() {
        let t = table(&[(4 * GIB - 0x2000, 0x4000)]);
        let r = t.find_for_class(AddressClass::A64, 0x1000, owner()).unwrap();
        assert_eq!(r.start(), HIGH_MEMORY_START);
    }

    #[test]
    fn a64_falls_back_to_low_memory() {
        let t = table(&[(0x1000, 0x2000), (0x10000, 0x1000)]);
        let r = t.find_for_class(AddressClass::A64, 0x2000, owner()).unwrap();
        assert_eq!(r, Region::allocated(pa(0x1000), pa(0x2FFF), owner()));
    }

    #[test]
    fn zero_length_never_fits() {
        let t = table(&[(0x1000, 0x2000)]);
        assert!(t.find_for_class(AddressClass::A64, 0, owner()).is_none());
    }

    #[test]
    fn oversized_request_finds_nothing() {
        let t = table(&[(0x1000, 0x2000)]);
        assert!(t.find_for_class(AddressClass::A64, 4 * GIB, owner()).is_none());
    }
}
