//! The region table: an ordered, non-overlapping list of [`Region`]s covering
//! exactly the reserved extents.
//!
//! Every mutation goes through [`RegionTable::splice`]. Allocating, freeing and
//! seeding differ only in the state carried by the spliced region, so the
//! split/sort/coalesce logic exists once:
//!
//! ```text
//! existing  [ ........................ free ........................ ]
//! new                 [ ... alloc/1 ... ]
//! result    [ free   ][ ... alloc/1 ... ][ free                     ]
//!            before        new              after
//! ```

use crate::{InvariantViolation, OwnerId, PhysicalAddress, Region, RegionState};
use alloc::vec::Vec;
use core::mem;

/// Ordered, non-overlapping collection of [`Region`]s.
///
/// # Invariants
/// - Sorted ascending by start address.
/// - No two regions overlap.
/// - No two free regions abut; they are coalesced into one.
/// - Allocated regions may abut and are never merged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Append a free region for a bootstrap extent.
    ///
    /// Extents are not checked against each other; the table is re-sorted and
    /// free neighbours are coalesced.
    ///
    /// # Errors
    /// [`InvariantViolation`] if `region` is malformed or overlaps an existing
    /// region.
    pub fn insert_initial(&mut self, region: Region) -> Result<(), InvariantViolation> {
        ensure_well_formed(&region)?;
        self.regions.push(region.with_state(RegionState::Free));
        self.normalize()
    }

    /// Splice `new_region` into the region that currently covers it.
    ///
    /// The covering region is replaced by up to three regions: the part before
    /// `new_region` (keeping the old state), `new_region` itself, and the part
    /// after it (keeping the old state). Afterwards the table is re-sorted and
    /// abutting free regions are merged.
    ///
    /// # Errors
    /// - [`InvariantViolation::MalformedRegion`] if `new_region` ends before it starts.
    /// - [`InvariantViolation::NoCoveringRegion`] if no single region contains it.
    /// - [`InvariantViolation::OverlappingNeighbours`] if the table turns out to
    ///   overlap after the splice.
    ///
    /// On error the table may be left partially updated; treat it as corrupt.
    pub fn splice(&mut self, new_region: Region) -> Result<(), InvariantViolation> {
        ensure_well_formed(&new_region)?;

        let index = self
            .covering_index(new_region.start(), new_region.end())
            .ok_or_else(|| InvariantViolation::NoCoveringRegion {
                start: new_region.start(),
                end: new_region.end(),
            })?;

        let existing = self.regions.swap_remove(index);

        if new_region.start() > existing.start() {
            // start > existing.start >= 0, so the subtraction cannot underflow
            let before_end = PhysicalAddress::new(new_region.start().as_u64() - 1);
            self.regions
                .push(Region::new(existing.start(), before_end, existing.state()));
        }

        self.regions.push(new_region);

        if new_region.end() < existing.end() {
            let after_start = PhysicalAddress::new(new_region.end().as_u64() + 1);
            self.regions
                .push(Region::new(after_start, existing.end(), existing.state()));
        }

        self.normalize()
    }

    /// Sort by start address, then merge abutting free neighbours in one pass.
    fn normalize(&mut self) -> Result<(), InvariantViolation> {
        self.regions.sort_unstable_by_key(Region::start);

        let mut merged: Vec<Region> = Vec::with_capacity(self.regions.len());
        let mut pending = mem::take(&mut self.regions).into_iter();
        while let Some(region) = pending.next() {
            if let Some(last) = merged.last_mut() {
                if last.overlaps(&region) {
                    let first = *last;
                    // keep everything for inspection
                    merged.push(region);
                    merged.extend(pending);
                    self.regions = merged;
                    return Err(InvariantViolation::OverlappingNeighbours {
                        first,
                        second: region,
                    });
                }
                if last.is_free() && region.is_free() && last.abuts(&region) {
                    *last = Region::free(last.start(), region.end());
                    continue;
                }
            }
            merged.push(region);
        }

        self.regions = merged;
        Ok(())
    }

    /// Index of the region containing `[start, end]`.
    fn covering_index(&self, start: PhysicalAddress, end: PhysicalAddress) -> Option<usize> {
        // Sorted and non-overlapping: the candidate is the last region starting at or before `start`.
        let candidate = self
            .regions
            .partition_point(|r| r.start() <= start)
            .checked_sub(1)?;
        let region = &self.regions[candidate];
        (region.end() >= end).then_some(candidate)
    }

    /// The region containing `[start, end]` entirely, if any.
    #[must_use]
    pub fn covering(&self, start: PhysicalAddress, end: PhysicalAddress) -> Option<&Region> {
        self.covering_index(start, end).map(|i| &self.regions[i])
    }

    /// The allocated region spanning exactly `[start, end]` and owned by `owner`.
    #[must_use]
    pub fn find_allocation(
        &self,
        start: PhysicalAddress,
        end: PhysicalAddress,
        owner: OwnerId,
    ) -> Option<&Region> {
        self.regions
            .iter()
            .find(|r| r.start() == start && r.end() == end && r.is_owned_by(owner))
    }

    /// The lowest region owned by `owner`, if any.
    #[must_use]
    pub fn first_owned_by(&self, owner: OwnerId) -> Option<&Region> {
        self.regions.iter().find(|r| r.is_owned_by(owner))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    /// Verify every table invariant.
    ///
    /// # Errors
    /// The first violation found, scanning from low to high addresses.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for region in &self.regions {
            ensure_well_formed(region)?;
        }
        for pair in self.regions.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            if first.start() > second.start() {
                return Err(InvariantViolation::Unsorted { first, second });
            }
            if first.overlaps(&second) {
                return Err(InvariantViolation::OverlappingNeighbours { first, second });
            }
            if first.is_free() && second.is_free() && first.abuts(&second) {
                return Err(InvariantViolation::Uncoalesced { first, second });
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RegionTable {
    type Item = &'a Region;
    type IntoIter = core::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

const fn ensure_well_formed(region: &Region) -> Result<(), InvariantViolation> {
    if region.is_well_formed() {
        Ok(())
    } else {
        Err(InvariantViolation::MalformedRegion {
            start: region.start(),
            end: region.end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn pa(v: u64) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    const fn owner(v: u64) -> OwnerId {
        OwnerId::new(v)
    }

    fn seeded() -> RegionTable {
        let mut t = RegionTable::new();
        t.insert_initial(Region::free(pa(0x10000), pa(0x10FFF))).unwrap();
        t.insert_initial(Region::free(pa(0x1000), pa(0x2FFF))).unwrap();
        t
    }

    #[test]
    fn initial_inserts_are_sorted() {
        let t = seeded();
        assert_eq!(
            t.as_slice(),
            &[
                Region::free(pa(0x1000), pa(0x2FFF)),
                Region::free(pa(0x10000), pa(0x10FFF)),
            ]
        );
        t.check_invariants().unwrap();
    }

    #[test]
    fn abutting_initial_extents_coalesce() {
        let mut t = RegionTable::new();
        t.insert_initial(Region::free(pa(0x2000), pa(0x2FFF))).unwrap();
        t.insert_initial(Region::free(pa(0x1000), pa(0x1FFF))).unwrap();
        assert_eq!(t.as_slice(), &[Region::free(pa(0x1000), pa(0x2FFF))]);
    }

    #[test]
    fn initial_insert_reports_overlap() {
        let mut t = seeded();
        let err = t
            .insert_initial(Region::free(pa(0x2000), pa(0x3FFF)))
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::OverlappingNeighbours { .. }));
    }

    #[test]
    fn splice_carves_from_the_front() {
        let mut t = seeded();
        t.splice(Region::allocated(pa(0x1000), pa(0x17FF), owner(1)))
            .unwrap();
        assert_eq!(
            t.as_slice(),
            &[
                Region::allocated(pa(0x1000), pa(0x17FF), owner(1)),
                Region::free(pa(0x1800), pa(0x2FFF)),
                Region::free(pa(0x10000), pa(0x10FFF)),
            ]
        );
    }

    #[test]
    fn splice_in_the_middle_produces_three_parts() {
        let mut t = seeded();
        t.splice(Region::allocated(pa(0x1800), pa(0x1FFF), owner(1)))
            .unwrap();
        assert_eq!(
            &t.as_slice()[..3],
            &[
                Region::free(pa(0x1000), pa(0x17FF)),
                Region::allocated(pa(0x1800), pa(0x1FFF), owner(1)),
                Region::free(pa(0x2000), pa(0x2FFF)),
            ]
        );
        t.check_invariants().unwrap();
    }

    #[test]
    fn freeing_coalesces_with_both_neighbours() {
        let mut t = seeded();
        let taken = Region::allocated(pa(0x1800), pa(0x1FFF), owner(1));
        t.splice(taken).unwrap();
        t.splice(taken.with_state(RegionState::Free)).unwrap();
        assert_eq!(t, seeded());
    }

    #[test]
    fn abutting_allocations_stay_separate() {
        let mut t = seeded();
        let a = Region::allocated(pa(0x1000), pa(0x17FF), owner(1));
        let b = Region::allocated(pa(0x1800), pa(0x1FFF), owner(1));
        t.splice(a).unwrap();
        t.splice(b).unwrap();
        assert_eq!(t.first_owned_by(owner(1)), Some(&a));
        assert_eq!(t.find_allocation(pa(0x1800), pa(0x1FFF), owner(1)), Some(&b));
        assert_eq!(t.len(), 4);

        // freeing one leaves the other untouched
        t.splice(a.with_state(RegionState::Free)).unwrap();
        assert_eq!(t.as_slice()[0], Region::free(pa(0x1000), pa(0x17FF)));
        assert_eq!(t.as_slice()[1], b);
    }

    #[test]
    fn splice_outside_any_region_is_a_violation() {
        let mut t = seeded();
        // straddles the end of the first extent
        let err = t
            .splice(Region::allocated(pa(0x2800), pa(0x37FF), owner(1)))
            .unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::NoCoveringRegion {
                start: pa(0x2800),
                end: pa(0x37FF),
            }
        );
        // in the gap between extents
        assert!(t
            .splice(Region::allocated(pa(0x5000), pa(0x5FFF), owner(1)))
            .is_err());
        // table untouched
        assert_eq!(t, seeded());
    }

    #[test]
    fn malformed_region_is_rejected() {
        let mut t = seeded();
        let err = t.splice(Region::free(pa(0x2000), pa(0x1000))).unwrap_err();
        assert!(matches!(err, InvariantViolation::MalformedRegion { .. }));
    }

    #[test]
    fn covering_lookup() {
        let t = seeded();
        assert_eq!(
            t.covering(pa(0x1000), pa(0x2FFF)),
            Some(&Region::free(pa(0x1000), pa(0x2FFF)))
        );
        assert!(t.covering(pa(0x0), pa(0x10)).is_none());
        assert!(t.covering(pa(0x2FFF), pa(0x3000)).is_none());
        assert!(t.covering(pa(0x10FFF), pa(0x10FFF)).is_some());
    }

    #[test]
    fn check_invariants_detects_uncoalesced_free_regions() {
        let t = RegionTable {
            regions: vec![
                Region::free(pa(0x1000), pa(0x1FFF)),
                Region::free(pa(0x2000), pa(0x2FFF)),
            ],
        };
        assert!(matches!(
            t.check_invariants(),
            Err(InvariantViolation::Uncoalesced { .. })
        ));
    }
}
