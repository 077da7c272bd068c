use crate::{FirmwareMemoryMap, MemmapEntry, MemmapKind, parse_command_line};
use alloc::vec::Vec;
use contig_abi::ReservedExtent;
use log::{info, warn};

/// Find the extents reserved for contiguous allocations on `cmdline`.
///
/// Every `memmap=SIZE$START` entry is a candidate. A candidate is used only if
/// the firmware reports RAM in its range and the range is reserved in the map
/// currently in effect, so that only real memory the kernel itself stays away
/// from is handed out. Candidates overlapping an already accepted extent are
/// dropped. Every decision is logged.
///
/// The result is sorted by start address and free of overlaps.
#[must_use]
pub fn discover<M>(cmdline: &str, map: &M) -> Vec<ReservedExtent>
where
    M: FirmwareMemoryMap + ?Sized,
{
    let mut accepted: Vec<ReservedExtent> = Vec::new();

    for entry in parse_command_line(cmdline) {
        let (start, size) = match entry {
            Ok(MemmapEntry::Range {
                kind: MemmapKind::Reserved,
                start,
                size,
            }) => (start, size),
            Ok(_) => continue,
            Err(e) => {
                warn!("Ignored malformed memmap entry: {e}");
                continue;
            }
        };

        let extent = ReservedExtent::new(start, size);
        let Some(last) = extent.last() else {
            info!("Ignored memmap start {start:#x} size {size:#x}: empty or past the end of memory");
            continue;
        };
        let end = last.saturating_add(1);

        if !map.firmware_has_ram(start, end) {
            info!("Ignored memmap start {start:#x} size {size:#x}: not marked as RAM by firmware");
            continue;
        }
        if !map.is_reserved(start, end) {
            info!("Ignored memmap start {start:#x} size {size:#x}: not marked as reserved");
            continue;
        }
        if let Some(other) = accepted.iter().find(|other| overlaps(other, &extent)) {
            info!(
                "Ignored memmap start {start:#x} size {size:#x}: overlaps start {:#x} size {:#x}",
                other.start, other.size
            );
            continue;
        }

        info!("Using memmap start {start:#x} size {size:#x} for contiguous allocations");
        accepted.push(extent);
    }

    accepted.sort_unstable_by_key(|e| e.start);
    accepted
}

const fn overlaps(a: &ReservedExtent, b: &ReservedExtent) -> bool {
    match (a.last(), b.last()) {
        (Some(a_last), Some(b_last)) => a.start <= b_last && b.start <= a_last,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_inclusive_of_the_last_byte() {
        let a = ReservedExtent::new(0x1000, 0x1000);
        assert!(overlaps(&a, &ReservedExtent::new(0x1FFF, 1)));
        assert!(!overlaps(&a, &ReservedExtent::new(0x2000, 1)));
        assert!(!overlaps(&a, &ReservedExtent::new(0x1000, 0)));
    }
}
