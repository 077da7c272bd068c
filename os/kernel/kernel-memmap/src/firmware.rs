//! The firmware memory map the discovered extents are checked against.

use crate::{MemmapEntry, MemmapKind, parse_command_line};
use alloc::vec::Vec;

/// Type of an e820 memory map entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum E820Kind {
    Ram,
    Reserved,
    Acpi,
    Nvs,
    Unusable,
    Persistent,
}

impl From<MemmapKind> for E820Kind {
    fn from(kind: MemmapKind) -> Self {
        match kind {
            MemmapKind::Usable => Self::Ram,
            MemmapKind::AcpiData => Self::Acpi,
            MemmapKind::Reserved => Self::Reserved,
            MemmapKind::Persistent => Self::Persistent,
        }
    }
}

/// One typed range `[start, start + size)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct E820Entry {
    pub start: u64,
    pub size: u64,
    pub kind: E820Kind,
}

impl E820Entry {
    #[must_use]
    pub const fn new(start: u64, size: u64, kind: E820Kind) -> Self {
        Self { start, size, kind }
    }

    /// Exclusive end, saturating at the top of the address space.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }
}

/// An e820-style memory map: a list of typed physical ranges.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct E820Map {
    entries: Vec<E820Entry>,
}

impl E820Map {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: E820Entry) {
        self.entries.push(entry);
        self.entries.sort_unstable_by_key(|e| e.start);
    }

    #[must_use]
    pub fn entries(&self) -> &[E820Entry] {
        &self.entries
    }

    /// Whether any part of `[start, end)` is covered by an entry of `kind`.
    ///
    /// Partial overlap is enough; the whole range need not be of that type.
    #[must_use]
    pub fn any_of_type(&self, start: u64, end: u64, kind: E820Kind) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == kind && e.start < end && start < e.end())
    }

    /// Retype `[start, start + size)` as `kind`, splitting the entries it cuts
    /// through. Ranges not previously in the map are added.
    pub fn set_range(&mut self, start: u64, size: u64, kind: E820Kind) {
        if size == 0 {
            return;
        }
        let end = start.saturating_add(size);

        let mut updated = Vec::with_capacity(self.entries.len() + 2);
        for entry in self.entries.drain(..) {
            if entry.end() <= start || entry.start >= end {
                updated.push(entry);
                continue;
            }
            if entry.start < start {
                updated.push(E820Entry::new(entry.start, start - entry.start, entry.kind));
            }
            if entry.end() > end {
                updated.push(E820Entry::new(end, entry.end() - end, entry.kind));
            }
        }
        updated.push(E820Entry::new(start, end - start, kind));
        updated.sort_unstable_by_key(|e| e.start);
        self.entries = updated;
    }
}

impl FromIterator<E820Entry> for E820Map {
    fn from_iter<I: IntoIterator<Item = E820Entry>>(iter: I) -> Self {
        let mut entries: Vec<_> = iter.into_iter().collect();
        entries.sort_unstable_by_key(|e| e.start);
        Self { entries }
    }
}

/// The two views of physical memory an extent is checked against.
pub trait FirmwareMemoryMap {
    /// Whether the firmware, before any command-line edits, reports RAM
    /// anywhere in `[start, end)`.
    fn firmware_has_ram(&self, start: u64, end: u64) -> bool;

    /// Whether the map currently in effect marks anything in `[start, end)`
    /// as reserved.
    fn is_reserved(&self, start: u64, end: u64) -> bool;
}

/// The raw firmware map next to the map in effect after boot-time edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMemoryMap {
    firmware: E820Map,
    current: E820Map,
}

impl SystemMemoryMap {
    /// Start out with the current map equal to what the firmware reported.
    #[must_use]
    pub fn new(firmware: E820Map) -> Self {
        Self {
            current: firmware.clone(),
            firmware,
        }
    }

    /// Apply the `memmap=` ranges of `cmdline` to the current map, the way the
    /// kernel does while booting. Malformed entries are ignored.
    ///
    /// Returns the number of ranges applied.
    pub fn apply_command_line(&mut self, cmdline: &str) -> usize {
        let mut applied = 0;
        for entry in parse_command_line(cmdline).flatten() {
            if let MemmapEntry::Range { kind, start, size } = entry {
                self.current.set_range(start, size, kind.into());
                applied += 1;
            }
        }
        applied
    }

    #[must_use]
    pub const fn firmware(&self) -> &E820Map {
        &self.firmware
    }

    #[must_use]
    pub const fn current(&self) -> &E820Map {
        &self.current
    }
}

impl FirmwareMemoryMap for SystemMemoryMap {
    fn firmware_has_ram(&self, start: u64, end: u64) -> bool {
        self.firmware.any_of_type(start, end, E820Kind::Ram)
    }

    fn is_reserved(&self, start: u64, end: u64) -> bool {
        self.current.any_of_type(start, end, E820Kind::Reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_type_matches_partial_overlap() {
        let map: E820Map = [
            E820Entry::new(0, 0x9_F000, E820Kind::Ram),
            E820Entry::new(0x10_0000, 0x1000_0000, E820Kind::Ram),
            E820Entry::new(0x9_F000, 0x1000, E820Kind::Reserved),
        ]
        .into_iter()
        .collect();

        assert!(map.any_of_type(0x9_E000, 0xA_0000, E820Kind::Reserved));
        assert!(map.any_of_type(0x9_E000, 0xA_0000, E820Kind::Ram));
        assert!(!map.any_of_type(0xA_0000, 0x10_0000, E820Kind::Ram));
        // end is exclusive
        assert!(!map.any_of_type(0x9_0000, 0x9_F000, E820Kind::Reserved));
    }

    #[test]
    fn set_range_splits_entries() {
        let mut map: E820Map = [E820Entry::new(0, 0x10_0000, E820Kind::Ram)]
            .into_iter()
            .collect();
        map.set_range(0x4_0000, 0x1_0000, E820Kind::Reserved);
        assert_eq!(
            map.entries(),
            [
                E820Entry::new(0, 0x4_0000, E820Kind::Ram),
                E820Entry::new(0x4_0000, 0x1_0000, E820Kind::Reserved),
                E820Entry::new(0x5_0000, 0xB_0000, E820Kind::Ram),
            ]
        );
    }

    #[test]
    fn command_line_reservations_only_change_the_current_map() {
        let firmware: E820Map = [E820Entry::new(0, 1 << 32, E820Kind::Ram)]
            .into_iter()
            .collect();
        let mut system = SystemMemoryMap::new(firmware);
        assert_eq!(system.apply_command_line("quiet memmap=64M$256M,oops"), 1);

        let (start, end) = (256 << 20, 320 << 20);
        assert!(system.firmware_has_ram(start, end));
        assert!(system.is_reserved(start, end));
        assert!(!system.firmware().any_of_type(start, end, E820Kind::Reserved));
        assert!(system.current().any_of_type(0, start, E820Kind::Ram));
    }
}
