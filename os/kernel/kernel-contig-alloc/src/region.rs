use crate::PhysicalAddress;
use core::fmt;

/// Identity of the requester that performed an allocation.
///
/// Opaque to the allocator; only compared for equality.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for OwnerId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Allocation state of a [`Region`].
///
/// An owner exists exactly when the region is allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegionState {
    Free,
    Allocated(OwnerId),
}

/// One contiguous physical interval `[start, end]` (inclusive) and its state.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    start: PhysicalAddress,
    end: PhysicalAddress,
    state: RegionState,
}

#[allow(clippy::len_without_is_empty)]
impl Region {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress, state: RegionState) -> Self {
        Self { start, end, state }
    }

    #[inline]
    #[must_use]
    pub const fn free(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self::new(start, end, RegionState::Free)
    }

    #[inline]
    #[must_use]
    pub const fn allocated(start: PhysicalAddress, end: PhysicalAddress, owner: OwnerId) -> Self {
        Self::new(start, end, RegionState::Allocated(owner))
    }

    /// The interval `[start, start + length - 1]`, or `None` if `length` is zero
    /// or the interval does not fit the address space.
    #[must_use]
    pub const fn spanning(start: PhysicalAddress, length: u64, state: RegionState) -> Option<Self> {
        match start.last_of(length) {
            Some(end) => Some(Self::new(start, end, state)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    /// Inclusive last address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> RegionState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerId> {
        match self.state {
            RegionState::Free => None,
            RegionState::Allocated(owner) => Some(owner),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.state, RegionState::Free)
    }

    #[inline]
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        !self.is_free()
    }

    #[inline]
    #[must_use]
    pub fn is_owned_by(&self, owner: OwnerId) -> bool {
        self.state == RegionState::Allocated(owner)
    }

    /// `start <= end`.
    #[inline]
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.start.as_u64() <= self.end.as_u64()
    }

    /// Number of bytes covered.
    ///
    /// The only region whose length does not fit a `u64` is `[0, u64::MAX]`
    /// (2^64 bytes). Its length is clamped to `u64::MAX`, one byte short, the
    /// same value reported for `[0, u64::MAX - 1]`.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end
            .as_u64()
            .saturating_sub(self.start.as_u64())
            .saturating_add(1)
    }

    /// Same interval, different state.
    #[inline]
    #[must_use]
    pub const fn with_state(self, state: RegionState) -> Self {
        Self::new(self.start, self.end, state)
    }

    /// Whether `other` lies entirely inside `self`.
    #[inline]
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// `self` ends exactly one byte before `other` starts.
    #[inline]
    #[must_use]
    pub fn abuts(&self, other: &Self) -> bool {
        self.end.checked_add(1) == Some(other.start)
    }

    /// Same interval, regardless of state.
    #[inline]
    #[must_use]
    pub fn same_span(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:X}-0x{:X} ", self.start.as_u64(), self.end.as_u64())?;
        match self.state {
            RegionState::Free => write!(f, "free]"),
            RegionState::Allocated(owner) => write!(f, "alloc/{}]", owner.as_u64()),
        }
    }
}
