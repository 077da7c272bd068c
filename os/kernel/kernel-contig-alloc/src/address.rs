use core::fmt;
use core::ops::Add;

/// Physical memory address.
///
/// A thin wrapper around `u64` that marks a value as a **physical** (bus)
/// address handed out to DMA-capable devices, as opposed to a length or a
/// virtual address in some requester's mapping.
///
/// ### Examples
/// ```rust
/// # use kernel_contig_alloc::PhysicalAddress;
/// let pa = PhysicalAddress::new(0x1000);
/// assert_eq!((pa + 0x7FF).as_u64(), 0x17FF);
/// assert_eq!(pa.checked_add(u64::MAX), None);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

/// Last address a 32-bit limited requester can reach.
pub const A32_LIMIT: PhysicalAddress = PhysicalAddress::new(0xFFFF_FFFF);

/// First address above the 32-bit window; 64-bit capable requesters try here first.
pub const HIGH_MEMORY_START: PhysicalAddress = PhysicalAddress::new(0x1_0000_0000);

impl PhysicalAddress {
    /// The highest representable address.
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: u64) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Inclusive last address of a `length`-byte span starting here.
    ///
    /// `None` if `length` is zero or the span runs past the address space.
    #[inline]
    #[must_use]
    pub const fn last_of(self, length: u64) -> Option<Self> {
        if length == 0 {
            return None;
        }
        self.checked_add(length - 1)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.as_u64())
    }
}

impl fmt::LowerHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(v: PhysicalAddress) -> Self {
        v.0
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;

    /// Plain addition; callers that can overflow use [`checked_add`](Self::checked_add).
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
