//! # Contiguous Buffer Control ABI
//!
//! Wire structures shared between requesters and the contiguous-buffer
//! allocator. A requester fills a [`HostBufferRequest`] and submits it with one
//! of the [`Command`] codes over the control channel; the allocator rewrites
//! the descriptors in place.
//!
//! ```text
//! ALLOC_A64 / ALLOC_A32               FREE
//! ┌──────────────┐                    ┌──────────────┐
//! │ num_buffers  │ n                  │ num_buffers  │ n
//! ├──────────────┤                    ├──────────────┤
//! │ [0] 0, len   │ ──► [0] base, len  │ [0] base,len │ must match an allocation
//! │ [1] 0, len   │ ──► [1] 0, 0       │ [1] base,len │ owned by the caller
//! │  ...         │     (failed)       │  ...         │
//! └──────────────┘                    └──────────────┘
//! ```
//!
//! Keep everything `#[repr(C)]` with fixed-size integers; the layout is
//! part of the command code (see [`ioctl_readwrite`]).

#![cfg_attr(not(any(test, doctest)), no_std)]

/// Maximum number of buffers a single control call may carry.
pub const MAX_BUFFERS_PER_CALL: usize = 64;

/// Magic byte used as the command "type" field.
pub const COMMAND_TYPE: u8 = b'P';

/// One host buffer: a physical base address and its length in bytes.
///
/// A descriptor with both fields zero in an allocation response marks the
/// buffer whose allocation failed.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Physical (bus) address of the first byte.
    pub base_address: u64,
    /// Length of the buffer in bytes.
    pub length: u64,
}

impl BufferDescriptor {
    /// The descriptor written back for a buffer that could not be allocated.
    pub const FAILED: Self = Self {
        base_address: 0,
        length: 0,
    };

    #[must_use]
    pub const fn new(base_address: u64, length: u64) -> Self {
        Self {
            base_address,
            length,
        }
    }

    /// A request for `length` bytes, as submitted with an allocation command.
    #[must_use]
    pub const fn request(length: u64) -> Self {
        Self::new(0, length)
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.base_address == 0 && self.length == 0
    }
}

/// The argument block of every control command.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HostBufferRequest {
    /// Number of valid entries at the start of [`buffers`](Self::buffers).
    pub num_buffers: u32,
    pub buffers: [BufferDescriptor; MAX_BUFFERS_PER_CALL],
}

impl Default for HostBufferRequest {
    fn default() -> Self {
        Self {
            num_buffers: 0,
            buffers: [BufferDescriptor::default(); MAX_BUFFERS_PER_CALL],
        }
    }
}

impl HostBufferRequest {
    /// Build a request from up to [`MAX_BUFFERS_PER_CALL`] descriptors.
    ///
    /// Returns `None` if `descriptors` does not fit into one call.
    #[must_use]
    pub fn from_descriptors(descriptors: &[BufferDescriptor]) -> Option<Self> {
        if descriptors.len() > MAX_BUFFERS_PER_CALL {
            return None;
        }
        let mut request = Self::default();
        request.buffers[..descriptors.len()].copy_from_slice(descriptors);
        request.num_buffers = u32::try_from(descriptors.len()).ok()?;
        Some(request)
    }

    /// The valid descriptors, or `None` if `num_buffers` exceeds the array.
    #[must_use]
    pub fn active(&self) -> Option<&[BufferDescriptor]> {
        let n = usize::try_from(self.num_buffers).ok()?;
        self.buffers.get(..n)
    }

    /// Mutable view of the valid descriptors.
    #[must_use]
    pub fn active_mut(&mut self) -> Option<&mut [BufferDescriptor]> {
        let n = usize::try_from(self.num_buffers).ok()?;
        self.buffers.get_mut(..n)
    }
}

/// Encode a read/write command number in the Linux `_IOWR` layout.
///
/// ```text
///  31 30 29          16 15      8 7       0
/// ┌─────┬──────────────┬─────────┬─────────┐
/// │ dir │     size     │  type   │   nr    │
/// └─────┴──────────────┴─────────┴─────────┘
/// ```
#[must_use]
pub const fn ioctl_readwrite(ty: u8, nr: u8, size: usize) -> u32 {
    const DIR_READ_WRITE: u32 = 0b11;
    #[allow(clippy::cast_possible_truncation)]
    let size = (size as u32) & 0x3FFF;
    (DIR_READ_WRITE << 30) | (size << 16) | ((ty as u32) << 8) | nr as u32
}

const REQUEST_SIZE: usize = size_of::<HostBufferRequest>();

/// Control commands understood by the allocator.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Allocate buffers for 64-bit capable DMA, preferring memory above 4 GiB.
    AllocA64 = ioctl_readwrite(COMMAND_TYPE, 1, REQUEST_SIZE),
    /// Allocate buffers that lie entirely below 4 GiB.
    AllocA32 = ioctl_readwrite(COMMAND_TYPE, 2, REQUEST_SIZE),
    /// Free buffers owned by the caller.
    Free = ioctl_readwrite(COMMAND_TYPE, 3, REQUEST_SIZE),
}

impl Command {
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            x if x == Self::AllocA64 as u32 => Some(Self::AllocA64),
            x if x == Self::AllocA32 as u32 => Some(Self::AllocA32),
            x if x == Self::Free as u32 => Some(Self::Free),
            _ => None,
        }
    }
}

/// A physical extent reserved for contiguous allocations, as identified at boot.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ReservedExtent {
    /// First physical address of the extent.
    pub start: u64,
    /// Size of the extent in bytes.
    pub size: u64,
}

impl ReservedExtent {
    #[must_use]
    pub const fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    /// Inclusive last address, or `None` for an empty or overflowing extent.
    #[must_use]
    pub const fn last(&self) -> Option<u64> {
        if self.size == 0 {
            return None;
        }
        self.start.checked_add(self.size - 1)
    }
}

const _: () = {
    assert!(REQUEST_SIZE < (1 << 14), "request does not fit the size field");
    assert!(size_of::<BufferDescriptor>() == 16);
    assert!(MAX_BUFFERS_PER_CALL <= u32::MAX as usize);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_round_trip_and_differ() {
        let all = [Command::AllocA64, Command::AllocA32, Command::Free];
        for c in all {
            assert_eq!(Command::from_code(c.code()), Some(c));
        }
        assert_ne!(Command::AllocA64.code(), Command::AllocA32.code());
        assert_eq!(Command::from_code(0), None);
    }

    #[test]
    fn command_code_layout() {
        let code = Command::AllocA32.code();
        assert_eq!(code >> 30, 0b11);
        assert_eq!((code >> 8) & 0xFF, u32::from(b'P'));
        assert_eq!(code & 0xFF, 2);
        assert_eq!(((code >> 16) & 0x3FFF) as usize, size_of::<HostBufferRequest>());
    }

    #[test]
    fn request_from_descriptors() {
        let d = [BufferDescriptor::request(0x1000), BufferDescriptor::request(0x2000)];
        let r = HostBufferRequest::from_descriptors(&d).unwrap();
        assert_eq!(r.num_buffers, 2);
        assert_eq!(r.active().unwrap(), &d);

        let too_many = [BufferDescriptor::request(1); MAX_BUFFERS_PER_CALL + 1];
        assert!(HostBufferRequest::from_descriptors(&too_many).is_none());
    }

    #[test]
    fn oversized_count_has_no_active_view() {
        let r = HostBufferRequest {
            num_buffers: 65,
            ..HostBufferRequest::default()
        };
        assert!(r.active().is_none());
    }

    #[test]
    fn extent_last_address() {
        assert_eq!(ReservedExtent::new(0x1000, 0x2000).last(), Some(0x2FFF));
        assert_eq!(ReservedExtent::new(0x1000, 0).last(), None);
        assert_eq!(ReservedExtent::new(u64::MAX, 2).last(), None);
        assert!(BufferDescriptor::FAILED.is_failed());
    }
}
