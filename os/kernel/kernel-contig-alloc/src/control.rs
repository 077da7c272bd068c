//! The control entry point: decodes a command code and its
//! [`HostBufferRequest`] and routes them to the allocator.

use crate::allocator::ensure_batch_size;
use crate::{AddressClass, AllocError, Buffer, ContigAllocator, InvalidArgument, OwnerId};
use alloc::vec::Vec;
use contig_abi::{BufferDescriptor, Command, HostBufferRequest, MAX_BUFFERS_PER_CALL};

impl ContigAllocator {
    /// Execute control command `code` on behalf of `owner`.
    ///
    /// For the allocation commands every descriptor is rewritten in place: the
    /// granted base address on success, [`BufferDescriptor::FAILED`] if that
    /// buffer could not be allocated. For [`Command::Free`] the descriptors are
    /// left untouched.
    ///
    /// # Errors
    /// - [`InvalidArgument::UnknownCommand`] if `code` is not a known command.
    /// - [`InvalidArgument::TooManyBuffers`] if `num_buffers` is out of range.
    /// - Anything [`allocate_batch`](Self::allocate_batch) or
    ///   [`free_batch`](Self::free_batch) reports for the whole call.
    pub fn dispatch(
        &self,
        owner: OwnerId,
        code: u32,
        request: &mut HostBufferRequest,
    ) -> Result<(), AllocError> {
        let command = Command::from_code(code).ok_or(InvalidArgument::UnknownCommand(code))?;

        let count = usize::try_from(request.num_buffers).unwrap_or(usize::MAX);
        ensure_batch_size(count)?;
        let descriptors = request
            .active_mut()
            .ok_or(InvalidArgument::TooManyBuffers {
                count,
                max: MAX_BUFFERS_PER_CALL,
            })?;

        match command {
            Command::AllocA64 | Command::AllocA32 => {
                let class = if command == Command::AllocA32 {
                    AddressClass::A32
                } else {
                    AddressClass::A64
                };

                let lengths: Vec<u64> = descriptors.iter().map(|d| d.length).collect();
                let results = self.allocate_batch(owner, class, &lengths)?;
                for (descriptor, result) in descriptors.iter_mut().zip(results) {
                    *descriptor = match result {
                        Ok(base) => BufferDescriptor::new(base.as_u64(), descriptor.length),
                        Err(_) => BufferDescriptor::FAILED,
                    };
                }
                Ok(())
            }
            Command::Free => {
                let buffers: Vec<Buffer> = descriptors.iter().map(Buffer::from).collect();
                self.free_batch(owner, &buffers)
            }
        }
    }
}
