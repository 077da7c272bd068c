//! Requester side of the control protocol.
//!
//! A call carries at most [`MAX_BUFFERS_PER_CALL`] descriptors, so larger
//! requests are split into several calls.

use contig_abi::{BufferDescriptor, Command, HostBufferRequest, MAX_BUFFERS_PER_CALL};
use kernel_contig_alloc::{AllocError, InvalidArgument, OwnerSession};
use log::debug;

/// Request `count` buffers of `size` bytes each.
///
/// Returns one descriptor per requested buffer, in order; failed buffers come
/// back as [`BufferDescriptor::FAILED`].
pub fn allocate(
    session: &OwnerSession<'_>,
    command: Command,
    count: usize,
    size: u64,
) -> Result<Vec<BufferDescriptor>, AllocError> {
    let requests = vec![BufferDescriptor::request(size); count];
    let mut granted = Vec::with_capacity(count);

    for (call, chunk) in requests.chunks(MAX_BUFFERS_PER_CALL).enumerate() {
        let mut request = build(chunk)?;
        session.dispatch(command.code(), &mut request)?;
        let answer = request.active().unwrap_or_default();
        debug!(
            "call {call}: {} of {} buffers granted",
            answer.iter().filter(|d| !d.is_failed()).count(),
            answer.len()
        );
        granted.extend_from_slice(answer);
    }
    Ok(granted)
}

/// Free every granted buffer in `buffers`; failed descriptors are skipped.
pub fn free(session: &OwnerSession<'_>, buffers: &[BufferDescriptor]) -> Result<(), AllocError> {
    let granted: Vec<BufferDescriptor> = buffers
        .iter()
        .copied()
        .filter(|d| !d.is_failed())
        .collect();

    for chunk in granted.chunks(MAX_BUFFERS_PER_CALL) {
        let mut request = build(chunk)?;
        session.dispatch(Command::Free.code(), &mut request)?;
    }
    Ok(())
}

fn build(chunk: &[BufferDescriptor]) -> Result<HostBufferRequest, AllocError> {
    HostBufferRequest::from_descriptors(chunk).ok_or_else(|| {
        InvalidArgument::TooManyBuffers {
            count: chunk.len(),
            max: MAX_BUFFERS_PER_CALL,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use contig_abi::ReservedExtent;
    use kernel_contig_alloc::{ContigAllocator, OwnerId};

    #[test]
    fn large_requests_span_several_calls() {
        let pool = ContigAllocator::initialize(&[ReservedExtent::new(0x10_0000, 0x100_0000)])
            .unwrap();
        let session = pool.open_session(OwnerId::new(1));

        let granted = allocate(&session, Command::AllocA32, 150, 0x1000).unwrap();
        assert_eq!(granted.len(), 150);
        assert!(granted.iter().all(|d| !d.is_failed() && d.length == 0x1000));
        assert_eq!(pool.stats().allocated_bytes, 150 * 0x1000);

        free(&session, &granted).unwrap();
        assert_eq!(pool.stats().allocated_bytes, 0);
    }

    #[test]
    fn failed_buffers_are_reported_and_not_freed() {
        let pool = ContigAllocator::initialize(&[ReservedExtent::new(0x10_0000, 0x4000)]).unwrap();
        let session = pool.open_session(OwnerId::new(1));

        let granted = allocate(&session, Command::AllocA64, 6, 0x1000).unwrap();
        assert_eq!(granted.iter().filter(|d| d.is_failed()).count(), 2);
        free(&session, &granted).unwrap();
        assert_eq!(pool.stats().allocated_bytes, 0);
    }
}
