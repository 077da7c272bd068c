use crate::allocator::commit;
use crate::{
    AddressClass, AllocError, Buffer, ContigAllocator, OwnerId, PhysicalAddress, Region,
    RegionState,
};
use alloc::vec::Vec;
use contig_abi::HostBufferRequest;
use log::{debug, error, info};

impl ContigAllocator {
    /// Free every region still allocated to `owner`.
    ///
    /// Returns the number of regions released. Regions are released one by one,
    /// lowest first, so free neighbours coalesce as they appear.
    ///
    /// # Errors
    /// [`AllocError::Halted`] or [`AllocError::InvariantViolation`]; a violation
    /// stops the cleanup partway.
    pub fn release_owner(&self, owner: OwnerId) -> Result<usize, AllocError> {
        let mut table = self.table.lock()?;

        let mut released = 0;
        while let Some(region) = table.first_owned_by(owner).copied() {
            commit(&mut table, region.with_state(RegionState::Free))?;
            released += 1;
        }

        if released > 0 {
            debug!("{owner}: released {released} region(s)");
        }
        Ok(released)
    }

    /// Reclaim everything `owner` still holds once it has gone away.
    ///
    /// Never fails; problems are logged and `0` is returned.
    pub fn on_owner_terminated(&self, owner: OwnerId) -> usize {
        match self.release_owner(owner) {
            Ok(released) => {
                if released > 0 {
                    info!("reclaimed {released} region(s) left behind by {owner}");
                }
                released
            }
            Err(e) => {
                error!("could not reclaim the regions of {owner}: {e}");
                0
            }
        }
    }

    /// Open a handle through which `owner` talks to the allocator.
    ///
    /// Dropping the handle reclaims whatever `owner` still holds.
    #[must_use]
    pub const fn open_session(&self, owner: OwnerId) -> OwnerSession<'_> {
        OwnerSession {
            allocator: self,
            owner,
        }
    }
}

/// An open requester handle. Tied to one [`OwnerId`].
///
/// Models the lifetime of a requester process: when the session is dropped the
/// requester is considered terminated and its regions are freed.
pub struct OwnerSession<'a> {
    allocator: &'a ContigAllocator,
    owner: OwnerId,
}

impl OwnerSession<'_> {
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// See [`ContigAllocator::allocate_batch`].
    ///
    /// # Errors
    /// As for [`ContigAllocator::allocate_batch`].
    pub fn allocate(
        &self,
        class: AddressClass,
        lengths: &[u64],
    ) -> Result<Vec<Result<PhysicalAddress, AllocError>>, AllocError> {
        self.allocator.allocate_batch(self.owner, class, lengths)
    }

    /// See [`ContigAllocator::free_batch`].
    ///
    /// # Errors
    /// As for [`ContigAllocator::free_batch`].
    pub fn free(&self, buffers: &[Buffer]) -> Result<(), AllocError> {
        self.allocator.free_batch(self.owner, buffers)
    }

    /// See [`ContigAllocator::dispatch`].
    ///
    /// # Errors
    /// As for [`ContigAllocator::dispatch`].
    pub fn dispatch(&self, code: u32, request: &mut HostBufferRequest) -> Result<(), AllocError> {
        self.allocator.dispatch(self.owner, code, request)
    }

    #[must_use]
    pub fn mapping_for(&self, base: PhysicalAddress, length: u64) -> Option<Region> {
        self.allocator.mapping_for(self.owner, base, length)
    }
}

impl Drop for OwnerSession<'_> {
    fn drop(&mut self) {
        self.allocator.on_owner_terminated(self.owner);
    }
}
