// Pool-backed file buffers
//
// A `PoolBuffer` owns its allocation and frees it on drop, so every early
// return in the boot sequence releases what it allocated. The one exception is
// `transfer`, which hands the memory to the kernel for good.

use core::fmt;
use core::ptr::NonNull;

use log::info;
use shared::{MemoryKind, MemoryRegion};

use crate::error::BootError;
use crate::firmware::PoolAllocator;

/// Contiguous LoaderData allocation holding one file
pub struct PoolBuffer<'a> {
    /// `None` for zero-length buffers, which own no allocation
    ptr: Option<NonNull<u8>>,
    len: usize,
    pool: &'a dyn PoolAllocator,
}

impl<'a> PoolBuffer<'a> {
    /// Allocate a zero-filled buffer of exactly `len` bytes.
    ///
    /// A zero-length request allocates nothing and yields an empty buffer
    /// whose address is 0.
    pub fn allocate(pool: &'a dyn PoolAllocator, len: usize) -> Result<Self, BootError> {
        if len == 0 {
            return Ok(Self {
                ptr: None,
                len: 0,
                pool,
            });
        }

        let ptr = pool
            .allocate(len)
            .map_err(|status| BootError::AllocationFailure {
                size: len as u64,
                status,
            })?;

        // Pool memory is uninitialized.
        unsafe { ptr.as_ptr().write_bytes(0, len) };

        Ok(Self {
            ptr: Some(ptr),
            len,
            pool,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical address of the first byte (identity mapped during boot
    /// services), or 0 for an empty buffer.
    pub fn address(&self) -> u64 {
        self.ptr.map_or(0, |ptr| ptr.as_ptr() as u64)
    }

    pub fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.address(), self.len as u64, MemoryKind::LoaderData)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // Safety: `ptr` is a live allocation of `len` initialized bytes
            // owned by `self`.
            Some(ptr) => unsafe { core::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.ptr {
            // Safety: as above, and `&mut self` guarantees exclusive access.
            Some(ptr) => unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// Give up ownership without freeing.
    ///
    /// Used once control passes to the kernel: the returned region stays
    /// allocated for as long as the kernel wants it, which from this loader's
    /// point of view is forever.
    pub fn transfer(self) -> MemoryRegion {
        let region = self.region();
        core::mem::forget(self);
        info!(
            "Transferred {} bytes at {:#x} to the kernel",
            region.len, region.start
        );
        region
    }
}

impl Drop for PoolBuffer<'_> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // Safety: `ptr` came from `self.pool.allocate(self.len)` and is
            // no longer reachable through `self`.
            unsafe { self.pool.free(ptr, self.len) };
        }
    }
}

impl fmt::Debug for PoolBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len)
            .finish()
    }
}
