//! In-memory ramdisk media
//!
//! The kernel's EFI stub fetches its initrd by querying a media provider
//! registered under the Linux initrd media device path. The query is
//! two-phase: ask with no (or a too small) buffer to learn the size, then ask
//! again with a buffer big enough to receive the bytes.

use log::debug;

use crate::error::BootError;
use crate::memory::PoolBuffer;

/// Answers "give me the media bytes" queries.
pub trait MediaProvider {
    /// Copy the media into `buffer`.
    ///
    /// Returns the number of bytes copied. With no buffer, or one shorter
    /// than the media, fails with [`BootError::BufferTooSmall`] carrying the
    /// required size. Repeated calls always give the same answer.
    fn provide(&self, buffer: Option<&mut [u8]>) -> Result<usize, BootError>;
}

/// Ramdisk image held in pool memory for the kernel to fetch
///
/// Owns the ramdisk buffer for the rest of the boot; the buffer is only
/// freed if the boot fails and the provider is dropped.
pub struct RamdiskProvider<'a> {
    image: Option<PoolBuffer<'a>>,
}

impl<'a> RamdiskProvider<'a> {
    pub fn new(image: PoolBuffer<'a>) -> Self {
        Self { image: Some(image) }
    }

    /// Provider with no ramdisk behind it; every query fails with not-found.
    pub fn empty() -> Self {
        Self { image: None }
    }

    pub fn len(&self) -> usize {
        self.image.as_ref().map_or(0, PoolBuffer::len)
    }

    /// Whether there are no ramdisk bytes to hand out
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MediaProvider for RamdiskProvider<'_> {
    fn provide(&self, buffer: Option<&mut [u8]>) -> Result<usize, BootError> {
        let image = match &self.image {
            Some(image) if !image.is_empty() => image.as_slice(),
            _ => return Err(BootError::NotFound),
        };

        match buffer {
            Some(out) if out.len() >= image.len() => {
                out[..image.len()].copy_from_slice(image);
                debug!("Ramdisk query served {} bytes", image.len());
                Ok(image.len())
            }
            _ => Err(BootError::BufferTooSmall {
                required: image.len(),
            }),
        }
    }
}
