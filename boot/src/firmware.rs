// Firmware services consumed by the loader
//
// The boot sequence only talks to firmware through these traits. The UEFI
// backend lives in `crate::efi` and is built for `target_os = "uefi"` only;
// host tests drive the same code through a mock.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;

use shared::MemoryRangeDescriptor;
use uefi::Status;

use crate::error::HintError;
use crate::policy::BootHint;
use crate::ramdisk::MediaProvider;

/// Pool allocator backing every file buffer
pub trait PoolAllocator {
    /// Allocate `size` bytes of LoaderData pool. `size` is never zero.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Status>;

    /// Return an allocation made by [`PoolAllocator::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `allocate(size)` on this allocator and must not
    /// be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

/// File opened read-only. Dropping it closes it.
pub trait FileReader {
    /// Size of the file in bytes
    fn size(&mut self) -> Result<u64, Status>;

    /// Read from the current position; returns the number of bytes read.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status>;
}

/// Open root directory of a volume. Dropping it closes it.
pub trait Volume {
    type File: FileReader;

    /// Open `path` (absolute, backslash separated) read-only.
    fn open_read(&mut self, path: &str) -> Result<Self::File, Status>;
}

/// Boot services used by one boot attempt
pub trait Firmware: PoolAllocator {
    type Handle: Copy + fmt::Debug;
    type Volume: Volume;
    /// Live ramdisk registration; dropping it uninstalls the provider.
    type Registration<'a>
    where
        Self: 'a;
    /// Loaded, not yet started kernel image; dropping it unloads the image.
    type Image;

    /// Hint passed by the upstream stage in this image's load options.
    fn boot_hint(&self) -> Result<Option<BootHint>, HintError>;

    /// All handles exposing simple filesystem access, in firmware order.
    fn filesystem_handles(&self) -> Result<Vec<Self::Handle>, Status>;

    /// Human readable device path of `handle`, for diagnostics only.
    fn describe(&self, handle: Self::Handle) -> Option<String>;

    fn open_volume(&self, handle: Self::Handle) -> Result<Self::Volume, Status>;

    /// Publish `provider` under the Linux initrd media device path.
    fn install_ramdisk<'a>(
        &'a self,
        provider: &'a dyn MediaProvider,
    ) -> Result<Self::Registration<'a>, Status>;

    /// Load the in-memory kernel image described by `descriptor`.
    fn load_image(
        &self,
        descriptor: &MemoryRangeDescriptor,
        image: &[u8],
    ) -> Result<Self::Image, Status>;

    /// Set the image's load options to `command_line` as NUL-terminated UCS-2.
    fn set_load_options(&self, image: &mut Self::Image, command_line: &str) -> Result<(), Status>;

    /// Transfer control to `image`. Only returns if the image exits or fails
    /// to start; the returned status is whatever firmware reported.
    fn start_image(&self, image: Self::Image) -> Status;
}
