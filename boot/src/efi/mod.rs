// UEFI boot services backend
// Implements the loader's firmware traits on top of the `uefi` crate

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::ffi::c_void;
use core::marker::PhantomData;
use core::ptr::NonNull;

use log::{debug, warn};
use shared::{MemoryRangeDescriptor, INITRD_MEDIA_PATH};
use uefi::data_types::Identify;
use uefi::prelude::*;
use uefi::proto::device_path::text::{AllowShortcuts, DevicePathToText, DisplayOnly};
use uefi::proto::device_path::{DevicePath, FfiDevicePath};
use uefi::proto::loaded_image::LoadedImage;
use uefi::proto::media::file::{Directory, File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::table::boot::{
    LoadImageSource, MemoryType, OpenProtocolAttributes, OpenProtocolParams, SearchType,
};
use uefi::CString16;

use crate::error::HintError;
use crate::firmware::{FileReader, Firmware, PoolAllocator, Volume};
use crate::policy::{decode_hint, BootHint};
use crate::ramdisk::MediaProvider;

use crate::load_file2::{LoadFile2Interface, LOAD_FILE2_GUID};

/// Vendor media path the kernel's EFI stub looks up to find its initrd.
/// Installed by address, so it must live in a static.
static INITRD_DEVICE_PATH: [u8; INITRD_MEDIA_PATH.len()] = INITRD_MEDIA_PATH;

/// Boot services as seen by this image
pub struct EfiFirmware<'bs> {
    bs: &'bs BootServices,
    image: Handle,
}

impl<'bs> EfiFirmware<'bs> {
    pub fn new(bs: &'bs BootServices, image: Handle) -> Self {
        Self { bs, image }
    }

    fn get_protocol<P: uefi::proto::ProtocolPointer + ?Sized>(
        &self,
        handle: Handle,
    ) -> uefi::Result<uefi::table::boot::ScopedProtocol<'bs, P>> {
        // Non-exclusive: the filesystem and device path protocols stay usable
        // by their drivers and other agents.
        unsafe {
            self.bs.open_protocol::<P>(
                OpenProtocolParams {
                    handle,
                    agent: self.image,
                    controller: None,
                },
                OpenProtocolAttributes::GetProtocol,
            )
        }
    }
}

impl PoolAllocator for EfiFirmware<'_> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Status> {
        let ptr = self
            .bs
            .allocate_pool(MemoryType::LOADER_DATA, size)
            .map_err(|err| err.status())?;
        NonNull::new(ptr).ok_or(Status::OUT_OF_RESOURCES)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, _size: usize) {
        if let Err(err) = self.bs.free_pool(ptr.as_ptr()) {
            warn!("FreePool({:p}) failed: {:?}", ptr, err.status());
        }
    }
}

/// Open root directory of a simple filesystem
pub struct EfiVolume {
    root: Directory,
}

impl Volume for EfiVolume {
    type File = EfiFile;

    fn open_read(&mut self, path: &str) -> Result<EfiFile, Status> {
        let path = CString16::try_from(path).map_err(|_| Status::INVALID_PARAMETER)?;
        let handle = self
            .root
            .open(&path, FileMode::Read, FileAttribute::empty())
            .map_err(|err| err.status())?;
        // A directory at the kernel path is as good as no kernel.
        let file = handle.into_regular_file().ok_or(Status::NOT_FOUND)?;
        Ok(EfiFile { file })
    }
}

pub struct EfiFile {
    file: RegularFile,
}

impl FileReader for EfiFile {
    fn size(&mut self) -> Result<u64, Status> {
        let info = self
            .file
            .get_boxed_info::<FileInfo>()
            .map_err(|err| err.status())?;
        Ok(info.file_size())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status> {
        self.file.read(buffer).map_err(|err| err.status())
    }
}

/// Installed initrd media handle; dropping it uninstalls both interfaces.
pub struct RamdiskRegistration<'a> {
    bs: &'a BootServices,
    handle: Handle,
    interface: Box<LoadFile2Interface>,
    _provider: PhantomData<&'a dyn MediaProvider>,
}

impl Drop for RamdiskRegistration<'_> {
    fn drop(&mut self) {
        let interface: *mut LoadFile2Interface = &mut *self.interface;
        unsafe {
            if let Err(err) = self.bs.uninstall_protocol_interface(
                self.handle,
                &LOAD_FILE2_GUID,
                interface.cast::<c_void>(),
            ) {
                warn!("Uninstall LoadFile2(initrd) failed: {:?}", err.status());
            }
            if let Err(err) = self.bs.uninstall_protocol_interface(
                self.handle,
                &DevicePath::GUID,
                INITRD_DEVICE_PATH.as_ptr().cast_mut().cast::<c_void>(),
            ) {
                warn!("Uninstall DevicePath(initrd) failed: {:?}", err.status());
            }
        }
        debug!("Initrd media handle {:?} removed", self.handle);
    }
}

/// Loaded kernel image; unloaded on drop unless it was started.
pub struct KernelImage<'bs> {
    bs: &'bs BootServices,
    handle: Handle,
    /// Backing store of the image's load options
    _options: Option<CString16>,
    started: bool,
}

impl Drop for KernelImage<'_> {
    fn drop(&mut self) {
        if self.started {
            return;
        }
        if let Err(err) = self.bs.unload_image(self.handle) {
            warn!("UnloadImage(kernel) failed: {:?}", err.status());
        }
    }
}

impl<'bs> Firmware for EfiFirmware<'bs> {
    type Handle = Handle;
    type Volume = EfiVolume;
    type Registration<'a> = RamdiskRegistration<'a> where Self: 'a;
    type Image = KernelImage<'bs>;

    fn boot_hint(&self) -> Result<Option<BootHint>, HintError> {
        let loaded = match self.bs.open_protocol_exclusive::<LoadedImage>(self.image) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("HandleProtocol(LoadedImage) failed: {:?}", err.status());
                return Ok(None);
            }
        };
        match loaded.load_options_as_bytes() {
            Some(raw) => decode_hint(raw),
            None => Ok(None),
        }
    }

    fn filesystem_handles(&self) -> Result<Vec<Handle>, Status> {
        let handles = self
            .bs
            .locate_handle_buffer(SearchType::ByProtocol(&SimpleFileSystem::GUID))
            .map_err(|err| err.status())?;
        Ok(handles.iter().copied().collect())
    }

    fn describe(&self, handle: Handle) -> Option<String> {
        let path = self.get_protocol::<DevicePath>(handle).ok()?;
        let to_text = self
            .bs
            .get_handle_for_protocol::<DevicePathToText>()
            .and_then(|h| self.bs.open_protocol_exclusive::<DevicePathToText>(h))
            .ok()?;
        let text = to_text
            .convert_device_path_to_text(
                self.bs,
                &path,
                DisplayOnly(false),
                AllowShortcuts(false),
            )
            .ok()?;
        Some(format!("{}", &*text))
    }

    fn open_volume(&self, handle: Handle) -> Result<EfiVolume, Status> {
        let mut fs = self
            .get_protocol::<SimpleFileSystem>(handle)
            .map_err(|err| err.status())?;
        let root = fs.open_volume().map_err(|err| err.status())?;
        Ok(EfiVolume { root })
    }

    fn install_ramdisk<'a>(
        &'a self,
        provider: &'a dyn MediaProvider,
    ) -> Result<RamdiskRegistration<'a>, Status> {
        // Safety: the registration borrows `provider` for 'a and uninstalls
        // the interface before that borrow ends.
        let mut interface = Box::new(unsafe { LoadFile2Interface::new(provider) });
        let interface_ptr: *mut LoadFile2Interface = &mut *interface;

        let handle = unsafe {
            self.bs.install_protocol_interface(
                None,
                &DevicePath::GUID,
                INITRD_DEVICE_PATH.as_ptr().cast_mut().cast::<c_void>(),
            )
        }
        .map_err(|err| err.status())?;

        let installed = unsafe {
            self.bs.install_protocol_interface(
                Some(handle),
                &LOAD_FILE2_GUID,
                interface_ptr.cast::<c_void>(),
            )
        };
        if let Err(err) = installed {
            let removed = unsafe {
                self.bs.uninstall_protocol_interface(
                    handle,
                    &DevicePath::GUID,
                    INITRD_DEVICE_PATH.as_ptr().cast_mut().cast::<c_void>(),
                )
            };
            if let Err(undo) = removed {
                warn!("Uninstall DevicePath(initrd) failed: {:?}", undo.status());
            }
            return Err(err.status());
        }

        Ok(RamdiskRegistration {
            bs: self.bs,
            handle,
            interface,
            _provider: PhantomData,
        })
    }

    fn load_image(
        &self,
        descriptor: &MemoryRangeDescriptor,
        image: &[u8],
    ) -> Result<KernelImage<'bs>, Status> {
        // Safety: the descriptor is a complete node sequence ending in an
        // end-of-path record.
        let path = unsafe {
            DevicePath::from_ffi_ptr(descriptor.as_bytes().as_ptr().cast::<FfiDevicePath>())
        };
        let handle = self
            .bs
            .load_image(
                self.image,
                LoadImageSource::FromBuffer {
                    buffer: image,
                    file_path: Some(path),
                },
            )
            .map_err(|err| err.status())?;

        Ok(KernelImage {
            bs: self.bs,
            handle,
            _options: None,
            started: false,
        })
    }

    fn set_load_options(
        &self,
        image: &mut KernelImage<'bs>,
        command_line: &str,
    ) -> Result<(), Status> {
        let options = CString16::try_from(command_line).map_err(|_| Status::INVALID_PARAMETER)?;
        let size = u32::try_from(options.num_bytes()).map_err(|_| Status::BAD_BUFFER_SIZE)?;

        let mut loaded = self
            .bs
            .open_protocol_exclusive::<LoadedImage>(image.handle)
            .map_err(|err| err.status())?;
        // Safety: `options` is kept alive in `image` until the image is
        // unloaded or has returned from StartImage.
        unsafe { loaded.set_load_options(options.as_ptr().cast::<u8>(), size) };

        image._options = Some(options);
        Ok(())
    }

    fn start_image(&self, mut image: KernelImage<'bs>) -> Status {
        image.started = true;
        match self.bs.start_image(image.handle) {
            Ok(()) => Status::SUCCESS,
            Err(err) => err.status(),
        }
    }
}
