// EFI_LOAD_FILE2_PROTOCOL backed by a MediaProvider
//
// The firmware only sees the leading `load_file` pointer. The provider
// pointer after it is ours; the callback recovers it from `this`.

use core::ffi::c_void;
use core::ptr;

use log::warn;
use uefi::{guid, Guid, Status};

use crate::error::BootError;
use crate::ramdisk::MediaProvider;

/// `EFI_LOAD_FILE2_PROTOCOL_GUID`
pub const LOAD_FILE2_GUID: Guid = guid!("4006c0c1-fcb3-403e-996d-4a6c8724e06d");

type LoadFileFn = unsafe extern "efiapi" fn(
    this: *mut LoadFile2Interface,
    file_path: *const c_void,
    boot_policy: u8,
    buffer_size: *mut usize,
    buffer: *mut c_void,
) -> Status;

#[repr(C)]
pub struct LoadFile2Interface {
    load_file: LoadFileFn,
    provider: *const (dyn MediaProvider + 'static),
}

impl LoadFile2Interface {
    /// # Safety
    ///
    /// `provider` must outlive every call made through the interface, i.e.
    /// the interface must be uninstalled before `'a` ends.
    pub unsafe fn new<'a>(provider: &'a dyn MediaProvider) -> Self {
        let provider = core::mem::transmute::<
            *const (dyn MediaProvider + 'a),
            *const (dyn MediaProvider + 'static),
        >(provider as *const (dyn MediaProvider + 'a));
        Self {
            load_file,
            provider,
        }
    }
}

/// The media is identified by the handle the interface is installed on, so
/// `file_path` and `boot_policy` carry nothing for it and are not inspected.
unsafe extern "efiapi" fn load_file(
    this: *mut LoadFile2Interface,
    _file_path: *const c_void,
    _boot_policy: u8,
    buffer_size: *mut usize,
    buffer: *mut c_void,
) -> Status {
    if this.is_null() || buffer_size.is_null() {
        return Status::INVALID_PARAMETER;
    }

    let provider = &*(*this).provider;
    let out = if buffer.is_null() {
        None
    } else {
        Some(core::slice::from_raw_parts_mut(
            buffer.cast::<u8>(),
            ptr::read(buffer_size),
        ))
    };

    match provider.provide(out) {
        Ok(copied) => {
            *buffer_size = copied;
            Status::SUCCESS
        }
        Err(BootError::BufferTooSmall { required }) => {
            *buffer_size = required;
            Status::BUFFER_TOO_SMALL
        }
        Err(err) => {
            warn!("LoadFile2(initrd) failed: {}", err);
            err.status()
        }
    }
}
