#![cfg_attr(not(test), no_std)]

// Shared crate for stage2
// Firmware-facing data layouts that do not need boot services to build or test

pub mod device_path;
pub mod memory;

// Re-export shared boot types
pub use device_path::{MemoryRangeDescriptor, INITRD_MEDIA_PATH, LINUX_EFI_INITRD_MEDIA_GUID};
pub use memory::{MemoryKind, MemoryRegion};
