#![cfg_attr(not(test), no_std)]

// Second-stage UEFI loader
// Finds the volume holding the kernel, loads the kernel and an optional
// ramdisk, publishes the ramdisk for the kernel's EFI stub and starts the
// kernel with the command line for the selected boot policy.

extern crate alloc;

pub mod config;
pub mod error;
pub mod firmware;
pub mod loader;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod ramdisk;
pub mod volume;

#[cfg(target_os = "uefi")]
pub mod efi;
#[cfg(any(test, target_os = "uefi"))]
pub mod load_file2;

#[cfg(test)]
mod mock;

pub use config::LoaderConfig;
pub use error::{BootError, HintError};
pub use orchestrator::{boot, BootStage, Loader};
pub use policy::{BootDecision, BootMode};
