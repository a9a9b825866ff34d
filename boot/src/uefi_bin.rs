// UEFI binary entry point
// Built as an EFI application; on other targets this is an empty program

#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

#[cfg(not(target_os = "uefi"))]
fn main() {}

#[cfg(target_os = "uefi")]
use stage2::efi::EfiFirmware;
#[cfg(target_os = "uefi")]
use stage2::LoaderConfig;
#[cfg(target_os = "uefi")]
use uefi::prelude::*;

#[cfg(target_os = "uefi")]
#[entry]
fn efi_main(image: Handle, mut system_table: SystemTable<Boot>) -> Status {
    if let Err(err) = uefi_services::init(&mut system_table) {
        return err.status();
    }
    log::set_max_level(log::LevelFilter::Info);

    let fw = EfiFirmware::new(system_table.boot_services(), image);
    stage2::boot(&fw, &LoaderConfig::default())
}
