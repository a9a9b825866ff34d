//! Boot sequence
//!
//! One linear pass, no retries:
//!
//! ```text
//! Start -> VolumeLocated -> KernelLoaded -> RamdiskLoaded | RamdiskSkipped
//!       -> RamdiskRegistered | RamdiskAbsent -> DescriptorBuilt
//!       -> ImageLoaded -> CommandLineSet -> Started
//! ```
//!
//! A failure at any stage returns immediately. Everything acquired so far is
//! released by `Drop` on the way out: the filesystem root is closed, pool
//! buffers are freed, the ramdisk provider is uninstalled and a loaded but
//! unstarted kernel image is unloaded. Only a started kernel keeps its
//! memory.

use core::convert::Infallible;
use core::fmt;

use heapless::Vec;
use log::{debug, error, info, warn};
use shared::MemoryRangeDescriptor;
use uefi::Status;

use crate::config::LoaderConfig;
use crate::error::BootError;
use crate::firmware::Firmware;
use crate::loader::load_file;
use crate::policy::{self, BootDecision};
use crate::ramdisk::RamdiskProvider;
use crate::volume;

/// Progress through the boot sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    Start,
    VolumeLocated,
    KernelLoaded,
    RamdiskLoaded,
    RamdiskSkipped,
    RamdiskRegistered,
    RamdiskAbsent,
    DescriptorBuilt,
    ImageLoaded,
    CommandLineSet,
    Started,
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Transitions on the longest path through [`BootStage`], not counting `Start`
const MAX_STAGES: usize = 8;

/// Drives one boot attempt against a [`Firmware`]
pub struct Loader<'f, F: Firmware> {
    fw: &'f F,
    config: &'f LoaderConfig,
    history: Vec<BootStage, MAX_STAGES>,
}

impl<'f, F: Firmware> Loader<'f, F> {
    pub fn new(fw: &'f F, config: &'f LoaderConfig) -> Self {
        Self {
            fw,
            config,
            history: Vec::new(),
        }
    }

    /// Last stage reached
    pub fn stage(&self) -> BootStage {
        self.history.last().copied().unwrap_or(BootStage::Start)
    }

    /// Every stage reached after `Start`, in order
    pub fn history(&self) -> &[BootStage] {
        &self.history
    }

    fn advance(&mut self, stage: BootStage) {
        debug!("Boot stage {} -> {}", self.stage(), stage);
        if self.history.push(stage).is_err() {
            warn!("Boot stage history full, dropping {}", stage);
        }
    }

    /// Read the upstream hint and pick the boot policy.
    ///
    /// A malformed hint is logged and treated as no hint.
    pub fn decide(&self) -> BootDecision {
        let hint = match self.fw.boot_hint() {
            Ok(Some(hint)) => {
                info!("Received LoadOptions ({} chars): {}", hint.chars().count(), hint);
                Some(hint)
            }
            Ok(None) => {
                info!("No LoadOptions from upstream stage (assume Local)");
                None
            }
            Err(err) => {
                warn!("Ignoring boot hint: {} (assume Local)", err);
                None
            }
        };

        let decision = policy::select(hint.as_deref(), self.config);
        info!("Boot source: {}", decision.mode);
        info!("UseInitrd={}", decision.include_ramdisk as u8);
        info!("Selected cmdline: {}", decision.command_line);
        decision
    }

    /// Run the boot sequence for `decision`.
    ///
    /// Never returns `Ok`: on success control belongs to the kernel. If the
    /// kernel's StartImage returns at all, that is reported as
    /// [`BootError::Start`].
    pub fn run(&mut self, decision: &BootDecision) -> Result<Infallible, BootError> {
        let fw = self.fw;
        let config = self.config;

        info!("Searching for filesystem containing {}", config.kernel_path);
        let volume = volume::locate(fw, config.kernel_path).map_err(|err| {
            error!("FindBootFileSystem() failed: {}", err);
            err
        })?;
        let mut root = volume.root;
        self.advance(BootStage::VolumeLocated);

        let kernel = load_file(fw, &mut root, config.kernel_path).map_err(|err| {
            error!("Failed to load kernel {}: {}", config.kernel_path, err);
            err
        })?;
        if kernel.is_empty() {
            error!("Kernel {} is empty", config.kernel_path);
            return Err(BootError::InvalidArgument);
        }
        info!(
            "Kernel loaded at {:#x} size={}",
            kernel.address(),
            kernel.len()
        );
        self.advance(BootStage::KernelLoaded);

        let ramdisk = if decision.include_ramdisk {
            match load_file(fw, &mut root, config.ramdisk_path) {
                Ok(ramdisk) => {
                    info!(
                        "Initrd loaded at {:#x} size={}",
                        ramdisk.address(),
                        ramdisk.len()
                    );
                    self.advance(BootStage::RamdiskLoaded);
                    Some(ramdisk)
                }
                Err(err) => {
                    warn!(
                        "Initrd {} not loaded: {} (booting without initrd)",
                        config.ramdisk_path, err
                    );
                    self.advance(BootStage::RamdiskSkipped);
                    None
                }
            }
        } else {
            info!("Skipping initrd (network/NFS boot)");
            self.advance(BootStage::RamdiskSkipped);
            None
        };

        // Both files are in memory now.
        drop(root);

        let provider = match ramdisk {
            Some(image) if !image.is_empty() => RamdiskProvider::new(image),
            _ => RamdiskProvider::empty(),
        };

        let _registration = if !provider.is_empty() {
            let registration = fw.install_ramdisk(&provider).map_err(|status| {
                error!("InstallMultipleProtocolInterfaces(initrd) failed: {:?}", status);
                BootError::Registration(status)
            })?;
            info!(
                "Initrd registered via LINUX_EFI_INITRD_MEDIA_GUID (size={})",
                provider.len()
            );
            self.advance(BootStage::RamdiskRegistered);
            Some(registration)
        } else {
            self.advance(BootStage::RamdiskAbsent);
            None
        };

        let descriptor = MemoryRangeDescriptor::new(kernel.region());
        debug!("Kernel device path: {:?}", descriptor);
        self.advance(BootStage::DescriptorBuilt);

        let mut image = fw
            .load_image(&descriptor, kernel.as_slice())
            .map_err(|status| {
                error!("LoadImage(kernel via MemMap DP) failed: {:?}", status);
                BootError::Load(status)
            })?;
        self.advance(BootStage::ImageLoaded);

        fw.set_load_options(&mut image, decision.command_line)
            .map_err(|status| {
                error!("Setting kernel LoadOptions failed: {:?}", status);
                BootError::Load(status)
            })?;
        info!("Using kernel cmdline: {}", decision.command_line);
        self.advance(BootStage::CommandLineSet);

        info!("Starting kernel Image...");
        kernel.transfer();
        self.advance(BootStage::Started);

        let status = fw.start_image(image);
        warn!("StartImage(kernel) returned: {:?}", status);
        Err(BootError::Start(status))
    }
}

/// Decide, then boot. Only returns if the boot failed; the returned status
/// is the one to hand back to this image's caller.
pub fn boot<F: Firmware>(fw: &F, config: &LoaderConfig) -> Status {
    info!("stage2 loader start");

    let mut loader = Loader::new(fw, config);
    let decision = loader.decide();
    let err = match loader.run(&decision) {
        Ok(never) => match never {},
        Err(err) => err,
    };

    error!("Boot failed after {}: {}", loader.stage(), err);
    let status = err.status();
    info!("stage2 loader exit: {:?}", status);
    status
}
