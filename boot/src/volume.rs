//! Boot volume discovery
//!
//! The volume is found by content: the first filesystem, in firmware
//! enumeration order, on which the kernel path opens. Disk and partition
//! numbering differ across platforms and boot paths, so no handle is assumed.

use log::{error, info, warn};

use crate::error::BootError;
use crate::firmware::{Firmware, Volume};

/// Volume holding the kernel, with its root directory still open
pub struct BootVolume<F: Firmware> {
    /// Position of the handle in firmware enumeration order
    pub index: usize,
    pub handle: F::Handle,
    pub root: F::Volume,
}

/// Find the first filesystem on which `probe_path` can be opened.
///
/// The probe file is closed immediately; only its existence matters. Every
/// rejected root is closed before the next candidate is tried, so on
/// `NotFound` no root is left open.
pub fn locate<F: Firmware>(fw: &F, probe_path: &str) -> Result<BootVolume<F>, BootError> {
    let handles = fw.filesystem_handles().map_err(|status| {
        error!("LocateHandleBuffer(SimpleFS) failed: {:?}", status);
        BootError::from_io(status)
    })?;

    info!("Found {} SimpleFS handles", handles.len());

    for (index, &handle) in handles.iter().enumerate() {
        if let Some(path) = fw.describe(handle) {
            info!("FS[{}] DP: {}", index, path);
        }

        let mut root = match fw.open_volume(handle) {
            Ok(root) => root,
            Err(status) => {
                warn!("OpenVolume failed for FS[{}]: {:?}", index, status);
                continue;
            }
        };

        match root.open_read(probe_path) {
            Ok(probe) => {
                drop(probe);
                info!("Found {} on filesystem handle #{}", probe_path, index);
                return Ok(BootVolume {
                    index,
                    handle,
                    root,
                });
            }
            Err(status) => {
                info!("{} not found on FS[{}]: {:?}", probe_path, index, status);
            }
        }
    }

    error!("Could not find {} on any filesystem", probe_path);
    Err(BootError::NotFound)
}
