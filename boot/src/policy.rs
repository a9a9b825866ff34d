//! Boot policy selection
//!
//! The upstream stage passes a short hint through this image's load options.
//! A hint containing the network marker selects an NFS root and skips the
//! ramdisk; anything else, including no hint at all, selects the local root
//! with the ramdisk.
//!
//! Network boot never loads a ramdisk. The target's init sequence cannot
//! switch from an early ramdisk to an NFS root, so this is fixed policy rather
//! than a fallback for a missing file.

use core::fmt;

use heapless::String;

use crate::config::{LoaderConfig, MAX_HINT_LEN};
use crate::error::HintError;

/// Worst case UTF-8 size of a [`MAX_HINT_LEN`]-character hint.
pub const HINT_CAPACITY: usize = MAX_HINT_LEN * 4;

/// Decoded boot hint, bounded by [`MAX_HINT_LEN`] characters
pub type BootHint = String<HINT_CAPACITY>;

/// Where the root filesystem comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Local,
    Network,
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootMode::Local => write!(f, "Local FS"),
            BootMode::Network => write!(f, "PXE/Network"),
        }
    }
}

/// Outcome of policy selection, computed once per boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootDecision {
    pub mode: BootMode,
    pub command_line: &'static str,
    pub include_ramdisk: bool,
}

/// Pick the boot policy for `hint`.
pub fn select(hint: Option<&str>, config: &LoaderConfig) -> BootDecision {
    let network = hint.is_some_and(|h| !h.is_empty() && h.contains(config.network_marker));

    if network {
        BootDecision {
            mode: BootMode::Network,
            command_line: config.network_command_line,
            include_ramdisk: false,
        }
    } else {
        BootDecision {
            mode: BootMode::Local,
            command_line: config.local_command_line,
            include_ramdisk: true,
        }
    }
}

/// Decode raw load options (little-endian UTF-16) into a bounded hint.
///
/// Decoding stops at the first NUL. Fewer than one full code unit, or an
/// empty string, is no hint at all. The length limit counts characters, so a
/// surrogate pair counts once.
pub fn decode_hint(raw: &[u8]) -> Result<Option<BootHint>, HintError> {
    if raw.len() < 2 {
        return Ok(None);
    }

    let units = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0);

    let mut hint = BootHint::new();
    let mut chars = 0;
    for decoded in char::decode_utf16(units) {
        let c = decoded.map_err(|_| HintError::InvalidEncoding)?;
        chars += 1;
        if chars > MAX_HINT_LEN {
            return Err(HintError::TooLong { max: MAX_HINT_LEN });
        }
        hint.push(c)
            .map_err(|_| HintError::TooLong { max: MAX_HINT_LEN })?;
    }

    if hint.is_empty() {
        Ok(None)
    } else {
        Ok(Some(hint))
    }
}
