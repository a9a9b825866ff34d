// Error types for the loader

use thiserror::Error;
use uefi::Status;

/// Loader errors
///
/// Each variant carries the firmware status it came from, when there is one,
/// so the status returned from the entry point is the one firmware reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BootError {
    #[error("Not found")]
    NotFound,

    #[error("Invalid argument")]
    InvalidArgument,

    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    #[error("Allocation of {size} bytes failed: {status:?}")]
    AllocationFailure { size: u64, status: Status },

    #[error("I/O error: {0:?}")]
    Io(Status),

    #[error("Ramdisk registration failed: {0:?}")]
    Registration(Status),

    #[error("Kernel image load failed: {0:?}")]
    Load(Status),

    #[error("Kernel image start failed: {0:?}")]
    Start(Status),
}

impl BootError {
    /// Map a filesystem-layer status, keeping NOT_FOUND distinguishable.
    pub fn from_io(status: Status) -> Self {
        if status == Status::NOT_FOUND {
            BootError::NotFound
        } else {
            BootError::Io(status)
        }
    }

    /// Status reported to the loader's own caller.
    pub fn status(&self) -> Status {
        match *self {
            BootError::NotFound => Status::NOT_FOUND,
            BootError::InvalidArgument => Status::INVALID_PARAMETER,
            BootError::BufferTooSmall { .. } => Status::BUFFER_TOO_SMALL,
            BootError::AllocationFailure { status, .. } => status,
            BootError::Io(status) | BootError::Registration(status) | BootError::Load(status) => {
                status
            }
            // A kernel that returns from StartImage is a failed boot even if
            // it reported success.
            BootError::Start(status) if status.is_error() => status,
            BootError::Start(_) => Status::ABORTED,
        }
    }
}

/// Malformed boot hints. Never fatal: the caller falls back to local boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HintError {
    #[error("Boot hint longer than {max} characters")]
    TooLong { max: usize },

    #[error("Boot hint is not valid UCS-2")]
    InvalidEncoding,
}
