//! Whole-file loading into pool memory

use log::{error, info, warn};
use uefi::Status;

use crate::error::BootError;
use crate::firmware::{FileReader, PoolAllocator, Volume};
use crate::memory::PoolBuffer;

/// Read `path` from `root` into a freshly allocated buffer of exactly the
/// file's size.
///
/// The file is closed before returning. On any failure after allocation the
/// buffer is freed, so callers never see a partial allocation. A zero-length
/// file yields an empty buffer, not an error.
pub fn load_file<'a, V: Volume>(
    pool: &'a dyn PoolAllocator,
    root: &mut V,
    path: &str,
) -> Result<PoolBuffer<'a>, BootError> {
    if path.is_empty() {
        return Err(BootError::InvalidArgument);
    }

    let mut file = root.open_read(path).map_err(|status| {
        warn!("Open({}) failed: {:?}", path, status);
        BootError::from_io(status)
    })?;

    let size = file.size().map_err(|status| {
        error!("GetInfo(size) failed for {}: {:?}", path, status);
        BootError::Io(status)
    })?;

    let len = usize::try_from(size).map_err(|_| BootError::AllocationFailure {
        size,
        status: Status::BAD_BUFFER_SIZE,
    })?;

    let mut buffer = PoolBuffer::allocate(pool, len).map_err(|err| {
        error!("AllocatePool(file buffer) failed for {}: {}", path, err);
        err
    })?;

    read_exact(&mut file, buffer.as_mut_slice()).map_err(|err| {
        error!("Read({}) failed: {}", path, err);
        err
    })?;
    drop(file);

    info!(
        "Loaded {} at {:#x} size={}",
        path,
        buffer.address(),
        buffer.len()
    );
    Ok(buffer)
}

/// Fill `out` completely. Running out of data early is an error, never a
/// silently truncated buffer.
fn read_exact<F: FileReader>(file: &mut F, out: &mut [u8]) -> Result<(), BootError> {
    let mut filled = 0;
    while filled < out.len() {
        let read = file.read(&mut out[filled..]).map_err(BootError::Io)?;
        if read == 0 {
            return Err(BootError::Io(Status::END_OF_FILE));
        }
        filled += read.min(out.len() - filled);
    }
    Ok(())
}
