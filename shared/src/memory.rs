// Memory region types shared across stage2 crates

/// UEFI memory type code stored in memory-mapped device path records.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// EfiLoaderData, used for every pool buffer this loader allocates
    LoaderData = 2,
}

impl MemoryKind {
    /// Raw `EFI_MEMORY_TYPE` value
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Physical memory range holding an in-RAM image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Physical start address
    pub start: u64,
    /// Length in bytes
    pub len: u64,
    /// Memory kind the range was allocated as
    pub kind: MemoryKind,
}

impl MemoryRegion {
    /// Create a new region
    pub const fn new(start: u64, len: u64, kind: MemoryKind) -> Self {
        Self { start, len, kind }
    }

    /// Inclusive end address, `start + len - 1`.
    ///
    /// A zero-length region yields an end below its start (wrapping at zero);
    /// this is what firmware sees for an empty image and is not rejected here.
    pub const fn end_inclusive(&self) -> u64 {
        self.start.wrapping_add(self.len).wrapping_sub(1)
    }
}
