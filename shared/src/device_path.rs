// Byte-exact UEFI device path records handed to firmware
//
// Firmware parses these directly, so every record is serialized by hand with
// little-endian fields and no padding, independent of the host's layout rules.

use crate::memory::{MemoryKind, MemoryRegion};

/// Size of the generic node header: type, subtype, 16-bit length.
pub const NODE_HEADER_LEN: usize = 4;

/// Size of a bare end-of-path record.
pub const END_NODE_LEN: usize = NODE_HEADER_LEN;

/// Size of a memory-mapped hardware record: header, memory type, start, end.
pub const MEMORY_MAPPED_NODE_LEN: usize = NODE_HEADER_LEN + 4 + 8 + 8;

/// Size of a vendor media record: header plus vendor GUID.
pub const VENDOR_MEDIA_NODE_LEN: usize = NODE_HEADER_LEN + 16;

/// Total size of a [`MemoryRangeDescriptor`].
pub const MEMORY_RANGE_PATH_LEN: usize = MEMORY_MAPPED_NODE_LEN + END_NODE_LEN;

/// Total size of [`INITRD_MEDIA_PATH`].
pub const INITRD_MEDIA_PATH_LEN: usize = VENDOR_MEDIA_NODE_LEN + END_NODE_LEN;

pub const HARDWARE_DEVICE_PATH: u8 = 0x01;
pub const MEDIA_DEVICE_PATH: u8 = 0x04;
pub const END_DEVICE_PATH: u8 = 0x7f;

pub const HW_MEMMAP_SUBTYPE: u8 = 0x03;
pub const MEDIA_VENDOR_SUBTYPE: u8 = 0x03;
pub const END_ENTIRE_SUBTYPE: u8 = 0xff;

/// LINUX_EFI_INITRD_MEDIA_GUID, 5568e427-68fc-4f3d-ac74-ca555231cc68, in
/// on-disk (mixed-endian) byte order.
pub const LINUX_EFI_INITRD_MEDIA_GUID: [u8; 16] = [
    0x27, 0xe4, 0x68, 0x55, 0xfc, 0x68, 0x3d, 0x4f, 0xac, 0x74, 0xca, 0x55, 0x52, 0x31, 0xcc, 0x68,
];

/// Vendor media path the Linux EFI stub looks up to find its initrd
/// provider, terminated by an end-of-path record.
pub const INITRD_MEDIA_PATH: [u8; INITRD_MEDIA_PATH_LEN] = initrd_media_path();

fn write_header(out: &mut [u8], at: usize, kind: u8, subtype: u8, len: usize) {
    out[at] = kind;
    out[at + 1] = subtype;
    out[at + 2..at + 4].copy_from_slice(&(len as u16).to_le_bytes());
}

const fn initrd_media_path() -> [u8; INITRD_MEDIA_PATH_LEN] {
    let vendor_len = (VENDOR_MEDIA_NODE_LEN as u16).to_le_bytes();
    let end_len = (END_NODE_LEN as u16).to_le_bytes();

    let mut out = [0u8; INITRD_MEDIA_PATH_LEN];
    out[0] = MEDIA_DEVICE_PATH;
    out[1] = MEDIA_VENDOR_SUBTYPE;
    out[2] = vendor_len[0];
    out[3] = vendor_len[1];
    let mut i = 0;
    while i < 16 {
        out[NODE_HEADER_LEN + i] = LINUX_EFI_INITRD_MEDIA_GUID[i];
        i += 1;
    }
    out[VENDOR_MEDIA_NODE_LEN] = END_DEVICE_PATH;
    out[VENDOR_MEDIA_NODE_LEN + 1] = END_ENTIRE_SUBTYPE;
    out[VENDOR_MEDIA_NODE_LEN + 2] = end_len[0];
    out[VENDOR_MEDIA_NODE_LEN + 3] = end_len[1];
    out
}

/// Device path describing an image that already lives in memory.
///
/// Layout (28 bytes, little-endian, packed):
///
/// | offset | size | field                                   |
/// |--------|------|-----------------------------------------|
/// | 0      | 1    | type = 0x01 (hardware)                  |
/// | 1      | 1    | subtype = 0x03 (memory mapped)          |
/// | 2      | 2    | length = 24                             |
/// | 4      | 4    | memory type                             |
/// | 8      | 8    | starting address                        |
/// | 16     | 8    | ending address (inclusive)              |
/// | 24     | 1    | type = 0x7f (end)                       |
/// | 25     | 1    | subtype = 0xff (end entire path)        |
/// | 26     | 2    | length = 4                              |
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryRangeDescriptor {
    bytes: [u8; MEMORY_RANGE_PATH_LEN],
}

impl MemoryRangeDescriptor {
    /// Build the descriptor for `region`. Zero-length regions are accepted
    /// and produce an ending address below the starting address.
    pub fn new(region: MemoryRegion) -> Self {
        let mut bytes = [0u8; MEMORY_RANGE_PATH_LEN];
        write_header(
            &mut bytes,
            0,
            HARDWARE_DEVICE_PATH,
            HW_MEMMAP_SUBTYPE,
            MEMORY_MAPPED_NODE_LEN,
        );
        bytes[4..8].copy_from_slice(&region.kind.code().to_le_bytes());
        bytes[8..16].copy_from_slice(&region.start.to_le_bytes());
        bytes[16..24].copy_from_slice(&region.end_inclusive().to_le_bytes());
        write_header(
            &mut bytes,
            MEMORY_MAPPED_NODE_LEN,
            END_DEVICE_PATH,
            END_ENTIRE_SUBTYPE,
            END_NODE_LEN,
        );
        Self { bytes }
    }

    /// Shorthand for a LoaderData range at `start` spanning `len` bytes.
    pub fn loader_data(start: u64, len: u64) -> Self {
        Self::new(MemoryRegion::new(start, len, MemoryKind::LoaderData))
    }

    /// Serialized device path, ready to be handed to firmware.
    pub const fn as_bytes(&self) -> &[u8; MEMORY_RANGE_PATH_LEN] {
        &self.bytes
    }

    pub fn memory_type(&self) -> u32 {
        u32::from_le_bytes(self.field::<4>(4))
    }

    pub fn starting_address(&self) -> u64 {
        u64::from_le_bytes(self.field::<8>(8))
    }

    pub fn ending_address(&self) -> u64 {
        u64::from_le_bytes(self.field::<8>(16))
    }

    /// Length field of the memory-mapped record.
    pub fn range_node_len(&self) -> u16 {
        u16::from_le_bytes(self.field::<2>(2))
    }

    /// Length field of the terminating record.
    pub fn end_node_len(&self) -> u16 {
        u16::from_le_bytes(self.field::<2>(MEMORY_MAPPED_NODE_LEN + 2))
    }

    fn field<const N: usize>(&self, at: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[at..at + N]);
        out
    }
}

impl core::fmt::Debug for MemoryRangeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryRangeDescriptor")
            .field("memory_type", &self.memory_type())
            .field("start", &format_args!("{:#x}", self.starting_address()))
            .field("end", &format_args!("{:#x}", self.ending_address()))
            .finish()
    }
}
