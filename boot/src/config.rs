//! Loader configuration
//!
//! There is no persistent configuration: every value here is fixed at build
//! time. The orchestrator takes a `&LoaderConfig` so alternative paths and
//! command lines can be substituted without touching the boot sequence.

/// Kernel command line for a locally attached root filesystem
pub const LOCAL_COMMAND_LINE: &str = concat!(
    "root=/dev/nvme0n1p1 rw rootwait rootdelay=10 rootfstype=ext4 ",
    "mminit_loglevel=4 ",
    "console=ttyTCU0,115200 ",
    "firmware_class.path=/etc/firmware ",
    "fbcon=map:0 net.ifnames=0 nospectre_bhb ",
    "video=efifb:off console=tty0",
);

/// Kernel command line for an NFS root (192.168.42.1:/volume1/nfs_root)
/// mounted after DHCP
pub const NETWORK_COMMAND_LINE: &str = concat!(
    "ip=dhcp ",
    "root=/dev/nfs rw ",
    "nfsroot=192.168.42.1:/volume1/nfs_root,vers=4,tcp ",
    "console=ttyTCU0,115200n8 console=tty0 ",
    "firmware_class.path=/etc/firmware ",
    "net.ifnames=0 ",
    "loglevel=7",
);

/// Longest boot hint, in characters, that is scanned for a boot marker
pub const MAX_HINT_LEN: usize = 512;

/// Fixed paths, markers and command lines used by one boot attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Kernel image path; also the probe used to pick the boot volume
    pub kernel_path: &'static str,
    /// Optional initrd path on the same volume as the kernel
    pub ramdisk_path: &'static str,
    /// Hint substring selecting network boot
    pub network_marker: &'static str,
    pub local_command_line: &'static str,
    pub network_command_line: &'static str,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            kernel_path: "\\boot\\Image",
            ramdisk_path: "\\boot\\initrd",
            network_marker: "BOOT=PXE",
            local_command_line: LOCAL_COMMAND_LINE,
            network_command_line: NETWORK_COMMAND_LINE,
        }
    }
}
