// Process-wide configuration for a bootinfo session. Passed explicitly into
// `open` rather than hidden behind globals -- see the "Global state" design
// note: the device path list, slot offsets, extension size, and lockfile
// directory are all run-time values a caller can substitute for testing.

/// Default extension-sector count (`E`). 1023 extension sectors plus the
/// header sector fill out a 512 KiB slot, the layout `rk-misc-tools` targets
/// on eMMC boot areas.
pub const DEFAULT_EXT_SECTORS: u16 = 1023;

pub const SECTOR_SIZE: usize = 512;

/// Candidate raw block devices to probe, in order, for the bootinfo store.
/// The first entry is the platform's eMMC boot-1 partition.
const DEFAULT_CANDIDATE_PATHS: &[&str] = &[
    "/dev/mmcblk0boot1",
    "/dev/block/by-name/misc",
];

#[derive(Debug, Clone)]
pub struct Config {
    /// Candidate device paths, probed in order; the first that exists is used.
    pub candidate_paths: Vec<String>,
    /// Byte offset of slot A on the storage device. Must be 512-byte aligned.
    pub slot_a_offset: u64,
    /// Byte offset of slot B on the storage device. Must be 512-byte aligned
    /// and must not share an erase block with slot A.
    pub slot_b_offset: u64,
    /// Compile-time extension-sector count `E`. Valid range 1..=1023.
    pub ext_sectors: u16,
    /// Directory holding the session lockfile (created mode 02770 if absent).
    pub lock_dir: String,
    /// Lockfile name within `lock_dir`.
    pub lock_file_name: String,
    /// Group name to own the lockfile directory, if any.
    pub lock_dir_group: Option<String>,
    /// sysfs directory for the write-enable gate (`force_ro`, `ro`), e.g.
    /// `/sys/block/mmcblk0boot1`. Absence of the files under it is tolerated.
    pub write_gate_sysfs_dir: Option<String>,
    /// If set, the header CRC is re-verified on load in addition to the
    /// extension CRC (see the "header CRC" open question in the design
    /// notes). Off by default: the extension CRC alone decides validity.
    pub verify_header_crc: bool,
}

impl Config {
    fn slot_len(ext_sectors: u16) -> u64 {
        (1 + ext_sectors as u64) * SECTOR_SIZE as u64
    }

    /// Platform defaults: slot A at offset 0, slot B immediately after slot A
    /// (so it cannot share an erase block with it), `E` at its default.
    pub fn new_with_base(slot_a_offset: u64) -> Self {
        let ext_sectors = DEFAULT_EXT_SECTORS;
        Config {
            candidate_paths: DEFAULT_CANDIDATE_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            slot_a_offset,
            slot_b_offset: slot_a_offset + Self::slot_len(ext_sectors),
            ext_sectors,
            lock_dir: "/run/bootinfo".to_string(),
            lock_file_name: "lockfile".to_string(),
            lock_dir_group: None,
            write_gate_sysfs_dir: None,
            verify_header_crc: false,
        }
    }

    /// Total length in bytes of a single slot (header sector + extension area).
    pub fn slot_size(&self) -> u64 {
        Self::slot_len(self.ext_sectors)
    }

    pub fn lockfile_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.lock_dir).join(&self.lock_file_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new_with_base(0)
    }
}
