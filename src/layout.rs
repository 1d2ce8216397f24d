//! Disk layout planning and application.
//!
//! Translates the chosen target disk into an ordered sequence of atomic
//! [`StorageOp`]s: wipe → partition → format → mount. Plan generation is
//! pure (no I/O); [`DiskLayout::apply`] executes the plan with host
//! utilities (sgdisk, mkfs.fat, mkfs.ext4, mount) through [`crate::cmd`].
//!
//! # Layout
//!
//! ```text
//! GPT
//!   p1  1 MiB .. 1025 MiB   EFI System Partition, FAT32, mounted at /boot
//!   p2  1025 MiB .. end-1M  root, ext4, mounted at /
//! ```
//!
//! The 1 MiB tail stays free for the GPT backup header.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cmd;
use crate::device::{humanize_size, BlockDevice};
use crate::error::InstallError;

pub const MIB: u64 = 1024 * 1024;

/// ESP starts at the conventional 1 MiB alignment boundary.
pub const ESP_START_MIB: u64 = 1;
/// 1 GiB ESP leaves room for several kernels plus fallback initramfs images.
pub const ESP_SIZE_MIB: u64 = 1024;
/// Tail reserve for the GPT backup header.
pub const TAIL_RESERVE_MIB: u64 = 1;
/// Smallest root partition worth attempting a desktop install into.
pub const MIN_ROOT_MIB: u64 = 8 * 1024;

/// A single atomic storage operation. Ordering is produced by
/// [`DiskLayout::ops`] and must not be rearranged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Destroy GPT/MBR structures on the disk (sgdisk --zap-all)
    Wipe { disk: PathBuf },
    /// Create the ESP (sgdisk -n, type ef00)
    CreateEsp {
        disk: PathBuf,
        start_mib: u64,
        size_mib: u64,
    },
    /// Create the root partition spanning to end minus the tail reserve
    CreateRoot {
        disk: PathBuf,
        start_mib: u64,
        tail_reserve_mib: u64,
    },
    /// Re-read the partition table (partprobe + udevadm settle)
    Reread { disk: PathBuf },
    /// mkfs.fat -F 32 on the ESP
    FormatEsp { device: PathBuf },
    /// mkfs.ext4 -F on the root partition
    FormatRoot { device: PathBuf },
    /// Mount the root partition at the installation mountpoint
    MountRoot {
        device: PathBuf,
        mountpoint: PathBuf,
    },
    /// Mount the ESP at <mountpoint>/boot
    MountEsp {
        device: PathBuf,
        mountpoint: PathBuf,
    },
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wipe { disk } => write!(f, "Wipe({})", disk.display()),
            Self::CreateEsp {
                disk,
                start_mib,
                size_mib,
            } => write!(
                f,
                "CreateEsp({}, {}MiB..{}MiB)",
                disk.display(),
                start_mib,
                start_mib + size_mib
            ),
            Self::CreateRoot {
                disk,
                start_mib,
                tail_reserve_mib,
            } => write!(
                f,
                "CreateRoot({}, {}MiB..end-{}MiB)",
                disk.display(),
                start_mib,
                tail_reserve_mib
            ),
            Self::Reread { disk } => write!(f, "Reread({})", disk.display()),
            Self::FormatEsp { device } => write!(f, "FormatEsp({})", device.display()),
            Self::FormatRoot { device } => write!(f, "FormatRoot({})", device.display()),
            Self::MountRoot { device, mountpoint } => write!(
                f,
                "MountRoot({} -> {})",
                device.display(),
                mountpoint.display()
            ),
            Self::MountEsp { device, mountpoint } => write!(
                f,
                "MountEsp({} -> {})",
                device.display(),
                mountpoint.display()
            ),
        }
    }
}

/// The computed partition layout for one target disk.
#[derive(Debug, Clone)]
pub struct DiskLayout {
    /// Whole-disk device, e.g. `/dev/nvme0n1`
    pub disk: PathBuf,
    /// ESP partition device, e.g. `/dev/nvme0n1p1`
    pub esp: PathBuf,
    /// Root partition device, e.g. `/dev/nvme0n1p2`
    pub root: PathBuf,
    /// Root partition size in MiB (for display only; sgdisk uses end-relative
    /// addressing)
    pub root_size_mib: u64,
    /// Installation mountpoint, e.g. `/mnt/arch`
    pub mountpoint: PathBuf,
}

/// Compute the partition layout for the chosen disk.
///
/// Errors if the disk cannot hold the ESP plus a minimum-size root.
pub fn plan_layout(device: &BlockDevice, mountpoint: &Path) -> crate::error::Result<DiskLayout> {
    let total_mib = device.size / MIB;
    let overhead_mib = ESP_START_MIB + ESP_SIZE_MIB + TAIL_RESERVE_MIB;

    if total_mib < overhead_mib + MIN_ROOT_MIB {
        return Err(InstallError::validation(format!(
            "{} is too small for an installation: {} available, {} required",
            device.path.display(),
            humanize_size(device.size),
            humanize_size((overhead_mib + MIN_ROOT_MIB) * MIB),
        )));
    }

    Ok(DiskLayout {
        disk: device.path.clone(),
        esp: partition_path(&device.path, 1),
        root: partition_path(&device.path, 2),
        root_size_mib: total_mib - overhead_mib,
        mountpoint: mountpoint.to_path_buf(),
    })
}

/// Generate a partition device path from a disk path and partition number.
///
/// Handles both `/dev/sdX` → `/dev/sdX1` and `/dev/nvme0n1` → `/dev/nvme0n1p1`
/// patterns.
pub fn partition_path(disk: &Path, partition_num: u32) -> PathBuf {
    let disk_str = disk.display().to_string();

    // NVMe and loop devices use a 'p' separator (e.g. /dev/nvme0n1p1)
    if disk_str.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{}p{}", disk_str, partition_num))
    } else {
        PathBuf::from(format!("{}{}", disk_str, partition_num))
    }
}

impl DiskLayout {
    /// The ordered operation sequence for this layout.
    pub fn ops(&self) -> Vec<StorageOp> {
        vec![
            StorageOp::Wipe {
                disk: self.disk.clone(),
            },
            StorageOp::CreateEsp {
                disk: self.disk.clone(),
                start_mib: ESP_START_MIB,
                size_mib: ESP_SIZE_MIB,
            },
            StorageOp::CreateRoot {
                disk: self.disk.clone(),
                start_mib: ESP_START_MIB + ESP_SIZE_MIB,
                tail_reserve_mib: TAIL_RESERVE_MIB,
            },
            StorageOp::Reread {
                disk: self.disk.clone(),
            },
            StorageOp::FormatEsp {
                device: self.esp.clone(),
            },
            StorageOp::FormatRoot {
                device: self.root.clone(),
            },
            StorageOp::MountRoot {
                device: self.root.clone(),
                mountpoint: self.mountpoint.clone(),
            },
            StorageOp::MountEsp {
                device: self.esp.clone(),
                mountpoint: self.mountpoint.join("boot"),
            },
        ]
    }

    /// Multi-line summary for the pre-flight confirmation.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Disk layout for {}:", self.disk.display()),
            format!(
                "  {} - EFI System Partition ({} MiB, FAT32) -> /boot",
                self.esp.display(),
                ESP_SIZE_MIB
            ),
            format!(
                "  {} - root ({}, ext4) -> /",
                self.root.display(),
                humanize_size(self.root_size_mib * MIB)
            ),
            format!("  Operations ({}):", self.ops().len()),
        ];
        for (i, op) in self.ops().iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, op));
        }
        lines.join("\n")
    }

    /// Execute the plan. WARNING: destroys all data on the disk.
    pub fn apply(&self) -> Result<()> {
        for op in self.ops() {
            log::info!("Storage: {}", op);
            execute_op(&op)?;
        }
        Ok(())
    }
}

fn execute_op(op: &StorageOp) -> crate::error::Result<()> {
    match op {
        StorageOp::Wipe { disk } => {
            let disk = disk.display().to_string();
            cmd::run("sgdisk", &["--zap-all", &disk])
        }
        StorageOp::CreateEsp {
            disk,
            start_mib,
            size_mib,
        } => {
            let disk = disk.display().to_string();
            let range = format!("1:{}M:+{}M", start_mib, size_mib);
            cmd::run(
                "sgdisk",
                &["-n", &range, "-t", "1:ef00", "-c", "1:EFI", &disk],
            )
        }
        StorageOp::CreateRoot {
            disk,
            start_mib,
            tail_reserve_mib,
        } => {
            let disk = disk.display().to_string();
            let range = format!("2:{}M:-{}M", start_mib, tail_reserve_mib);
            cmd::run(
                "sgdisk",
                &["-n", &range, "-t", "2:8300", "-c", "2:root", &disk],
            )
        }
        StorageOp::Reread { disk } => {
            let disk = disk.display().to_string();
            cmd::run("partprobe", &[&disk])?;
            cmd::run("udevadm", &["settle"])
        }
        StorageOp::FormatEsp { device } => {
            let device = device.display().to_string();
            cmd::run("mkfs.fat", &["-F", "32", "-n", "EFI", &device])
        }
        StorageOp::FormatRoot { device } => {
            let device = device.display().to_string();
            cmd::run("mkfs.ext4", &["-F", &device])
        }
        StorageOp::MountRoot { device, mountpoint } => mount(device, mountpoint),
        StorageOp::MountEsp { device, mountpoint } => mount(device, mountpoint),
    }
}

fn mount(device: &Path, mountpoint: &Path) -> crate::error::Result<()> {
    if !cmd::is_dry_run() {
        std::fs::create_dir_all(mountpoint)?;
    }
    cmd::run(
        "mount",
        &[
            &device.display().to_string(),
            &mountpoint.display().to_string(),
        ],
    )
}

// ============================================================================
// Tests
// ============================================================================
