//! archup library
//!
//! Core functionality for the unattended personal Arch Linux installer:
//! block device enumeration, deterministic target selection, partition
//! layout, base-system installation, desktop profile, and systemd-boot.

pub mod bootloader;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod device;
pub mod error;
pub mod hardware;
pub mod install;
pub mod layout;
pub mod profile;
pub mod prompt;
pub mod select;

// Re-export main types for convenience
pub use config::{CustomRepository, InstallConfig, LocaleConfig, UserAccount};
pub use device::{enumerate_disks, humanize_size, parse_lsblk, BlockDevice, Transport};
pub use error::InstallError;
pub use hardware::{detect_firmware_mode, detect_firmware_mode_strict, FirmwareMode};
pub use install::Installer;
pub use layout::{plan_layout, DiskLayout, StorageOp};
pub use profile::{PostInstallCmd, Profile, ProfileKind};
pub use select::{select_target, Selection, SelectionReason};
