//! Firmware environment detection.
//!
//! systemd-boot requires UEFI, so the installer checks the firmware mode
//! before touching the disk. Detection is the canonical sysfs check used by
//! systemd and grub-install: `/sys/firmware/efi` exists only when the kernel
//! booted via UEFI.

use anyhow::Result;
use std::fmt;
use std::path::Path;

/// Detected firmware mode of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareMode {
    /// UEFI firmware — GPT, ESP, systemd-boot all available
    Uefi,
    /// Legacy BIOS firmware — unsupported by this installer
    Bios,
}

impl FirmwareMode {
    /// Returns true if the system booted in UEFI mode.
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// Detect firmware mode by checking for the EFI sysfs directory.
pub fn detect_firmware_mode() -> FirmwareMode {
    detect_firmware_mode_at(Path::new("/sys/firmware"))
}

/// Detection against an arbitrary sysfs root, for tests.
fn detect_firmware_mode_at(sys_firmware: &Path) -> FirmwareMode {
    if sys_firmware.join("efi").exists() {
        log::info!("UEFI firmware detected (/sys/firmware/efi exists)");
        FirmwareMode::Uefi
    } else {
        log::info!("BIOS firmware detected (/sys/firmware/efi not found)");
        FirmwareMode::Bios
    }
}

/// Detect firmware mode, erroring when `/sys/firmware` itself is missing
/// (e.g. inside a container where the answer would be meaningless).
pub fn detect_firmware_mode_strict() -> Result<FirmwareMode> {
    let sys_firmware = Path::new("/sys/firmware");
    if !sys_firmware.exists() {
        anyhow::bail!(
            "/sys/firmware does not exist — are you running inside a container? \
             Firmware detection requires a real Linux system."
        );
    }

    let mode = detect_firmware_mode_at(sys_firmware);
    if mode.is_uefi() && !sys_firmware.join("efi/efivars").exists() {
        log::warn!(
            "/sys/firmware/efi exists but efivars not found — \
             EFI variables may not be writable"
        );
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_firmware_mode_display() {
        assert_eq!(FirmwareMode::Uefi.to_string(), "UEFI");
        assert_eq!(FirmwareMode::Bios.to_string(), "BIOS");
    }

    #[test]
    fn test_firmware_mode_predicate() {
        assert!(FirmwareMode::Uefi.is_uefi());
        assert!(!FirmwareMode::Bios.is_uefi());
    }

    #[test]
    fn test_detect_uefi_when_efi_dir_exists() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir(root.path().join("efi")).expect("mkdir efi");
        assert_eq!(detect_firmware_mode_at(root.path()), FirmwareMode::Uefi);
    }

    #[test]
    fn test_detect_bios_when_efi_dir_missing() {
        let root = tempfile::tempdir().expect("tempdir");
        assert_eq!(detect_firmware_mode_at(root.path()), FirmwareMode::Bios);
    }
}
