//! systemd-boot installation and configuration.
//!
//! Runs `bootctl install` inside the chroot, writes one BLS entry per
//! configured kernel, and patches `loader/loader.conf` on the ESP.
//!
//! # bootctl and chroots
//!
//! Since systemd v257 bootctl detects arch-chroot as a container environment
//! and silently skips EFI variable updates, so on v258+ the first attempt
//! forces `--variables=yes` (https://github.com/systemd/systemd/issues/36174).
//! If that fails the install is retried exactly once without touching EFI
//! variables; a second failure propagates.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cmd;

/// Fallback when `bootctl --version` cannot be queried in the chroot.
const ASSUMED_SYSTEMD_VERSION: u32 = 257;

/// Verify that the ESP is mounted at `<target>/boot` and return its path.
///
/// A missing or unmounted ESP is fatal: bootctl would otherwise install
/// into the root filesystem.
pub fn verify_esp_mounted(target: &Path) -> Result<PathBuf> {
    if cmd::is_dry_run() {
        return Ok(target.join("boot"));
    }

    let mounts =
        fs::read_to_string("/proc/self/mounts").context("Failed to read /proc/self/mounts")?;

    esp_from_mounts(&mounts, target).ok_or_else(|| {
        anyhow::anyhow!(
            "EFI system partition is not mounted at {}",
            target.join("boot").display()
        )
    })
}

/// Pure scan of a mounts table for `<target>/boot`.
fn esp_from_mounts(mounts: &str, target: &Path) -> Option<PathBuf> {
    let wanted = target.join("boot");
    let wanted = wanted.to_string_lossy();

    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .find(|mountpoint| *mountpoint == wanted)
        .map(PathBuf::from)
}

/// Query the systemd version inside the target via `bootctl --version`.
///
/// Falls back to a conservative assumption when the query fails (e.g. in
/// dry-run before anything is installed).
pub fn systemd_version(target: &Path) -> u32 {
    match cmd::run_chroot_capture(target, "bootctl --version") {
        Ok(output) => parse_systemd_version(&output).unwrap_or_else(|| {
            log::warn!(
                "Could not parse systemd version from bootctl output, assuming {}",
                ASSUMED_SYSTEMD_VERSION
            );
            ASSUMED_SYSTEMD_VERSION
        }),
        Err(e) => {
            log::warn!(
                "bootctl --version failed ({}), assuming systemd {}",
                e,
                ASSUMED_SYSTEMD_VERSION
            );
            ASSUMED_SYSTEMD_VERSION
        }
    }
}

/// Extract the major version from `bootctl --version` output, e.g.
/// "systemd 257 (257.5-1-arch)" → 257.
fn parse_systemd_version(output: &str) -> Option<u32> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .find_map(|token| token.parse::<u32>().ok())
}

/// bootctl arguments for the primary attempt and the one retry.
fn bootctl_args(systemd_version: u32, fallback: bool) -> Vec<&'static str> {
    if systemd_version >= 258 {
        if fallback {
            vec!["--variables=no", "install"]
        } else {
            vec!["--variables=yes", "install"]
        }
    } else if fallback {
        vec!["--no-variables", "install"]
    } else {
        vec!["install"]
    }
}

/// Install systemd-boot into the target. On failure, retries exactly once
/// with the EFI-variable fallback flags; the second failure propagates.
pub fn install_bootloader(target: &Path, systemd_version: u32) -> Result<()> {
    if let Err(e) = run_bootctl(target, &bootctl_args(systemd_version, false)) {
        log::warn!("bootctl install failed ({}), retrying without EFI variables", e);
        run_bootctl(target, &bootctl_args(systemd_version, true))
            .context("bootctl install failed on both attempts")?;
    }
    Ok(())
}

fn run_bootctl(target: &Path, args: &[&str]) -> crate::error::Result<()> {
    let target_str = target.display().to_string();
    let mut full: Vec<&str> = vec![&target_str, "bootctl"];
    full.extend_from_slice(args);
    cmd::run("arch-chroot", &full)
}

/// Read the PARTUUID of a partition device via blkid.
pub fn partition_uuid(device: &Path) -> Result<String> {
    if cmd::is_dry_run() {
        return Ok("00000000-0000-0000-0000-000000000000".to_string());
    }
    cmd::run_capture(
        "blkid",
        &["-s", "PARTUUID", "-o", "value", &device.display().to_string()],
    )
    .with_context(|| format!("Failed to read PARTUUID of {}", device.display()))
}

/// One Boot Loader Specification entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlsEntry {
    /// Kernel package name, e.g. "linux" or "linux-lts"
    pub kernel: String,
    /// PARTUUID of the root partition
    pub root_partuuid: String,
}

impl BlsEntry {
    /// Entry file name under `loader/entries/`.
    pub fn file_name(&self) -> String {
        format!("arch_{}.conf", self.kernel)
    }

    /// Render the entry file content.
    pub fn render(&self) -> String {
        format!(
            "title   Arch Linux ({kernel})\n\
             linux   /vmlinuz-{kernel}\n\
             initrd  /initramfs-{kernel}.img\n\
             options root=PARTUUID={partuuid} rw\n",
            kernel = self.kernel,
            partuuid = self.root_partuuid,
        )
    }
}

/// Write one BLS entry per kernel onto the ESP and return the file name of
/// the default entry (the first configured kernel).
pub fn write_bls_entries(esp: &Path, kernels: &[String], root_partuuid: &str) -> Result<String> {
    anyhow::ensure!(!kernels.is_empty(), "no kernels configured");

    let entries_dir = esp.join("loader/entries");
    if !cmd::is_dry_run() {
        fs::create_dir_all(&entries_dir)
            .with_context(|| format!("Failed to create {}", entries_dir.display()))?;
    }

    let mut default_entry = None;
    for kernel in kernels {
        let entry = BlsEntry {
            kernel: kernel.clone(),
            root_partuuid: root_partuuid.to_string(),
        };
        let path = entries_dir.join(entry.file_name());

        if cmd::is_dry_run() {
            log::info!("[dry-run] would write BLS entry {}", path.display());
        } else {
            fs::write(&path, entry.render())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote BLS entry {}", path.display());
        }

        default_entry.get_or_insert(entry.file_name());
    }

    // ensure! above guarantees at least one kernel
    Ok(default_entry.expect("kernels is non-empty"))
}

/// Compute the new `loader.conf` content.
///
/// Without an existing file: `default <entry>` plus `timeout <secs>`.
/// With one: the `default` line is replaced (or appended when absent) and a
/// commented `#timeout` is uncommented to support dual-boot menus; an
/// already-active timeout is left untouched.
pub fn patch_loader_conf(
    existing: Option<&str>,
    default_entry: &str,
    timeout_secs: u32,
) -> String {
    let default_line = format!("default {}", default_entry);

    let Some(existing) = existing else {
        return format!("{}\ntimeout {}\n", default_line, timeout_secs);
    };

    let mut lines: Vec<String> = existing.lines().map(str::to_string).collect();
    let mut have_default = false;

    for line in &mut lines {
        if line.starts_with("default") {
            *line = default_line.clone();
            have_default = true;
        } else if line.starts_with("#timeout") {
            *line = line.trim_start_matches('#').to_string();
        }
    }

    if !have_default {
        lines.push(default_line);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

/// Apply [`patch_loader_conf`] to `loader/loader.conf` on the ESP.
pub fn configure_loader(esp: &Path, default_entry: &str, timeout_secs: u32) -> Result<()> {
    let loader_conf = esp.join("loader/loader.conf");

    let existing = match fs::read_to_string(&loader_conf) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read {}", loader_conf.display()))
        }
    };

    let content = patch_loader_conf(existing.as_deref(), default_entry, timeout_secs);

    if cmd::is_dry_run() {
        log::info!(
            "[dry-run] would write {}:\n{}",
            loader_conf.display(),
            content.trim_end()
        );
        return Ok(());
    }

    if let Some(parent) = loader_conf.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&loader_conf, content)
        .with_context(|| format!("Failed to write {}", loader_conf.display()))?;

    log::info!("Updated {}", loader_conf.display());
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_systemd_version() {
        assert_eq!(
            parse_systemd_version("systemd 257 (257.5-1-arch)"),
            Some(257)
        );
        assert_eq!(parse_systemd_version("systemd 258"), Some(258));
        assert_eq!(parse_systemd_version("garbage output"), None);
        assert_eq!(parse_systemd_version(""), None);
    }

    #[test]
    fn test_bootctl_args_modern_systemd() {
        assert_eq!(bootctl_args(258, false), vec!["--variables=yes", "install"]);
        assert_eq!(bootctl_args(258, true), vec!["--variables=no", "install"]);
        assert_eq!(bootctl_args(259, false), vec!["--variables=yes", "install"]);
    }

    #[test]
    fn test_bootctl_args_older_systemd() {
        assert_eq!(bootctl_args(257, false), vec!["install"]);
        assert_eq!(bootctl_args(257, true), vec!["--no-variables", "install"]);
    }

    #[test]
    fn test_esp_from_mounts_finds_boot() {
        let mounts = "\
/dev/nvme0n1p2 /mnt/arch ext4 rw,relatime 0 0
/dev/nvme0n1p1 /mnt/arch/boot vfat rw,relatime 0 0
proc /proc proc rw 0 0
";
        let found = esp_from_mounts(mounts, Path::new("/mnt/arch"));
        assert_eq!(found, Some(PathBuf::from("/mnt/arch/boot")));
    }

    #[test]
    fn test_esp_from_mounts_missing() {
        let mounts = "/dev/nvme0n1p2 /mnt/arch ext4 rw,relatime 0 0\n";
        assert_eq!(esp_from_mounts(mounts, Path::new("/mnt/arch")), None);
    }

    #[test]
    fn test_bls_entry_render() {
        let entry = BlsEntry {
            kernel: "linux".to_string(),
            root_partuuid: "a3b2c1d0-1111-2222-3333-444455556666".to_string(),
        };
        assert_eq!(entry.file_name(), "arch_linux.conf");

        let rendered = entry.render();
        assert!(rendered.contains("title   Arch Linux (linux)"));
        assert!(rendered.contains("linux   /vmlinuz-linux"));
        assert!(rendered.contains("initrd  /initramfs-linux.img"));
        assert!(rendered
            .contains("options root=PARTUUID=a3b2c1d0-1111-2222-3333-444455556666 rw"));
    }

    #[test]
    fn test_write_bls_entries() {
        let esp = tempfile::tempdir().expect("tempdir");
        let kernels = vec!["linux".to_string(), "linux-lts".to_string()];

        let default =
            write_bls_entries(esp.path(), &kernels, "uuid-1234").expect("write entries");

        // First kernel becomes the default entry
        assert_eq!(default, "arch_linux.conf");
        assert!(esp.path().join("loader/entries/arch_linux.conf").exists());
        assert!(esp.path().join("loader/entries/arch_linux-lts.conf").exists());

        let lts = fs::read_to_string(esp.path().join("loader/entries/arch_linux-lts.conf"))
            .expect("read entry");
        assert!(lts.contains("/vmlinuz-linux-lts"));
        assert!(lts.contains("PARTUUID=uuid-1234"));
    }

    #[test]
    fn test_write_bls_entries_no_kernels_is_error() {
        let esp = tempfile::tempdir().expect("tempdir");
        assert!(write_bls_entries(esp.path(), &[], "uuid").is_err());
    }

    #[test]
    fn test_patch_loader_conf_creates_fresh_file() {
        let content = patch_loader_conf(None, "arch_linux.conf", 15);
        assert_eq!(content, "default arch_linux.conf\ntimeout 15\n");
    }

    #[test]
    fn test_patch_loader_conf_replaces_default() {
        let existing = "default old_entry.conf\ntimeout 3\n";
        let content = patch_loader_conf(Some(existing), "arch_linux.conf", 15);
        assert_eq!(content, "default arch_linux.conf\ntimeout 3\n");
    }

    #[test]
    fn test_patch_loader_conf_uncomments_timeout() {
        let existing = "default old.conf\n#timeout 10\nconsole-mode keep\n";
        let content = patch_loader_conf(Some(existing), "arch_linux.conf", 15);
        assert_eq!(
            content,
            "default arch_linux.conf\ntimeout 10\nconsole-mode keep\n"
        );
    }

    #[test]
    fn test_patch_loader_conf_appends_missing_default() {
        let existing = "timeout 5\n";
        let content = patch_loader_conf(Some(existing), "arch_linux.conf", 15);
        assert_eq!(content, "timeout 5\ndefault arch_linux.conf\n");
    }

    #[test]
    fn test_configure_loader_roundtrip() {
        let esp = tempfile::tempdir().expect("tempdir");

        configure_loader(esp.path(), "arch_linux.conf", 15).expect("first write");
        let first = fs::read_to_string(esp.path().join("loader/loader.conf")).expect("read");
        assert_eq!(first, "default arch_linux.conf\ntimeout 15\n");

        // Second run replaces the default, keeps the active timeout
        configure_loader(esp.path(), "arch_linux-lts.conf", 30).expect("second write");
        let second = fs::read_to_string(esp.path().join("loader/loader.conf")).expect("read");
        assert_eq!(second, "default arch_linux-lts.conf\ntimeout 15\n");
    }
}
