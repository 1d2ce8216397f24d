//! Shell command execution helpers.
//!
//! Every external command the installer runs (sgdisk, mkfs, pacstrap,
//! arch-chroot, bootctl, ...) goes through this module so that logging and
//! dry-run handling live in one place.
//!
//! # Dry-run
//!
//! A global switch downgrades state-changing commands to log lines. Capture
//! helpers (`run_capture`) always execute because they are read-only probes
//! (blkid, bootctl --version) whose output downstream logic depends on.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{InstallError, Result};

static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Enable dry-run mode: destructive commands are logged, not executed.
pub fn enable_dry_run() {
    DRY_RUN.store(true, Ordering::SeqCst);
    log::info!("Dry-run mode enabled: destructive commands will be logged only");
}

/// Returns true if dry-run mode is active.
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::SeqCst)
}

/// Run a state-changing command, inheriting stdout/stderr so the user sees
/// progress (pacstrap and mkfs output matters during an install).
///
/// Honors dry-run. Fails on spawn error or non-zero exit.
pub fn run(program: &str, args: &[&str]) -> Result<()> {
    if is_dry_run() {
        log::info!("[dry-run] {} {}", program, args.join(" "));
        return Ok(());
    }

    log::info!("Running: {} {}", program, args.join(" "));

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| InstallError::command(format!("Failed to spawn {}: {}", program, e)))?;

    if !status.success() {
        return Err(InstallError::command(format!(
            "{} {} exited with {}",
            program,
            args.join(" "),
            status.code().map_or("signal".to_string(), |c| c.to_string())
        )));
    }
    Ok(())
}

/// Run a read-only command and return its trimmed stdout.
///
/// Executes even in dry-run mode; callers use this for probes whose output
/// feeds later decisions.
pub fn run_capture(program: &str, args: &[&str]) -> Result<String> {
    log::debug!("Capturing: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| InstallError::command(format!("Failed to spawn {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(InstallError::command(format!(
            "{} {} exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a shell command inside the installed system via `arch-chroot`.
///
/// When `user` is given the command runs as that account (`runuser -u`),
/// which the GNOME post-install needs for per-user gsettings.
pub fn run_chroot(target: &Path, command: &str, user: Option<&str>) -> Result<()> {
    let target_str = target.display().to_string();
    match user {
        Some(user) => run(
            "arch-chroot",
            &[&target_str, "runuser", "-u", user, "--", "sh", "-c", command],
        ),
        None => run("arch-chroot", &[&target_str, "sh", "-c", command]),
    }
}

/// Capture output from a command inside the installed system.
pub fn run_chroot_capture(target: &Path, command: &str) -> Result<String> {
    let target_str = target.display().to_string();
    run_capture("arch-chroot", &[&target_str, "sh", "-c", command])
}

/// Check whether a binary is available in PATH on the host.
pub fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_capture_trims_output() {
        let out = run_capture("echo", &["  hello  "]).expect("echo should work");
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_run_capture_nonzero_exit_is_command_error() {
        assert!(matches!(
            run_capture("false", &[]),
            Err(InstallError::Command(_))
        ));
    }

    #[test]
    fn test_run_capture_missing_binary_is_command_error() {
        assert!(matches!(
            run_capture("definitely-not-a-real-binary-xyz", &[]),
            Err(InstallError::Command(_))
        ));
    }

    #[test]
    fn test_binary_exists() {
        assert!(binary_exists("sh"));
        assert!(!binary_exists("definitely-not-a-real-binary-xyz"));
    }
}
