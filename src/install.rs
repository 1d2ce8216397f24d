//! Installation orchestration.
//!
//! Drives everything after the target disk is partitioned and mounted:
//! pacstrap, fstab, system configuration, pacman repositories, profile
//! packages, services, user accounts and the bootloader. Strictly
//! sequential; every step either succeeds or the whole installation fails
//! (the bootloader step carries the single retry described in
//! [`crate::bootloader`]).

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::bootloader;
use crate::cmd;
use crate::config::{CustomRepository, InstallConfig, UserAccount};
use crate::layout::DiskLayout;
use crate::profile::Profile;

/// Packages every installation gets, independent of profile. Kernels come
/// from the config.
pub const BASE_PACKAGES: &[&str] = &[
    "base",
    "linux-firmware",
    "sudo",
    "efibootmgr",
    "networkmanager",
];

/// One installation run against a mounted target.
pub struct Installer<'a> {
    config: &'a InstallConfig,
    target: PathBuf,
}

impl<'a> Installer<'a> {
    pub fn new(config: &'a InstallConfig) -> Self {
        Self {
            target: config.mountpoint.clone(),
            config,
        }
    }

    /// Run the full post-partitioning installation.
    pub fn run(&self, layout: &DiskLayout) -> Result<()> {
        let primary_user = self.config.users.first().map(|u| u.name.as_str());
        let profile = Profile::resolve(self.config.profile, primary_user);

        log::info!("Installing base system");
        self.pacstrap_base()?;
        self.generate_fstab()?;

        log::info!("Configuring system");
        self.configure_system()?;
        self.configure_pacman()?;

        log::info!("Configuring bootloader");
        self.setup_bootloader(layout)?;

        log::info!("Creating user accounts");
        self.create_users()?;

        log::info!("Installing {} profile packages", profile.name);
        self.install_profile_packages(&profile)?;
        self.enable_services(&profile)?;

        log::info!("Running post-install commands");
        self.run_post_install(&profile)?;

        log::info!("Installation complete");
        Ok(())
    }

    fn pacstrap_base(&self) -> Result<()> {
        let target = self.target.display().to_string();
        let mut args: Vec<&str> = vec!["-K", &target];
        args.extend(BASE_PACKAGES);
        for kernel in &self.config.kernels {
            args.push(kernel);
        }
        cmd::run("pacstrap", &args).context("pacstrap failed")
    }

    fn generate_fstab(&self) -> Result<()> {
        if cmd::is_dry_run() {
            log::info!("[dry-run] would append genfstab -U output to /etc/fstab");
            return Ok(());
        }

        let fstab = cmd::run_capture("genfstab", &["-U", &self.target.display().to_string()])
            .context("genfstab failed")?;

        let path = self.target.join("etc/fstab");
        let mut content = fs::read_to_string(&path).unwrap_or_default();
        content.push_str(&fstab);
        content.push('\n');
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn configure_system(&self) -> Result<()> {
        let locale = &self.config.locale;

        self.write_target_file(
            "etc/hostname",
            &format!("{}\n", self.config.hostname),
        )?;
        self.write_target_file("etc/locale.conf", &format!("LANG={}\n", locale.lang))?;
        self.write_target_file("etc/vconsole.conf", &format!("KEYMAP={}\n", locale.keymap))?;

        // Uncommenting in locale.gen is fragile across releases; appending
        // the wanted line is what locale-gen actually needs.
        if !cmd::is_dry_run() {
            let locale_gen = self.target.join("etc/locale.gen");
            let mut content = fs::read_to_string(&locale_gen).unwrap_or_default();
            let line = format!("{} {}", locale.lang, locale.encoding);
            if !content.lines().any(|l| l.trim() == line) {
                content.push_str(&line);
                content.push('\n');
                fs::write(&locale_gen, content)
                    .with_context(|| format!("Failed to write {}", locale_gen.display()))?;
            }
        }
        cmd::run_chroot(&self.target, "locale-gen", None)?;

        Ok(())
    }

    fn configure_pacman(&self) -> Result<()> {
        if cmd::is_dry_run() {
            log::info!("[dry-run] would configure pacman.conf (multilib + custom repositories)");
            return Ok(());
        }

        let path = self.target.join("etc/pacman.conf");
        let mut content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if self.config.multilib {
            content = enable_multilib(&content);
        }
        for repo in &self.config.custom_repositories {
            if !content.contains(&format!("[{}]", repo.name)) {
                content.push_str(&repo_section(repo));
            }
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Refresh databases so profile installation sees the new repos
        cmd::run_chroot(&self.target, "pacman -Sy", None)?;
        Ok(())
    }

    fn setup_bootloader(&self, layout: &DiskLayout) -> Result<()> {
        let esp = bootloader::verify_esp_mounted(&self.target)?;
        let version = bootloader::systemd_version(&self.target);
        bootloader::install_bootloader(&self.target, version)?;

        let partuuid = bootloader::partition_uuid(&layout.root)?;
        let default_entry = bootloader::write_bls_entries(&esp, &self.config.kernels, &partuuid)?;
        bootloader::configure_loader(&esp, &default_entry, self.config.loader_timeout)?;
        Ok(())
    }

    fn create_users(&self) -> Result<()> {
        if self.config.users.is_empty() {
            log::warn!("No users configured; only root will exist on the target");
        }

        if self.config.users.iter().any(|u| u.sudo) {
            // Uncomment the wheel rule instead of dropping files into
            // sudoers.d, matching a stock Arch setup.
            cmd::run_chroot(
                &self.target,
                "sed -i 's/^# %wheel ALL=(ALL:ALL) ALL/%wheel ALL=(ALL:ALL) ALL/' /etc/sudoers",
                None,
            )?;
        }

        for user in &self.config.users {
            cmd::run_chroot(&self.target, &useradd_command(user), None)?;
            cmd::run_chroot(&self.target, &chpasswd_command(&user.name, &user.password_hash), None)?;
        }

        if let Some(hash) = &self.config.root_password_hash {
            cmd::run_chroot(&self.target, &chpasswd_command("root", hash), None)?;
        }

        Ok(())
    }

    fn install_profile_packages(&self, profile: &Profile) -> Result<()> {
        let packages = profile.merged_packages(&self.config.extra_packages);
        if packages.is_empty() {
            log::info!("No profile packages to install");
            return Ok(());
        }

        let command = format!(
            "pacman -S --noconfirm --needed {}",
            packages.join(" ")
        );
        cmd::run_chroot(&self.target, &command, None)
            .context("profile package installation failed")
    }

    fn enable_services(&self, profile: &Profile) -> Result<()> {
        for service in &profile.services {
            cmd::run_chroot(&self.target, &format!("systemctl enable {}", service), None)?;
        }
        Ok(())
    }

    fn run_post_install(&self, profile: &Profile) -> Result<()> {
        for step in &profile.post_install {
            cmd::run_chroot(&self.target, &step.command, step.run_as.as_deref())?;
        }
        Ok(())
    }

    fn write_target_file(&self, relative: &str, content: &str) -> Result<()> {
        if cmd::is_dry_run() {
            log::info!("[dry-run] would write /{}: {}", relative, content.trim_end());
            return Ok(());
        }
        let path = self.target.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Render a pacman.conf section for a custom repository.
fn repo_section(repo: &CustomRepository) -> String {
    format!(
        "\n[{}]\nSigLevel = {}\nServer = {}\n",
        repo.name, repo.sig_level, repo.url
    )
}

/// Uncomment the `[multilib]` section (header plus its Include line).
fn enable_multilib(pacman_conf: &str) -> String {
    let mut lines: Vec<String> = pacman_conf.lines().map(str::to_string).collect();
    let mut in_multilib = false;

    for line in &mut lines {
        if line.trim() == "#[multilib]" {
            *line = "[multilib]".to_string();
            in_multilib = true;
        } else if in_multilib && line.starts_with("#Include") {
            *line = line.trim_start_matches('#').to_string();
            in_multilib = false;
        } else if line.starts_with('[') || line.starts_with("#[") {
            in_multilib = false;
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    content
}

fn useradd_command(user: &UserAccount) -> String {
    if user.sudo {
        format!("useradd -m -G wheel -s /bin/bash {}", user.name)
    } else {
        format!("useradd -m -s /bin/bash {}", user.name)
    }
}

/// Apply a pre-hashed password with `chpasswd -e`. The hash charset is
/// restricted to crypt's alphabet by config validation, so single quoting
/// is safe.
fn chpasswd_command(name: &str, hash: &str) -> String {
    format!("echo '{}:{}' | chpasswd -e", name, hash)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_packages_are_bootable() {
        assert!(BASE_PACKAGES.contains(&"base"));
        assert!(BASE_PACKAGES.contains(&"linux-firmware"));
        assert!(BASE_PACKAGES.contains(&"efibootmgr"));
        assert!(BASE_PACKAGES.contains(&"sudo"));
    }

    #[test]
    fn test_repo_section_rendering() {
        let repo = CustomRepository {
            name: "repo".to_string(),
            url: "https://repo.example.com/$arch".to_string(),
            sig_level: "Optional TrustAll".to_string(),
        };
        let section = repo_section(&repo);
        assert_eq!(
            section,
            "\n[repo]\nSigLevel = Optional TrustAll\nServer = https://repo.example.com/$arch\n"
        );
    }

    #[test]
    fn test_enable_multilib_uncomments_section() {
        let conf = "\
[core]
Include = /etc/pacman.d/mirrorlist

#[multilib]
#Include = /etc/pacman.d/mirrorlist
";
        let patched = enable_multilib(conf);
        assert!(patched.contains("\n[multilib]\nInclude = /etc/pacman.d/mirrorlist"));
        assert!(!patched.contains("#[multilib]"));
    }

    #[test]
    fn test_enable_multilib_leaves_other_comments() {
        let conf = "\
#[testing]
#Include = /etc/pacman.d/mirrorlist

#[multilib]
#Include = /etc/pacman.d/mirrorlist
";
        let patched = enable_multilib(conf);
        // testing stays commented
        assert!(patched.contains("#[testing]\n#Include"));
        assert!(patched.contains("[multilib]\nInclude"));
    }

    #[test]
    fn test_enable_multilib_idempotent_on_enabled_conf() {
        let conf = "[multilib]\nInclude = /etc/pacman.d/mirrorlist\n";
        assert_eq!(enable_multilib(conf), conf);
    }

    #[test]
    fn test_useradd_command_sudo_gets_wheel() {
        let user = UserAccount {
            name: "lukas".to_string(),
            password_hash: "$6$x$y".to_string(),
            sudo: true,
        };
        assert_eq!(
            useradd_command(&user),
            "useradd -m -G wheel -s /bin/bash lukas"
        );
    }

    #[test]
    fn test_useradd_command_plain_user() {
        let user = UserAccount {
            name: "guest".to_string(),
            password_hash: "$6$x$y".to_string(),
            sudo: false,
        };
        assert_eq!(useradd_command(&user), "useradd -m -s /bin/bash guest");
    }

    #[test]
    fn test_chpasswd_command_uses_pre_hashed_mode() {
        let cmd = chpasswd_command("lukas", "$6$salt$hash");
        assert_eq!(cmd, "echo 'lukas:$6$salt$hash' | chpasswd -e");
    }
}
