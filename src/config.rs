//! Installation configuration.
//!
//! Everything machine-specific lives here instead of in code: hostname,
//! locale, mirrors, user accounts and their password hashes. Earlier
//! iterations of this installer hardcoded accounts and crypt hashes in the
//! script; those are installation-specific secrets and belong in an external
//! config file, so the binary ships none.
//!
//! Passwords are pre-hashed crypt strings (`mkpasswd -m sha-512`) applied
//! with `chpasswd -e` — plaintext never touches the config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::profile::ProfileKind;

/// Locale configuration written to the target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Console keymap (vconsole.conf), e.g. "de"
    pub keymap: String,
    /// System language (locale.conf LANG), e.g. "en_US.UTF-8"
    pub lang: String,
    /// Character encoding used in locale.gen, e.g. "UTF-8"
    pub encoding: String,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            keymap: "de".to_string(),
            lang: "en_US.UTF-8".to_string(),
            encoding: "UTF-8".to_string(),
        }
    }
}

/// An additional pacman repository appended to the target's pacman.conf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRepository {
    /// Repository name, e.g. "repo"
    pub name: String,
    /// Server URL; `$arch` is expanded by pacman
    pub url: String,
    /// SigLevel line for the repository section
    #[serde(default = "default_sig_level")]
    pub sig_level: String,
}

fn default_sig_level() -> String {
    "Optional TrustAll".to_string()
}

/// One user account to create on the installed system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub name: String,
    /// Pre-hashed password in crypt(3) format ($6$...)
    pub password_hash: String,
    /// Add to the wheel group with sudo access
    #[serde(default)]
    pub sudo: bool,
}

/// Complete installation configuration, loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub hostname: String,
    pub locale: LocaleConfig,
    /// Kernels to install; the first one becomes the default boot entry
    pub kernels: Vec<String>,
    /// Where the target filesystems are mounted during installation
    pub mountpoint: PathBuf,
    /// Target disk override; when unset the selector picks one
    pub disk: Option<PathBuf>,
    /// Enable the multilib repository on the target
    pub multilib: bool,
    pub custom_repositories: Vec<CustomRepository>,
    /// Desktop profile to install
    pub profile: ProfileKind,
    /// Packages installed on top of the profile's list
    pub extra_packages: Vec<String>,
    /// systemd-boot menu timeout in seconds
    pub loader_timeout: u32,
    pub users: Vec<UserAccount>,
    /// crypt(3) hash for root; root login stays locked when unset
    pub root_password_hash: Option<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            hostname: "archbox".to_string(),
            locale: LocaleConfig::default(),
            kernels: vec!["linux".to_string()],
            mountpoint: PathBuf::from("/mnt/arch"),
            disk: None,
            multilib: true,
            custom_repositories: Vec::new(),
            profile: ProfileKind::Gnome,
            extra_packages: Vec::new(),
            loader_timeout: 15,
            users: Vec::new(),
            root_password_hash: None,
        }
    }
}

impl InstallConfig {
    /// A starting-point configuration for `archup init`, with one example
    /// user whose hash must be filled in before it validates.
    pub fn template() -> Self {
        Self {
            custom_repositories: vec![CustomRepository {
                name: "repo".to_string(),
                url: "https://repo.example.com/$arch".to_string(),
                sig_level: default_sig_level(),
            }],
            // Served from the custom repository above, so they ride along as
            // config extras instead of living in the profile's package list
            extra_packages: [
                "zed",
                "rustrover",
                "rustrover-jre",
                "intellij-idea-ultimate-edition",
                "pycharm-professional",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            users: vec![UserAccount {
                name: "arch".to_string(),
                password_hash: String::new(),
                sudo: true,
            }],
            ..Self::default()
        }
    }

    /// Save configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        // Hostname: 1-63 chars, starts with a letter, alphanumeric + hyphen
        let hostname = self.hostname.trim();
        if hostname.is_empty() {
            anyhow::bail!("Hostname must be specified");
        }
        if hostname.len() > 63 {
            anyhow::bail!("Hostname must be at most 63 characters long");
        }
        if !hostname
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        {
            anyhow::bail!("Hostname must start with a letter");
        }
        if !hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            anyhow::bail!("Hostname can only contain letters, numbers, and hyphens");
        }

        if self.kernels.is_empty() {
            anyhow::bail!("At least one kernel must be configured");
        }

        if !self.mountpoint.is_absolute() {
            anyhow::bail!("Mountpoint must be an absolute path");
        }

        if let Some(disk) = &self.disk {
            if !disk.starts_with("/dev") {
                anyhow::bail!("Disk override {:?} must be a /dev path", disk);
            }
        }

        for user in &self.users {
            validate_username(&user.name)?;
            validate_password_hash(&user.name, &user.password_hash)?;
        }

        if let Some(hash) = &self.root_password_hash {
            validate_password_hash("root", hash)?;
        }

        Ok(())
    }
}

fn validate_username(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("Username must be specified");
    }
    if name.len() > 32 {
        anyhow::bail!("Username '{}' must be at most 32 characters long", name);
    }
    if !name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
    {
        anyhow::bail!("Username '{}' must start with a lowercase letter", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        anyhow::bail!(
            "Username '{}' can only contain lowercase letters, digits, underscores, and hyphens",
            name
        );
    }
    Ok(())
}

fn validate_password_hash(account: &str, hash: &str) -> Result<()> {
    // crypt(3) hashes start with $<id>$ — reject anything that looks like a
    // plaintext password so it never ends up in chpasswd -e
    if hash.is_empty() {
        anyhow::bail!(
            "Password hash for '{}' is empty — generate one with: mkpasswd -m sha-512",
            account
        );
    }
    if !hash.starts_with('$') {
        anyhow::bail!(
            "Password hash for '{}' is not in crypt format — generate one with: mkpasswd -m sha-512",
            account
        );
    }
    // The hash is interpolated into a single-quoted shell command inside the
    // chroot, so the charset must stay within the crypt alphabet. '=' and ','
    // appear in parametrized hashes (e.g. $6$rounds=5000$...).
    if !hash
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '$' | '=' | ','))
    {
        anyhow::bail!(
            "Password hash for '{}' contains characters outside the crypt alphabet",
            account
        );
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_user() -> UserAccount {
        UserAccount {
            name: "lukas".to_string(),
            password_hash: "$6$73CpxYtM7XJpkM1/$abcdefg".to_string(),
            sudo: true,
        }
    }

    #[test]
    fn test_default_config_validates() {
        InstallConfig::default().validate().expect("default is valid");
    }

    #[test]
    fn test_template_requires_password_hash() {
        let err = InstallConfig::template()
            .validate()
            .expect_err("template has an empty hash");
        assert!(err.to_string().contains("mkpasswd"));
    }

    #[test]
    fn test_template_extras_pair_with_custom_repository() {
        // The IDE packages need the custom repository they are served from
        let template = InstallConfig::template();
        assert!(!template.custom_repositories.is_empty());
        for pkg in ["zed", "rustrover", "intellij-idea-ultimate-edition"] {
            assert!(
                template.extra_packages.iter().any(|p| p == pkg),
                "template missing custom-repo package {}",
                pkg
            );
        }
    }

    #[test]
    fn test_config_with_user_validates() {
        let mut config = InstallConfig::default();
        config.users.push(valid_user());
        config.validate().expect("valid user config");
    }

    #[test]
    fn test_hostname_with_hyphen_is_valid() {
        let mut config = InstallConfig::default();
        config.hostname = "arch-lukas".to_string();
        config.validate().expect("hyphenated hostname is valid");
    }

    #[test]
    fn test_invalid_hostnames_rejected() {
        for hostname in ["", "1abc", "has space", "under_score", &"x".repeat(64)] {
            let mut config = InstallConfig::default();
            config.hostname = hostname.to_string();
            assert!(
                config.validate().is_err(),
                "hostname {:?} should be rejected",
                hostname
            );
        }
    }

    #[test]
    fn test_invalid_usernames_rejected() {
        for name in ["", "Root", "9lives", "bad name", &"x".repeat(33)] {
            let mut config = InstallConfig::default();
            let mut user = valid_user();
            user.name = name.to_string();
            config.users.push(user);
            assert!(
                config.validate().is_err(),
                "username {:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_hash_with_shell_metacharacters_rejected() {
        // A quote in the hash would break out of the single-quoted chpasswd
        // command inside the chroot
        for hash in [
            "$6$x' ; rm -rf / #",
            "$6$salt$ha\"sh",
            "$6$salt$ha`sh",
            "$6$salt$ha sh",
            "$6$salt$hash\n",
        ] {
            let mut config = InstallConfig::default();
            let mut user = valid_user();
            user.password_hash = hash.to_string();
            config.users.push(user);

            let err = config.validate().expect_err("metacharacters must be rejected");
            assert!(
                err.to_string().contains("crypt alphabet"),
                "hash {:?} should be rejected for its charset",
                hash
            );
        }
    }

    #[test]
    fn test_hash_with_rounds_parameter_is_valid() {
        let mut config = InstallConfig::default();
        let mut user = valid_user();
        user.password_hash = "$6$rounds=5000$somesalt$abc./XYZ123".to_string();
        config.users.push(user);
        config.validate().expect("parametrized crypt hash is valid");
    }

    #[test]
    fn test_plaintext_password_rejected() {
        let mut config = InstallConfig::default();
        let mut user = valid_user();
        user.password_hash = "hunter2".to_string();
        config.users.push(user);

        let err = config.validate().expect_err("plaintext must be rejected");
        assert!(err.to_string().contains("crypt format"));
    }

    #[test]
    fn test_disk_override_must_be_dev_path() {
        let mut config = InstallConfig::default();
        config.disk = Some(PathBuf::from("sda"));
        assert!(config.validate().is_err());

        config.disk = Some(PathBuf::from("/dev/sda"));
        config.validate().expect("absolute /dev path is valid");
    }

    #[test]
    fn test_empty_kernel_list_rejected() {
        let mut config = InstallConfig::default();
        config.kernels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("install.json");

        let mut config = InstallConfig::template();
        config.users[0].password_hash = "$6$salt$hash".to_string();
        config.hostname = "arch-lukas".to_string();
        config.save_to_file(&path).expect("save");

        let loaded = InstallConfig::load_from_file(&path).expect("load");
        assert_eq!(loaded.hostname, "arch-lukas");
        assert_eq!(loaded.users.len(), 1);
        assert_eq!(loaded.users[0].name, "arch");
        assert!(loaded.users[0].sudo);
        assert_eq!(loaded.custom_repositories[0].sig_level, "Optional TrustAll");
        loaded.validate().expect("roundtripped config is valid");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Only hostname specified; everything else falls back to defaults
        let loaded: InstallConfig =
            serde_json::from_str(r#"{"hostname": "mini"}"#).expect("parse partial config");
        assert_eq!(loaded.hostname, "mini");
        assert_eq!(loaded.kernels, vec!["linux".to_string()]);
        assert_eq!(loaded.mountpoint, PathBuf::from("/mnt/arch"));
        assert_eq!(loaded.loader_timeout, 15);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(InstallConfig::load_from_file("/nonexistent/config.json").is_err());
    }
}
