//! Desktop profile records.
//!
//! A profile is plain data: a package list, services to enable, and an
//! ordered list of post-install commands run inside the chroot. No
//! subclassing, no hooks — the installer just walks the record.
//!
//! Per-user desktop settings (gsettings, gnome-extensions) need a real user
//! session bus, so those commands are wrapped in `dbus-launch` and run as
//! the primary configured user. Without a configured user they are skipped.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Which profile to install, as named in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProfileKind {
    /// GNOME desktop with the full personal package set
    #[default]
    Gnome,
    /// Base system only, no desktop
    Minimal,
}

/// One post-install command, executed inside the chroot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostInstallCmd {
    pub command: String,
    /// Run as this user instead of root
    pub run_as: Option<String>,
}

impl PostInstallCmd {
    fn root(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            run_as: None,
        }
    }

    fn as_user(command: impl Into<String>, user: &str) -> Self {
        Self {
            command: command.into(),
            run_as: Some(user.to_string()),
        }
    }
}

/// A resolved profile: everything the installer needs beyond the base system.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub packages: Vec<String>,
    /// systemd units enabled on the target
    pub services: Vec<String>,
    /// Ordered chroot commands, run after packages and users exist
    pub post_install: Vec<PostInstallCmd>,
}

impl Profile {
    /// Resolve a profile kind. `primary_user` receives the per-user desktop
    /// configuration; `None` skips it.
    pub fn resolve(kind: ProfileKind, primary_user: Option<&str>) -> Self {
        match kind {
            ProfileKind::Gnome => Self::gnome(primary_user),
            ProfileKind::Minimal => Self::minimal(),
        }
    }

    /// Base system only. NetworkManager still gets enabled so the machine
    /// comes up with networking.
    pub fn minimal() -> Self {
        Self {
            name: "minimal".to_string(),
            packages: Vec::new(),
            services: vec!["NetworkManager.service".to_string()],
            post_install: Vec::new(),
        }
    }

    /// GNOME desktop environment with the personal application set.
    pub fn gnome(primary_user: Option<&str>) -> Self {
        let packages = GNOME_PACKAGES.iter().map(|p| p.to_string()).collect();

        let mut post_install = Vec::new();
        match primary_user {
            Some(user) => {
                // Developer environment setup for the primary user
                post_install.push(PostInstallCmd::as_user("rustup default stable", user));

                for cmd in GNOME_USER_SETTINGS {
                    post_install.push(PostInstallCmd::as_user(
                        format!("dbus-launch --exit-with-session {}", cmd),
                        user,
                    ));
                }
            }
            None => {
                log::warn!(
                    "No user configured: skipping per-user GNOME settings (gsettings needs a user session)"
                );
            }
        }

        Self {
            name: "gnome".to_string(),
            packages,
            services: vec![
                "NetworkManager.service".to_string(),
                "gdm.service".to_string(),
            ],
            post_install,
        }
    }

    /// Profile packages merged with config extras, deduplicated and sorted
    /// for deterministic pacman invocations.
    pub fn merged_packages(&self, extra: &[String]) -> Vec<String> {
        let mut packages: Vec<String> = self
            .packages
            .iter()
            .cloned()
            .chain(extra.iter().cloned())
            .collect();
        packages.sort();
        packages.dedup();
        packages
    }
}

/// GNOME package set: the stock desktop group with a few applications
/// removed, plus the personal application stack.
const GNOME_PACKAGES: &[&str] = &[
    "gnome-tweaks",
    "gdm",
    // default gnome applications with some removed
    "baobab",
    "decibels",
    "papers",
    "gnome-backgrounds",
    "gnome-calculator",
    "gnome-calendar",
    "gnome-characters",
    "gnome-clocks",
    "gnome-color-manager",
    "gnome-connections",
    "gnome-console",
    "gnome-contacts",
    "gnome-control-center",
    "gnome-disk-utility",
    "gnome-font-viewer",
    "gnome-keyring",
    "gnome-logs",
    "gnome-maps",
    "gnome-menus",
    "gnome-remote-desktop",
    "gnome-session",
    "gnome-settings-daemon",
    "gnome-shell",
    "gnome-shell-extensions",
    "gnome-text-editor",
    "gnome-user-docs",
    "gnome-user-share",
    "gnome-weather",
    "grilo-plugins",
    "gvfs",
    "gvfs-afc",
    "gvfs-dnssd",
    "gvfs-goa",
    "gvfs-mtp",
    "gvfs-nfs",
    "gvfs-smb",
    "gvfs-wsdd",
    "loupe",
    "nautilus",
    "orca",
    "rygel",
    "simple-scan",
    "snapshot",
    "sushi",
    "tecla",
    "totem",
    "xdg-desktop-portal-gnome",
    "xdg-user-dirs-gtk",
    // shell extensions
    "gnome-browser-connector",
    "gnome-shell-extension-vitals",
    "gnome-shell-extension-tiling-assistant",
    // personal application stack
    "nano",
    "wget",
    "git",
    "firefox",
    "vlc",
    "gnome-boxes",
    "openscad",
    "prusa-slicer",
    "gimp",
    "resources",
    "steam",
    "discord",
    "blender",
    "obs-studio",
    "kicad",
    "less",
    "rustup",
    "htop",
    "mangohud",
    "lib32-mangohud",
    "pipewire",
    "pipewire-audio",
    "wireplumber",
    "archiso",
    "just",
    // graphics stack
    "networkmanager",
    "lib32-mesa",
    "mesa",
    "vulkan-radeon",
    "lib32-vulkan-radeon",
];

/// Per-user GNOME settings, each run via `dbus-launch --exit-with-session`.
const GNOME_USER_SETTINGS: &[&str] = &[
    r#"gsettings set org.gnome.desktop.interface color-scheme "prefer-dark""#,
    // dash favorites
    r#"gsettings set org.gnome.shell favorite-apps "['firefox.desktop', 'org.gnome.Console.desktop', 'org.gnome.Nautilus.desktop', 'steam.desktop', 'net.nokyan.Resources.desktop']""#,
    // Screenshot UI on Ctrl+F12
    r#"gsettings set org.gnome.shell.keybindings show-screenshot-ui "['<Ctrl>F12']""#,
    r#"gsettings set org.gnome.shell disable-user-extensions false"#,
    r#"gsettings set org.gnome.desktop.interface clock-show-seconds true"#,
    // nautilus settings
    r#"gsettings set org.gnome.nautilus.preferences default-folder-viewer "list-view""#,
    r#"gsettings set org.gnome.nautilus.preferences show-create-link true"#,
    r#"gsettings set org.gnome.nautilus.preferences show-delete-permanently true"#,
    r#"gsettings set org.gnome.nautilus.list-view default-zoom-level "small""#,
    r#"gsettings set org.gnome.nautilus.list-view use-tree-view true"#,
    // disable automatic suspend on AC and battery
    r#"gsettings set org.gnome.settings-daemon.plugins.power sleep-inactive-ac-type 'nothing'"#,
    r#"gsettings set org.gnome.settings-daemon.plugins.power sleep-inactive-battery-type 'nothing'"#,
    r#"gnome-extensions enable tiling-assistant@leleat-on-github"#,
    r#"gnome-extensions enable Vitals@CoreCoding.com"#,
    r#"gnome-extensions enable launch-new-instance@gnome-shell-extensions.gcampax.github.com"#,
    // tiling-assistant: no popup, no grouped raise
    r#"gsettings set org.gnome.shell.extensions.tiling-assistant enable-tiling-popup false"#,
    r#"gsettings set org.gnome.shell.extensions.tiling-assistant enable-raise-tile-group false"#,
];

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_kind_parsing() {
        assert_eq!("gnome".parse::<ProfileKind>().unwrap(), ProfileKind::Gnome);
        assert_eq!(
            "minimal".parse::<ProfileKind>().unwrap(),
            ProfileKind::Minimal
        );
        assert_eq!(ProfileKind::Gnome.to_string(), "gnome");
        assert_eq!(ProfileKind::default(), ProfileKind::Gnome);
    }

    #[test]
    fn test_gnome_profile_core_packages() {
        let profile = Profile::gnome(Some("lukas"));
        for pkg in ["gdm", "gnome-shell", "nautilus", "networkmanager", "firefox"] {
            assert!(
                profile.packages.iter().any(|p| p == pkg),
                "gnome profile missing {}",
                pkg
            );
        }
    }

    #[test]
    fn test_gnome_profile_services() {
        let profile = Profile::gnome(Some("lukas"));
        assert!(profile.services.contains(&"NetworkManager.service".to_string()));
        assert!(profile.services.contains(&"gdm.service".to_string()));
    }

    #[test]
    fn test_gnome_post_install_runs_as_primary_user() {
        let profile = Profile::gnome(Some("lukas"));
        assert!(!profile.post_install.is_empty());
        assert!(profile
            .post_install
            .iter()
            .all(|cmd| cmd.run_as.as_deref() == Some("lukas")));

        // gsettings commands get a session bus
        assert!(profile
            .post_install
            .iter()
            .filter(|cmd| cmd.command.contains("gsettings"))
            .all(|cmd| cmd.command.starts_with("dbus-launch --exit-with-session")));
    }

    #[test]
    fn test_gnome_without_user_skips_user_settings() {
        let profile = Profile::gnome(None);
        assert!(profile.post_install.is_empty());
        // Package set is unaffected
        assert!(!profile.packages.is_empty());
    }

    #[test]
    fn test_minimal_profile_enables_networking_only() {
        let profile = Profile::minimal();
        assert!(profile.packages.is_empty());
        assert_eq!(profile.services, vec!["NetworkManager.service".to_string()]);
        assert!(profile.post_install.is_empty());
    }

    #[test]
    fn test_merged_packages_dedup_and_sort() {
        let profile = Profile::gnome(None);
        let extras = vec![
            "zed".to_string(),
            "firefox".to_string(), // already in the profile
            "zed".to_string(),     // duplicate extra
        ];
        let merged = profile.merged_packages(&extras);

        assert_eq!(merged.iter().filter(|p| *p == "firefox").count(), 1);
        assert_eq!(merged.iter().filter(|p| *p == "zed").count(), 1);

        let mut sorted = merged.clone();
        sorted.sort();
        assert_eq!(merged, sorted, "output must be sorted");
    }

    #[test]
    fn test_resolve_dispatches_on_kind() {
        assert_eq!(Profile::resolve(ProfileKind::Gnome, None).name, "gnome");
        assert_eq!(Profile::resolve(ProfileKind::Minimal, None).name, "minimal");
    }
}
