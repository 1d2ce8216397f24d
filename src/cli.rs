use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// archup - unattended personal Arch Linux installer
#[derive(Parser)]
#[command(name = "archup")]
#[command(about = "Installs a personal Arch Linux system: disk selection, GPT layout, base system, GNOME, systemd-boot")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: log destructive commands instead of executing them.
    ///
    /// Read-only probes (lsblk, firmware detection) still run so the
    /// preview matches the real machine.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the installation (default when no command is given)
    Install {
        /// Path to a JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target disk override, e.g. /dev/nvme0n1 (skips automatic selection)
        #[arg(short, long)]
        disk: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Never reboot when finished, even if confirmed interactively
        #[arg(long)]
        no_reboot: bool,
    },
    /// List detected disks and show which one would be selected
    Disks {
        /// Emit machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file to validate
        config: PathBuf,
    },
    /// Write a configuration template to the given path
    Init {
        /// Where to write the template (e.g. install.json)
        path: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
