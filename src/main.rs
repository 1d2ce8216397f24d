//! archup - Main entry point
//!
//! Sequential installer flow: enumerate disks, select a target, confirm,
//! partition, install the base system and profile, configure systemd-boot,
//! then reboot or drop to a shell.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use archup::cli::{Cli, Commands};
use archup::config::InstallConfig;
use archup::device::{enumerate_disks, humanize_size, BlockDevice};
use archup::install::Installer;
use archup::layout::plan_layout;
use archup::select::select_target;
use archup::{cmd, hardware, prompt};

/// Initialize the logger with appropriate settings
fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;

    Builder::new()
        .format(|buf, record| {
            writeln!(buf, "[{}] {}", record.level(), record.args())
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env() // RUST_LOG overrides
        .init();
}

fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse_args();
    if cli.dry_run {
        cmd::enable_dry_run();
    }

    match cli.command {
        Some(Commands::Validate { config }) => run_validate(&config),
        Some(Commands::Disks { json }) => run_disks(json),
        Some(Commands::Init { path }) => run_init(&path),
        Some(Commands::Install {
            config,
            disk,
            yes,
            no_reboot,
        }) => run_install(config, disk, yes, no_reboot),
        // No command: interactive installation with defaults
        None => run_install(None, None, false, false),
    }
}

fn run_validate(path: &PathBuf) -> Result<()> {
    let config = InstallConfig::load_from_file(path)?;
    match config.validate() {
        Ok(()) => {
            println!("Configuration file is valid: {}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run_init(path: &PathBuf) -> Result<()> {
    InstallConfig::template().save_to_file(path)?;
    println!("Wrote configuration template to {}", path.display());
    println!("Fill in the password hashes (mkpasswd -m sha-512) before installing.");
    Ok(())
}

fn run_disks(json: bool) -> Result<()> {
    let devices = enumerate_disks();
    if devices.is_empty() {
        eprintln!("No block devices detected.");
        std::process::exit(1);
    }

    let selection = select_target(&devices);

    if json {
        let report = serde_json::json!({
            "devices": devices.iter().map(|d| serde_json::json!({
                "path": d.path,
                "size": d.size,
                "rotational": d.rotational,
                "transport": d.transport.as_ref().map(|t| t.to_string()),
                "model": d.model,
            })).collect::<Vec<_>>(),
            "selected": selection.as_ref().map(|s| serde_json::json!({
                "path": s.device.path,
                "reason": s.reason.to_string(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_device_table(&devices);
        if let Some(selection) = &selection {
            println!(
                "Would select: {} ({}) [{}]",
                selection.device.path.display(),
                humanize_size(selection.device.size),
                selection.reason
            );
        }
    }
    Ok(())
}

fn run_install(
    config_path: Option<PathBuf>,
    disk_override: Option<PathBuf>,
    yes: bool,
    no_reboot: bool,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => InstallConfig::load_from_file(path)?,
        None => {
            log::info!("No configuration file given, using defaults");
            InstallConfig::default()
        }
    };
    config.validate().context("invalid configuration")?;

    if !cmd::is_dry_run() {
        // Never returns when escalation is needed: re-execs through sudo
        prompt::ensure_root()?;
    }

    println!("archup - Arch Linux Installer");
    println!("-----------------------------");

    // Detect available disks and select the target
    let devices = enumerate_disks();
    if devices.is_empty() {
        bail!("No block devices detected. Aborting.");
    }

    println!("Detected disks:");
    print_device_table(&devices);

    let override_path = disk_override.or_else(|| config.disk.clone());
    let (target, reason) = match override_path {
        Some(path) => {
            let device = devices
                .iter()
                .find(|d| d.path == path)
                .cloned()
                .with_context(|| format!("No device found for given path {}", path.display()))?;
            (device, "configured override".to_string())
        }
        None => {
            // Enumeration is non-empty here, so selection cannot fail
            let selection =
                select_target(&devices).context("no selectable disk found")?;
            (selection.device, selection.reason.to_string())
        }
    };

    println!(
        "Selected disk: {} ({}) [{}]",
        target.path.display(),
        humanize_size(target.size),
        reason
    );

    let firmware = hardware::detect_firmware_mode_strict()?;
    if !firmware.is_uefi() {
        bail!("UEFI firmware required, but the system booted in {} mode", firmware);
    }

    let layout = plan_layout(&target, &config.mountpoint)?;
    println!("{}", layout.summary());
    println!(
        "WARNING: this will erase all data on {}.",
        target.path.display()
    );

    if !yes && !prompt::ask_yes_no("Run installation now?", true) {
        return prompt::drop_to_shell();
    }

    layout.apply()?;
    Installer::new(&config).run(&layout)?;

    println!("Installation finished.");

    if no_reboot || cmd::is_dry_run() {
        return Ok(());
    }
    if prompt::ask_yes_no("Installation complete. Reboot now?", false) {
        prompt::reboot()
    } else {
        prompt::drop_to_shell()
    }
}

fn print_device_table(devices: &[BlockDevice]) {
    for device in devices {
        println!(" - {}", device.describe());
    }
}
