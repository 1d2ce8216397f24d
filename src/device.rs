//! Block device enumeration.
//!
//! Queries the host's `lsblk` for disk-type block devices and parses its JSON
//! output into typed [`BlockDevice`] records. Partitions, loop devices and
//! optical drives are filtered out — only whole disks are install candidates.
//!
//! # Fail-soft contract
//!
//! Enumeration never aborts the process on its own: any spawn, exit-status or
//! parse error is logged as a warning and an empty list is returned. The
//! install flow treats an empty list as a fatal precondition (no installable
//! target) and aborts before any destructive step.
//!
//! # lsblk output variance
//!
//! Different util-linux versions emit `SIZE` as a number or a string and
//! `ROTA` as a bool, a number or `"0"`/`"1"`. `TRAN` and `MODEL` may be null
//! (e.g. virtio disks report no transport on older kernels). The serde
//! helpers below accept all of these shapes.

use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::process::Command;
use strum::{Display, EnumString};

use crate::error::{InstallError, Result};

/// Physical/bus interconnect of a storage device, as reported by lsblk's
/// `TRAN` column.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Transport {
    Nvme,
    Sata,
    Ata,
    Usb,
    Virtio,
    /// Anything lsblk reports that we don't special-case (sas, mmc, ...)
    #[strum(default)]
    Other(String),
}

/// One disk-type block device, produced fresh on each enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device node path, e.g. `/dev/nvme0n1`
    pub path: PathBuf,
    /// Total size in bytes
    pub size: u64,
    /// True for rotational media (HDD), false for SSD/NVMe
    pub rotational: bool,
    /// Bus transport, if lsblk reported one
    pub transport: Option<Transport>,
    /// Model string, if lsblk reported one
    pub model: Option<String>,
}

impl BlockDevice {
    /// Returns true if this device is attached via NVMe.
    ///
    /// The transport column is authoritative, but some environments leave it
    /// null; the `/dev/nvme*` path prefix covers those.
    pub fn is_nvme(&self) -> bool {
        self.transport == Some(Transport::Nvme)
            || self.path.to_string_lossy().starts_with("/dev/nvme")
    }

    /// Short media-kind label for display.
    pub fn kind_label(&self) -> &'static str {
        if self.rotational {
            "HDD"
        } else {
            "SSD/NVMe"
        }
    }

    /// One-line description for the detected-disks table.
    pub fn describe(&self) -> String {
        let tran = self
            .transport
            .as_ref()
            .map(Transport::to_string)
            .unwrap_or_else(|| "n/a".to_string());
        let model = self.model.as_deref().unwrap_or("n/a");
        format!(
            "{:>14} | size: {:>9} | type: {:>9} | transport: {:>6} | model: {}",
            self.path.display(),
            humanize_size(self.size),
            self.kind_label(),
            tran,
            model
        )
    }
}

/// Enumerate all disk-type block devices on the host.
///
/// Fails softly: on any error the problem is logged and an empty Vec is
/// returned. Callers must treat an empty result as "no installable target".
pub fn enumerate_disks() -> Vec<BlockDevice> {
    match query_lsblk() {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Failed to enumerate disks via lsblk: {}", e);
            Vec::new()
        }
    }
}

fn query_lsblk() -> Result<Vec<BlockDevice>> {
    let output = Command::new("lsblk")
        .args(["-J", "-b", "-o", "NAME,TYPE,SIZE,ROTA,MODEL,PATH,TRAN"])
        .output()?;

    if !output.status.success() {
        return Err(InstallError::enumeration(format!(
            "lsblk exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_lsblk(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `lsblk -J -b` output into disk-type [`BlockDevice`]s.
pub fn parse_lsblk(json: &str) -> Result<Vec<BlockDevice>> {
    let report: LsblkReport = serde_json::from_str(json)?;

    let devices = report
        .blockdevices
        .into_iter()
        .filter(|entry| entry.kind.eq_ignore_ascii_case("disk"))
        .map(|entry| {
            let path = entry
                .path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| format!("/dev/{}", entry.name));
            let transport = entry
                .tran
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .and_then(|t| t.parse::<Transport>().ok());
            let model = entry
                .model
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty());

            BlockDevice {
                path: PathBuf::from(path),
                size: entry.size,
                rotational: entry.rota,
                transport,
                model,
            }
        })
        .collect();

    Ok(devices)
}

/// Format a byte count using binary units, matching the installer's console
/// output ("500.1 GiB", "932 B").
pub fn humanize_size(num_bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    let mut size = num_bytes as f64;
    for unit in UNITS {
        if size < 1024.0 || *unit == "PiB" {
            if *unit == "B" {
                return format!("{:.0} {}", size, unit);
            }
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{} B", num_bytes)
}

// ============================================================================
// lsblk JSON wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LsblkReport {
    #[serde(default)]
    blockdevices: Vec<LsblkEntry>,
}

#[derive(Debug, Deserialize)]
struct LsblkEntry {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, deserialize_with = "de_size")]
    size: u64,
    #[serde(default = "default_rota", deserialize_with = "de_rota")]
    rota: bool,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    tran: Option<String>,
}

// Unknown rotational state is treated as rotational so it never wins the
// SSD selection tier.
fn default_rota() -> bool {
    true
}

fn de_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSize {
        Num(u64),
        Str(String),
        Null(()),
    }

    Ok(match RawSize::deserialize(deserializer)? {
        RawSize::Num(n) => n,
        RawSize::Str(s) => s.trim().parse().unwrap_or(0),
        RawSize::Null(()) => 0,
    })
}

fn de_rota<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRota {
        Bool(bool),
        Num(u64),
        Str(String),
        Null(()),
    }

    Ok(match RawRota::deserialize(deserializer)? {
        RawRota::Bool(b) => b,
        RawRota::Num(n) => n != 0,
        RawRota::Str(s) => s.trim() != "0",
        RawRota::Null(()) => default_rota(),
    })
}

// ============================================================================
// Tests
// ============================================================================
