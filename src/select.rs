//! Target disk selection.
//!
//! The one piece of real decision logic in the installer: given the
//! enumerated disks, pick exactly one install target by a fixed priority
//! rule. Pure — no I/O, no side effects — so it is trivially testable.
//!
//! # Priority
//!
//! 1. Any NVMe device (transport or `/dev/nvme*` path) → largest NVMe
//! 2. Else any non-rotational device → largest SSD
//! 3. Else → largest disk overall
//!
//! Ties within a tier keep the first maximal device in enumeration order.
//! That order is stable but not user-visible; it only matters for
//! determinism across runs on identical hardware.

use std::fmt;

use crate::device::BlockDevice;

/// Why a particular disk was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// Chosen from the NVMe tier
    Nvme,
    /// Chosen from the non-rotational (SSD) tier
    NonRotational,
    /// Fallback: largest disk of any kind
    Largest,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nvme => write!(f, "NVMe drive"),
            Self::NonRotational => write!(f, "SSD (non-rotational) drive"),
            Self::Largest => write!(f, "largest available disk"),
        }
    }
}

/// The chosen target disk plus the human-readable reason for the choice.
#[derive(Debug, Clone)]
pub struct Selection {
    pub device: BlockDevice,
    pub reason: SelectionReason,
}

/// Deterministically choose one install target from the enumerated disks.
///
/// Returns `None` only for an empty slice; the install flow aborts on an
/// empty enumeration before ever calling this.
pub fn select_target(devices: &[BlockDevice]) -> Option<Selection> {
    if let Some(device) = largest(devices.iter().filter(|d| d.is_nvme())) {
        return Some(Selection {
            device: device.clone(),
            reason: SelectionReason::Nvme,
        });
    }

    if let Some(device) = largest(devices.iter().filter(|d| !d.rotational)) {
        return Some(Selection {
            device: device.clone(),
            reason: SelectionReason::NonRotational,
        });
    }

    largest(devices.iter()).map(|device| Selection {
        device: device.clone(),
        reason: SelectionReason::Largest,
    })
}

/// First maximal device by size. `max_by_key` would keep the last maximum
/// on ties, so fold explicitly with a strict comparison.
fn largest<'a, I>(devices: I) -> Option<&'a BlockDevice>
where
    I: Iterator<Item = &'a BlockDevice>,
{
    devices.fold(None, |best, candidate| match best {
        Some(current) if candidate.size > current.size => Some(candidate),
        Some(current) => Some(current),
        None => Some(candidate),
    })
}

// ============================================================================
// Tests
// ============================================================================
