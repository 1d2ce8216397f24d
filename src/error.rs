//! Error handling module for archup
//!
//! Provides centralized error handling with proper error types using thiserror.
//! The orchestration layer wraps these in `anyhow` for context chains.

#![allow(dead_code)] // Error variants and helpers are available for future use

use thiserror::Error;

/// Main error type for archup
#[derive(Error, Debug)]
pub enum InstallError {
    /// IO errors (file operations, mounts, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors (lsblk output, config files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Block device enumeration errors
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (config values, device paths)
    #[error("Validation error: {0}")]
    Validation(String),

    /// External command errors (sgdisk, pacstrap, arch-chroot, ...)
    #[error("Command failed: {0}")]
    Command(String),

    /// Hardware incompatibility (e.g. no UEFI firmware)
    #[error("Hardware incompatibility: {0}")]
    Hardware(String),

    /// Bootloader installation/configuration errors
    #[error("Bootloader error: {0}")]
    Bootloader(String),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for archup operations
pub type Result<T> = std::result::Result<T, InstallError>;

// Convenient error constructors
impl InstallError {
    /// Create a device enumeration error
    pub fn enumeration(msg: impl Into<String>) -> Self {
        Self::Enumeration(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an external command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a hardware incompatibility error
    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }

    /// Create a bootloader error
    pub fn bootloader(msg: impl Into<String>) -> Self {
        Self::Bootloader(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}
