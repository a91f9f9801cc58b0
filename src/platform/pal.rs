//! Host abstraction: the storage capability gate and the metadata supplier
//! feeding the session header.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::errors::{DlgError, Result};

/// Capability gate consulted before every mutating operation.
pub trait StorageGate: Send + Sync {
    fn has_storage_permission(&self) -> bool;

    /// `PermissionDenied` for `operation` unless storage is accessible.
    fn require(&self, operation: &'static str) -> Result<()> {
        if self.has_storage_permission() {
            Ok(())
        } else {
            Err(DlgError::PermissionDenied { operation })
        }
    }
}

/// Device/app/user metadata collected for the header line.
pub trait HostInfo: Send + Sync {
    fn platform_label(&self) -> String;
    fn process_name(&self) -> String;
    fn app_version(&self) -> String;
    fn device_info(&self) -> String;
    fn is_rooted(&self) -> bool;
}

/// Gate that is always open.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl StorageGate for AlwaysGranted {
    fn has_storage_permission(&self) -> bool {
        true
    }
}

impl<F> StorageGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn has_storage_permission(&self) -> bool {
        self()
    }
}

/// Gate that checks read+write access on the log directory, or on its
/// nearest existing ancestor when the directory does not exist yet.
#[derive(Debug, Clone)]
pub struct DirectoryAccessGate {
    directory: PathBuf,
}

impl DirectoryAccessGate {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl StorageGate for DirectoryAccessGate {
    fn has_storage_permission(&self) -> bool {
        let Some(existing) = self.directory.ancestors().find(|p| p.exists()) else {
            return false;
        };
        can_read_write(existing)
    }
}

#[cfg(unix)]
fn can_read_write(path: &Path) -> bool {
    use nix::unistd::{AccessFlags, access};
    access(path, AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn can_read_write(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| !m.permissions().readonly())
}

/// Fixed metadata, for embedding hosts that already know their identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticHostInfo {
    pub platform: String,
    pub process_name: String,
    pub app_version: String,
    pub device_info: String,
    pub rooted: bool,
}

impl HostInfo for StaticHostInfo {
    fn platform_label(&self) -> String {
        self.platform.clone()
    }

    fn process_name(&self) -> String {
        self.process_name.clone()
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }

    fn device_info(&self) -> String {
        self.device_info.clone()
    }

    fn is_rooted(&self) -> bool {
        self.rooted
    }
}

/// Metadata of the running process, read from the environment.
#[derive(Debug, Clone)]
pub struct ProcessHostInfo {
    app_version: String,
}

impl ProcessHostInfo {
    /// `app_version` is the embedding application's version, not this crate's.
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
        }
    }
}

impl Default for ProcessHostInfo {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl HostInfo for ProcessHostInfo {
    fn platform_label(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn process_name(&self) -> String {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn app_version(&self) -> String {
        self.app_version.clone()
    }

    fn device_info(&self) -> String {
        format!(
            "{} {} pid={}",
            std::env::consts::ARCH,
            std::env::consts::FAMILY,
            std::process::id()
        )
    }

    fn is_rooted(&self) -> bool {
        is_superuser()
    }
}

#[cfg(unix)]
fn is_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_superuser() -> bool {
    false
}
