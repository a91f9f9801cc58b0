//! Writer backends: the memory-mapped fast path and the plain-file fallback.
//!
//! Both variants honor one contract ([`WriterBackend`]). Neither does any
//! locking: they are owned and driven by the single recording worker.

#![allow(missing_docs)]

pub mod cipher;
pub mod mapped;
pub mod naming;
pub mod plain;

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::core::errors::{DlgError, Result};

pub use mapped::MappedWriter;
pub use plain::PlainWriter;

/// Which backend variant produced a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Mapped,
    Plain,
}

impl BackendKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mapped => "mapped",
            Self::Plain => "plain",
        }
    }

    /// Whether files of this variant carry the mapped suffix.
    #[must_use]
    pub const fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped)
    }
}

/// Identity of the file a backend currently appends to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFile {
    pub kind: BackendKind,
    pub date: NaiveDate,
    pub path: PathBuf,
}

impl ActiveFile {
    pub fn new(dir: &Path, kind: BackendKind, date: NaiveDate) -> Self {
        Self {
            kind,
            date,
            path: dir.join(naming::file_name(date, kind.is_mapped())),
        }
    }

    /// Bare file name, as compared by the upload stager.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Capability contract shared by both backends.
pub trait WriterBackend: Send {
    /// Variant tag; drives file naming and fallback decisions.
    fn kind(&self) -> BackendKind;

    /// Open or create the storage under `dir`. Called once per instance.
    fn init(&mut self, header: &str, dir: &Path, cipher_key: &str) -> Result<()>;

    /// Append one line, encrypting it first when `encrypt` is set.
    fn write(&mut self, content: &str, encrypt: bool) -> Result<()>;

    /// Replace the cached header used to anchor newly opened files.
    fn refresh_header(&mut self, header: &str) -> Result<()>;

    /// Seal the current file and open a fresh one; returns the new active file.
    fn close_and_renew(&mut self) -> Result<ActiveFile>;

    /// The file currently being written, once initialized.
    fn active_file(&self) -> Option<&ActiveFile>;

    /// Push buffered bytes to the OS.
    fn flush(&mut self) -> Result<()>;
}

/// Create the log directory if needed.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| DlgError::io(dir, source))
}

/// Open or create a file for appending. Returns `(File, current_size)`.
pub(crate) fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DlgError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// Move the active file aside under its sealed name. Missing files are fine:
/// nothing was written yet, so there is nothing to seal.
pub(crate) fn seal_file(active: &ActiveFile) -> Result<Option<PathBuf>> {
    let Some(dir) = active.path.parent() else {
        return Ok(None);
    };
    if !active.path.exists() {
        return Ok(None);
    }
    let sealed = naming::sealed_path(dir, &active.name());
    fs::rename(&active.path, &sealed).map_err(|source| DlgError::io(&active.path, source))?;
    Ok(Some(sealed))
}
