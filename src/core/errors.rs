//! DLG-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DlgError>;

/// Top-level error type for the diagnostic log recorder.
#[derive(Debug, Error)]
pub enum DlgError {
    #[error("[DLG-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DLG-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DLG-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DLG-2001] {backend} writer init failed: {details}")]
    Init {
        backend: &'static str,
        details: String,
    },

    #[error("[DLG-2002] {backend} writer write failed: {details}")]
    Write {
        backend: &'static str,
        details: String,
    },

    #[error("[DLG-2003] rotation for upload failed: {details}")]
    Rotate { details: String },

    #[error("[DLG-2004] corrupt mapped log file {path}: {reason}")]
    CorruptMapFile { path: PathBuf, reason: String },

    #[error("[DLG-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DLG-2102] cipher failure: {details}")]
    Cipher { details: String },

    #[error("[DLG-3001] storage permission denied for {operation}")]
    PermissionDenied { operation: &'static str },

    #[error("[DLG-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DLG-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DLG-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DlgError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DLG-1001",
            Self::MissingConfig { .. } => "DLG-1002",
            Self::ConfigParse { .. } => "DLG-1003",
            Self::Init { .. } => "DLG-2001",
            Self::Write { .. } => "DLG-2002",
            Self::Rotate { .. } => "DLG-2003",
            Self::CorruptMapFile { .. } => "DLG-2004",
            Self::Serialization { .. } => "DLG-2101",
            Self::Cipher { .. } => "DLG-2102",
            Self::PermissionDenied { .. } => "DLG-3001",
            Self::Io { .. } => "DLG-3002",
            Self::ChannelClosed { .. } => "DLG-3003",
            Self::Runtime { .. } => "DLG-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Re-tag any failure raised while opening a backend as an init error.
    #[must_use]
    pub fn into_init(self, backend: &'static str) -> Self {
        match self {
            err @ Self::Init { .. } => err,
            other => Self::Init {
                backend,
                details: other.to_string(),
            },
        }
    }

    /// Re-tag any failure raised while appending as a write error.
    #[must_use]
    pub fn into_write(self, backend: &'static str) -> Self {
        match self {
            err @ Self::Write { .. } => err,
            other => Self::Write {
                backend,
                details: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for DlgError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DlgError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
