//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use diaglog::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DlgError, Result};

// Format
pub use crate::format::line::{LogFormatter, Payload};
pub use crate::format::reader::{StoredLine, read_log_file};

// Platform
pub use crate::platform::pal::{AlwaysGranted, HostInfo, StaticHostInfo, StorageGate};

// Recorder
pub use crate::recorder::{
    CallbackDispatcher, LogRecorder, RecorderEnv, RecorderStats, ThreadDispatcher,
    UploadListener, UploadOutcome, WriterState,
};

// Writer
pub use crate::writer::{BackendKind, MappedWriter, PlainWriter, WriterBackend};
