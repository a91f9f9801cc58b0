#![deny(unsafe_code)]

//! diaglog: on-device, append-only diagnostic log recorder.
//!
//! Lines are written by a single worker thread through one of two
//! backends:
//! 1. **Mapped writer**: appends into a memory-mapped, pre-grown file
//! 2. **Plain writer**: sequential appends, the backend of last resort
//!
//! The mapped writer is preferred. Once it fails, or once the plain writer
//! has taken over, the process never goes back to it. Sealed files are
//! later renamed into upload-ready names without disturbing the file that
//! is still being written.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use diaglog::prelude::*;
//!
//! # fn main() -> diaglog::core::errors::Result<()> {
//! let config = Config::with_directory("/var/log/myapp");
//! let env = RecorderEnv::standard(&config.storage.directory)?;
//! let recorder = LogRecorder::start(config, env)?;
//! recorder.log("startup", "hello", false);
//! recorder.refresh_user("user-42");
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod format;
pub mod platform;
pub mod recorder;
pub mod writer;
