//! Write-path orchestration: backend selection, the recording queue and
//! its worker, upload staging and listener dispatch.

pub mod dispatch;
pub mod queue;
pub mod selector;
pub mod session;
pub mod stager;
pub mod worker;

pub use dispatch::{CallbackDispatcher, ThreadDispatcher, UploadListener, UploadOutcome};
pub use selector::{BackendSelector, SelectorStats, WriterState};
pub use session::{LogRecorder, RecorderEnv, RecorderStats};
pub use stager::{StageReport, UploadStager};
