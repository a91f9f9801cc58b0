//! The public recorder: validates input on the caller's thread, formats
//! lines and hands every mutation to the recording worker.
//!
//! No method here ever blocks on storage or returns a storage error.
//! Persistent failure turns logging into a silent no-op; the one visible
//! failure surface is [`UploadListener::fail_to_ready`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{DlgError, Result};
use crate::format::line::{LogFormatter, Payload};
use crate::platform::pal::{DirectoryAccessGate, HostInfo, ProcessHostInfo, StorageGate};
use crate::recorder::dispatch::{
    CallbackDispatcher, ThreadDispatcher, UploadListener, UploadOutcome, deliver,
};
use crate::recorder::queue::{Command, RecordingQueue, spawn_queue};
use crate::recorder::selector::{
    BackendFactory, BackendSelector, SelectorConfig, SelectorStats, WriterState,
};
use crate::recorder::worker::{HeaderSource, Worker, WorkerStatus};
use crate::writer::{MappedWriter, PlainWriter, WriterBackend};

/// Host capabilities injected into a recorder.
pub struct RecorderEnv {
    /// Consulted before every mutating operation.
    pub gate: Arc<dyn StorageGate>,
    /// Metadata for the session header.
    pub host: Arc<dyn HostInfo>,
    /// Where upload listeners are invoked.
    pub dispatcher: Arc<dyn CallbackDispatcher>,
    pub formatter: LogFormatter,
}

impl RecorderEnv {
    /// Directory-access gate, process metadata and a dedicated callback
    /// thread.
    pub fn standard(directory: &Path) -> Result<Self> {
        Ok(Self {
            gate: Arc::new(DirectoryAccessGate::new(directory)),
            host: Arc::new(ProcessHostInfo::default()),
            dispatcher: Arc::new(ThreadDispatcher::spawn()?),
            formatter: LogFormatter::default(),
        })
    }
}

/// Read-only counters of a running recorder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub selector: SelectorStats,
    /// Tasks dropped because the recording queue was full.
    pub dropped_tasks: u64,
    /// Operations skipped because storage permission was denied.
    pub permission_denials: u64,
    /// `prepare_upload` calls that ended in `fail_to_ready`.
    pub failed_uploads: u64,
}

/// Append-only log recorder.
pub struct LogRecorder {
    queue: RecordingQueue,
    status: Arc<Mutex<WorkerStatus>>,
    user_info: Arc<RwLock<String>>,
    gate: Arc<dyn StorageGate>,
    dispatcher: Arc<dyn CallbackDispatcher>,
    formatter: LogFormatter,
    directory: PathBuf,
    entry_denials: AtomicU64,
    join: Option<thread::JoinHandle<()>>,
}

impl LogRecorder {
    /// Start a recorder with the real mapped and plain backends.
    pub fn start(config: Config, env: RecorderEnv) -> Result<Self> {
        let region = config.storage.mapped_region_bytes;
        Self::with_backends(
            config,
            env,
            Box::new(move || MappedWriter::new(region)),
            Box::new(PlainWriter::new),
        )
    }

    /// Start a recorder over caller-supplied backend factories.
    pub fn with_backends<M, P>(
        mut config: Config,
        env: RecorderEnv,
        mapped_factory: BackendFactory<M>,
        plain_factory: BackendFactory<P>,
    ) -> Result<Self>
    where
        M: WriterBackend + 'static,
        P: WriterBackend + 'static,
    {
        config.normalize_paths();
        config.validate()?;

        let directory = config.storage.directory.clone();
        let user_info = Arc::new(RwLock::new(config.session.user_info.clone()));
        let status = Arc::new(Mutex::new(WorkerStatus::default()));

        let selector = BackendSelector::new(
            SelectorConfig {
                directory: directory.clone(),
                cipher_key: config.security.cipher_key.clone(),
                backup_forced: config.storage.backup_forced,
                remember_mapped_failure: config.storage.remember_mapped_failure,
            },
            mapped_factory,
            plain_factory,
        );
        let header = HeaderSource {
            formatter: env.formatter,
            host: env.host,
            user_info: Arc::clone(&user_info),
            device_id: config.session.device_id.clone(),
        };
        let worker = Worker::new(
            selector,
            header,
            Arc::clone(&env.gate),
            Arc::clone(&env.dispatcher),
            Arc::clone(&status),
        );
        let (queue, join) = spawn_queue(config.queue.capacity, worker)?;

        let recorder = Self {
            queue,
            status,
            user_info,
            gate: env.gate,
            dispatcher: env.dispatcher,
            formatter: env.formatter,
            directory,
            entry_denials: AtomicU64::new(0),
            join: Some(join),
        };
        if config.queue.eager_init {
            recorder.enqueue(Command::Init);
        }
        tracing::debug!(
            dir = %recorder.directory.display(),
            backup_forced = config.storage.backup_forced,
            "log recorder started"
        );
        Ok(recorder)
    }

    fn permitted(&self, operation: &'static str) -> bool {
        let Err(err) = self.gate.require(operation) else {
            return true;
        };
        self.entry_denials.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(code = err.code(), error = %err, "operation skipped");
        false
    }

    fn enqueue(&self, command: Command) {
        if let Err(command) = self.queue.submit(command) {
            tracing::debug!(
                operation = command.label(),
                "recording queue unavailable, task dropped"
            );
        }
    }

    /// Record one message. Empty tags or messages are ignored.
    pub fn log(&self, tag: &str, payload: impl Into<Payload>, encrypt: bool) {
        let payload = payload.into();
        if tag.is_empty() || payload.is_empty() || !self.permitted("log") {
            return;
        }
        let line = self.formatter.format(tag, &payload, encrypt);
        self.enqueue(Command::Write { line, encrypt });
    }

    /// Record an ordered list of fields as one line.
    pub fn log_fields<I, S>(&self, tag: &str, fields: I, encrypt: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.log(tag, Payload::Fields(fields), encrypt);
    }

    /// Serialize `value` to JSON on the calling thread and record it.
    pub fn log_json<T: Serialize + ?Sized>(&self, tag: &str, value: &T, encrypt: bool) {
        match serde_json::to_string(value) {
            Ok(json) if json != "null" => self.log(tag, json, encrypt),
            Ok(_) => {}
            Err(e) => tracing::warn!(tag, error = %e, "log payload not serializable, dropped"),
        }
    }

    /// Replace the user info and record a fresh header line.
    ///
    /// The new value is visible to every header generated after this call
    /// returns, including headers anchoring files opened later.
    pub fn refresh_user(&self, user: impl Into<String>) {
        *self.user_info.write() = user.into();
        if self.permitted("refresh_user") {
            self.enqueue(Command::RefreshHeader);
        }
    }

    /// Current user info.
    pub fn user_info(&self) -> String {
        self.user_info.read().clone()
    }

    /// Seal the active file and stage every inactive file for upload.
    ///
    /// `listener` is told the outcome exactly once, through the dispatcher.
    pub fn prepare_upload(&self, listener: impl UploadListener) {
        let listener: Box<dyn UploadListener> = Box::new(listener);
        if !self.permitted("prepare_upload") {
            deliver(self.dispatcher.as_ref(), listener, UploadOutcome::Failed);
            return;
        }
        if let Err(Command::PrepareUpload { listener }) =
            self.queue.submit(Command::PrepareUpload { listener })
        {
            tracing::warn!("recording queue full, upload preparation refused");
            deliver(self.dispatcher.as_ref(), listener, UploadOutcome::Failed);
        }
    }

    /// Block until every operation submitted so far has run and the
    /// backend has been flushed.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.queue.submit_blocking(Command::Barrier(ack_tx))?;
        ack_rx.recv().map_err(|_| DlgError::ChannelClosed {
            component: "recorder worker",
        })
    }

    /// State of the backend selector as of the last completed operation.
    pub fn writer_state(&self) -> WriterState {
        self.status.lock().state
    }

    pub fn stats(&self) -> RecorderStats {
        let status = *self.status.lock();
        RecorderStats {
            selector: status.selector,
            dropped_tasks: self.queue.dropped_tasks(),
            permission_denials: status.permission_denials
                + self.entry_denials.load(Ordering::Relaxed),
            failed_uploads: status.failed_uploads,
        }
    }

    /// Log storage root.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Drain the queue and stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        if self.queue.submit_blocking(Command::Shutdown).is_err() {
            tracing::debug!("recorder worker already gone");
        }
        if join.thread().id() != thread::current().id() && join.join().is_err() {
            tracing::error!("recorder worker panicked");
        }
    }
}

impl Drop for LogRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
