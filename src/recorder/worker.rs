//! The recording worker: sole owner of the backend selector.
//!
//! Every command runs to completion here, in queue order. Failures are
//! absorbed at this boundary and turned into diagnostics; the only failure
//! a caller ever observes is an upload listener's `fail_to_ready`.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::core::errors::DlgError;
use crate::format::header::BasicInfoRecord;
use crate::format::line::LogFormatter;
use crate::platform::pal::{HostInfo, StorageGate};
use crate::recorder::dispatch::{CallbackDispatcher, UploadListener, UploadOutcome, deliver};
use crate::recorder::queue::{Command, CommandHandler};
use crate::recorder::selector::{BackendSelector, SelectorStats, WriterState};
use crate::recorder::stager::UploadStager;
use crate::writer::WriterBackend;

/// Inputs of the session header, shared with the calling threads.
pub struct HeaderSource {
    pub formatter: LogFormatter,
    pub host: Arc<dyn HostInfo>,
    pub user_info: Arc<RwLock<String>>,
    pub device_id: String,
}

impl HeaderSource {
    /// Render the header from the current user info.
    pub fn render(&self) -> String {
        let user = self.user_info.read().clone();
        BasicInfoRecord::collect(self.host.as_ref(), &user, &self.device_id).render(&self.formatter)
    }
}

/// Snapshot published by the worker after every command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WriterState,
    pub selector: SelectorStats,
    pub permission_denials: u64,
    pub failed_uploads: u64,
}

pub struct Worker<M, P> {
    selector: BackendSelector<M, P>,
    stager: UploadStager,
    header: HeaderSource,
    gate: Arc<dyn StorageGate>,
    dispatcher: Arc<dyn CallbackDispatcher>,
    status: Arc<Mutex<WorkerStatus>>,
    permission_denials: u64,
    failed_uploads: u64,
}

impl<M, P> Worker<M, P>
where
    M: WriterBackend + 'static,
    P: WriterBackend + 'static,
{
    pub fn new(
        selector: BackendSelector<M, P>,
        header: HeaderSource,
        gate: Arc<dyn StorageGate>,
        dispatcher: Arc<dyn CallbackDispatcher>,
        status: Arc<Mutex<WorkerStatus>>,
    ) -> Self {
        let stager = UploadStager::new(selector.directory());
        Self {
            selector,
            stager,
            header,
            gate,
            dispatcher,
            status,
            permission_denials: 0,
            failed_uploads: 0,
        }
    }

    fn publish(&self) {
        *self.status.lock() = WorkerStatus {
            state: self.selector.state(),
            selector: self.selector.stats(),
            permission_denials: self.permission_denials,
            failed_uploads: self.failed_uploads,
        };
    }

    fn prepare_upload(&mut self, listener: Box<dyn UploadListener>) {
        let header = &self.header;
        let render = || header.render();
        let staged = self
            .selector
            .close_and_renew(&render)
            .and_then(|active| self.stager.stage(&active.name()));
        let outcome = match staged {
            Ok(report) => {
                tracing::info!(staged = report.staged.len(), "logs ready to upload");
                UploadOutcome::Ready
            }
            Err(e) => {
                self.failed_uploads += 1;
                tracing::warn!(code = e.code(), error = %e, "upload preparation failed");
                UploadOutcome::Failed
            }
        };
        deliver(self.dispatcher.as_ref(), listener, outcome);
    }

    fn deny(&mut self, command: Command, err: &DlgError) {
        self.permission_denials += 1;
        tracing::warn!(code = err.code(), error = %err, "operation skipped");
        if let Command::PrepareUpload { listener } = command {
            deliver(self.dispatcher.as_ref(), listener, UploadOutcome::Failed);
        }
    }
}

impl<M, P> CommandHandler for Worker<M, P>
where
    M: WriterBackend + 'static,
    P: WriterBackend + 'static,
{
    fn handle(&mut self, command: Command) {
        let mutating = !matches!(command, Command::Barrier(_) | Command::Shutdown);
        let denied = mutating
            .then(|| self.gate.require(command.label()).err())
            .flatten();
        if let Some(err) = denied {
            self.deny(command, &err);
            self.publish();
            return;
        }

        let header = &self.header;
        let render = || header.render();
        match command {
            Command::Init => {
                if let Err(e) = self.selector.ensure_active(&render) {
                    tracing::debug!(error = %e, "eager init failed");
                }
            }
            Command::Write { line, encrypt } => {
                if let Err(e) = self.selector.write(&line, encrypt, &render) {
                    tracing::debug!(code = e.code(), "log line dropped");
                }
            }
            Command::RefreshHeader => {
                let line = render();
                if let Err(e) = self.selector.refresh_header(&line, &render) {
                    tracing::debug!(code = e.code(), "header refresh dropped");
                }
            }
            Command::PrepareUpload { listener } => self.prepare_upload(listener),
            Command::Barrier(ack) => {
                if let Err(e) = self.selector.flush() {
                    tracing::warn!(error = %e, "flush failed");
                }
                let _ = ack.send(());
            }
            Command::Shutdown => {}
        }
        self.publish();
    }

    fn finish(&mut self) {
        if let Err(e) = self.selector.flush() {
            tracing::warn!(error = %e, "final flush failed");
        }
        self.publish();
        tracing::debug!("recorder worker stopped");
    }

    fn on_dropped(&mut self, count: u64) {
        tracing::warn!(count, "recording queue full, tasks dropped");
    }
}
