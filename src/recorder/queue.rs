//! Single-consumer recording queue.
//!
//! Architecture: one dedicated worker thread owns the backend selector. All
//! other threads send [`Command`]s through a bounded crossbeam channel, so
//! every mutation of the log store happens in one total order. Callers use
//! `try_send()` and are never blocked by back-pressure; overflowing tasks
//! are dropped and counted.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{DlgError, Result};
use crate::recorder::dispatch::UploadListener;

/// One unit of work for the recording worker.
pub enum Command {
    /// Initialize a backend ahead of the first write.
    Init,
    /// Append a formatted line.
    Write { line: String, encrypt: bool },
    /// Regenerate the session header, push it into the backend and record it.
    RefreshHeader,
    /// Seal the active file and stage everything else for upload.
    PrepareUpload { listener: Box<dyn UploadListener> },
    /// Flush the backend and acknowledge once every earlier command ran.
    Barrier(Sender<()>),
    /// Sentinel to request graceful shutdown of the worker.
    Shutdown,
}

impl Command {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Write { .. } => "log",
            Self::RefreshHeader => "refresh_user",
            Self::PrepareUpload { .. } => "prepare_upload",
            Self::Barrier(_) => "flush",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Cheaply-cloneable producer side of the queue.
#[derive(Clone)]
pub struct RecordingQueue {
    tx: Sender<Command>,
    dropped_tasks: Arc<AtomicU64>,
}

impl RecordingQueue {
    /// Enqueue without blocking. On overflow the command is handed back.
    pub fn submit(&self, command: Command) -> std::result::Result<(), Command> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                self.dropped_tasks.fetch_add(1, Ordering::Relaxed);
                Err(command)
            }
            Err(TrySendError::Disconnected(command)) => Err(command),
        }
    }

    /// Enqueue, waiting for room. Used only by explicit blocking calls.
    pub fn submit_blocking(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| DlgError::ChannelClosed {
            component: "recording queue",
        })
    }

    /// Tasks dropped because the queue was full.
    pub fn dropped_tasks(&self) -> u64 {
        self.dropped_tasks.load(Ordering::Relaxed)
    }
}

/// Consumer loop body, implemented by the recording worker.
pub trait CommandHandler: Send + 'static {
    /// Handle one command. Never called with `Shutdown`.
    fn handle(&mut self, command: Command);

    /// Called once after `Shutdown` or when every producer is gone.
    fn finish(&mut self);

    /// Called when tasks were dropped since the previous command.
    fn on_dropped(&mut self, count: u64);
}

/// Spawn the worker thread and return the queue feeding it.
pub fn spawn_queue<H: CommandHandler>(
    capacity: usize,
    handler: H,
) -> Result<(RecordingQueue, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<Command>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let queue = RecordingQueue {
        tx,
        dropped_tasks: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("diaglog-recorder".to_string())
        .spawn(move || worker_main(&rx, handler, &dropped))
        .map_err(|e| DlgError::Runtime {
            details: format!("failed to spawn recorder thread: {e}"),
        })?;

    Ok((queue, join))
}

fn worker_main<H: CommandHandler>(rx: &Receiver<Command>, mut handler: H, dropped: &AtomicU64) {
    let mut reported = 0;
    while let Ok(command) = rx.recv() {
        // The shared counter is cumulative; report only what is new.
        let total = dropped.load(Ordering::Relaxed);
        if total > reported {
            handler.on_dropped(total - reported);
            reported = total;
        }

        if matches!(command, Command::Shutdown) {
            break;
        }
        handler.handle(command);
    }
    handler.finish();
}
