//! Listener delivery, decoupled from the recording worker.
//!
//! Upload listeners run on a dispatcher of the caller's choosing so that
//! listener code can never stall the write queue.

#![allow(missing_docs)]

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use crate::core::errors::{DlgError, Result};

/// Receives the outcome of one `prepare_upload` call, exactly once.
pub trait UploadListener: Send + 'static {
    fn ready_to_upload(&self);
    fn fail_to_ready(&self);
}

/// Outcome of an upload preparation, for channel-based listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Ready,
    Failed,
}

impl UploadListener for Sender<UploadOutcome> {
    fn ready_to_upload(&self) {
        let _ = self.send(UploadOutcome::Ready);
    }

    fn fail_to_ready(&self) {
        let _ = self.send(UploadOutcome::Failed);
    }
}

/// A queued listener invocation.
pub type Callback = Box<dyn FnOnce() + Send>;

/// Executes listener callbacks on the embedding application's context.
pub trait CallbackDispatcher: Send + Sync {
    fn dispatch(&self, callback: Callback);
}

/// Deliver an outcome to `listener` through `dispatcher`.
pub(crate) fn deliver(
    dispatcher: &dyn CallbackDispatcher,
    listener: Box<dyn UploadListener>,
    outcome: UploadOutcome,
) {
    dispatcher.dispatch(Box::new(move || match outcome {
        UploadOutcome::Ready => listener.ready_to_upload(),
        UploadOutcome::Failed => listener.fail_to_ready(),
    }));
}

/// Dispatcher running callbacks in order on one dedicated thread.
pub struct ThreadDispatcher {
    tx: Option<Sender<Callback>>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ThreadDispatcher {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = unbounded::<Callback>();
        let join = thread::Builder::new()
            .name("diaglog-callbacks".to_string())
            .spawn(move || {
                while let Ok(callback) = rx.recv() {
                    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                        tracing::error!("upload listener panicked");
                    }
                }
            })
            .map_err(|e| DlgError::Runtime {
                details: format!("failed to spawn callback thread: {e}"),
            })?;
        Ok(Self {
            tx: Some(tx),
            join: Mutex::new(Some(join)),
        })
    }
}

impl CallbackDispatcher for ThreadDispatcher {
    fn dispatch(&self, callback: Callback) {
        if let Some(tx) = &self.tx {
            if tx.send(callback).is_err() {
                tracing::warn!("callback thread gone, listener not notified");
            }
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain what is queued and exit.
        drop(self.tx.take());
        if let Some(join) = self.join.lock().take() {
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
    }
}
