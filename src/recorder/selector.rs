//! Backend selection and the fallback state machine.
//!
//! ```text
//! Uninitialized --mapped init ok-------------------> MappedActive
//! Uninitialized --mapped init fails, plain ok------> PlainActive
//! Uninitialized --backup forced, plain ok----------> PlainActive
//! Uninitialized --plain init fails-----------------> FailedPermanently
//! MappedActive  --runtime failure, plain ok--------> PlainActive  (retry once)
//! PlainActive   --runtime failure------------------> PlainActive  (operation dropped)
//! FailedPermanently --next operation---------------> plain init retried
//! ```
//!
//! The mapped backend is never attempted again once it has failed or the
//! plain backend has taken over, for the rest of the process lifetime.
//! Only the recording worker owns a selector, so none of this is locked.

#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use crate::core::errors::{DlgError, Result};
use crate::writer::naming::MAPPED_DISABLED_MARKER;
use crate::writer::{ActiveFile, BackendKind, WriterBackend};

/// Observable state of the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterState {
    #[default]
    Uninitialized,
    MappedActive,
    PlainActive,
    FailedPermanently,
}

/// Counters describing what the selector has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectorStats {
    pub mapped_init_attempts: u64,
    pub plain_init_attempts: u64,
    pub fallbacks: u64,
    pub retried_operations: u64,
    pub dropped_operations: u64,
}

/// Builds a fresh, uninitialized backend.
pub type BackendFactory<B> = Box<dyn Fn() -> B + Send>;

/// Static inputs of backend initialization.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub directory: PathBuf,
    pub cipher_key: String,
    pub backup_forced: bool,
    pub remember_mapped_failure: bool,
}

/// Exactly one active backend, tagged by variant.
enum ActiveBackend<M, P> {
    Mapped(M),
    Plain(P),
}

impl<M: WriterBackend, P: WriterBackend> ActiveBackend<M, P> {
    fn backend(&mut self) -> &mut dyn WriterBackend {
        match self {
            Self::Mapped(m) => m,
            Self::Plain(p) => p,
        }
    }

    fn backend_ref(&self) -> &dyn WriterBackend {
        match self {
            Self::Mapped(m) => m,
            Self::Plain(p) => p,
        }
    }

    const fn kind(&self) -> BackendKind {
        match self {
            Self::Mapped(_) => BackendKind::Mapped,
            Self::Plain(_) => BackendKind::Plain,
        }
    }
}

/// Owner of the active backend and of every transition between backends.
pub struct BackendSelector<M, P> {
    config: SelectorConfig,
    mapped_factory: BackendFactory<M>,
    plain_factory: BackendFactory<P>,
    active: Option<ActiveBackend<M, P>>,
    state: WriterState,
    mapped_disabled: bool,
    stats: SelectorStats,
}

impl<M, P> BackendSelector<M, P>
where
    M: WriterBackend + 'static,
    P: WriterBackend + 'static,
{
    pub fn new(
        config: SelectorConfig,
        mapped_factory: BackendFactory<M>,
        plain_factory: BackendFactory<P>,
    ) -> Self {
        let mapped_disabled = config.remember_mapped_failure
            && config.directory.join(MAPPED_DISABLED_MARKER).exists();
        if mapped_disabled {
            tracing::info!(
                dir = %config.directory.display(),
                "mapped backend disabled by an earlier failure marker"
            );
        }
        Self {
            config,
            mapped_factory,
            plain_factory,
            active: None,
            state: WriterState::Uninitialized,
            mapped_disabled,
            stats: SelectorStats::default(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn stats(&self) -> SelectorStats {
        self.stats
    }

    pub fn active_kind(&self) -> Option<BackendKind> {
        self.active.as_ref().map(ActiveBackend::kind)
    }

    pub fn active_file(&self) -> Option<ActiveFile> {
        self.active
            .as_ref()
            .and_then(|a| a.backend_ref().active_file().cloned())
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.config.directory
    }

    /// Make sure a backend is active, initializing one if needed.
    ///
    /// `header` renders the current session header; it is only called when
    /// a backend actually has to be initialized.
    pub fn ensure_active(&mut self, header: &dyn Fn() -> String) -> Result<BackendKind> {
        if let Some(active) = &self.active {
            return Ok(active.kind());
        }

        if !self.config.backup_forced && !self.mapped_disabled {
            self.stats.mapped_init_attempts += 1;
            let mut mapped = (self.mapped_factory)();
            match mapped.init(&header(), &self.config.directory, &self.config.cipher_key) {
                Ok(()) => {
                    tracing::debug!(dir = %self.config.directory.display(), "mapped backend active");
                    self.active = Some(ActiveBackend::Mapped(mapped));
                    self.state = WriterState::MappedActive;
                    return Ok(BackendKind::Mapped);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "mapped backend init failed, falling back to plain");
                    self.disable_mapped();
                }
            }
        }

        self.init_plain(&header())
    }

    fn init_plain(&mut self, header: &str) -> Result<BackendKind> {
        // Release the previous backend (and its file) before opening another.
        self.active = None;
        self.stats.plain_init_attempts += 1;
        let mut plain = (self.plain_factory)();
        match plain.init(header, &self.config.directory, &self.config.cipher_key) {
            Ok(()) => {
                self.active = Some(ActiveBackend::Plain(plain));
                self.state = WriterState::PlainActive;
                // Anti-flapping: plain stays for the rest of the process.
                self.mapped_disabled = true;
                Ok(BackendKind::Plain)
            }
            Err(e) => {
                tracing::error!(error = %e, "plain backend init failed, logging unavailable this cycle");
                self.state = WriterState::FailedPermanently;
                Err(e)
            }
        }
    }

    fn disable_mapped(&mut self) {
        self.mapped_disabled = true;
        if !self.config.remember_mapped_failure {
            return;
        }
        let marker = self.config.directory.join(MAPPED_DISABLED_MARKER);
        if let Err(e) = fs::create_dir_all(&self.config.directory).and_then(|()| fs::write(&marker, b""))
        {
            tracing::warn!(path = %marker.display(), error = %e, "could not persist mapped failure marker");
        }
    }

    /// Replace a failed mapped backend with the plain one.
    fn fall_back(&mut self, header: &str) -> Result<()> {
        self.stats.fallbacks += 1;
        self.disable_mapped();
        self.init_plain(header).map(|_| ())
    }

    fn backend(&mut self) -> Result<&mut dyn WriterBackend> {
        self.active
            .as_mut()
            .map(ActiveBackend::backend)
            .ok_or_else(|| DlgError::Runtime {
                details: "no active backend".to_string(),
            })
    }

    fn dropped(&mut self, err: DlgError) -> DlgError {
        self.stats.dropped_operations += 1;
        err
    }

    /// Append one line under the one-shot recovery policy.
    pub fn write(
        &mut self,
        content: &str,
        encrypt: bool,
        header: &dyn Fn() -> String,
    ) -> Result<()> {
        let kind = match self.ensure_active(header) {
            Ok(kind) => kind,
            Err(e) => return Err(self.dropped(e)),
        };
        let first = self.backend().and_then(|b| b.write(content, encrypt));
        let Err(e) = first else {
            return Ok(());
        };
        if kind == BackendKind::Plain {
            tracing::warn!(error = %e, "plain write failed, line dropped");
            return Err(self.dropped(e));
        }

        tracing::warn!(error = %e, "mapped write failed, retrying once on plain");
        if let Err(init) = self.fall_back(&header()) {
            return Err(self.dropped(init));
        }
        self.stats.retried_operations += 1;
        let retry = self.backend().and_then(|b| b.write(content, encrypt));
        retry.map_err(|e| {
            tracing::warn!(error = %e, "retry on plain failed, line dropped");
            self.dropped(e)
        })
    }

    /// Push a new header into the backend and record it in the stream,
    /// under the same recovery policy as [`BackendSelector::write`].
    pub fn refresh_header(&mut self, header_line: &str, header: &dyn Fn() -> String) -> Result<()> {
        let kind = match self.ensure_active(header) {
            Ok(kind) => kind,
            Err(e) => return Err(self.dropped(e)),
        };
        let first = self.backend().and_then(|b| {
            b.refresh_header(header_line)?;
            b.write(header_line, false)
        });
        let Err(e) = first else {
            return Ok(());
        };
        if kind == BackendKind::Plain {
            tracing::warn!(error = %e, "header refresh failed on plain, dropped");
            return Err(self.dropped(e));
        }

        tracing::warn!(error = %e, "header refresh failed on mapped, retrying once on plain");
        if let Err(init) = self.fall_back(header_line) {
            return Err(self.dropped(init));
        }
        self.stats.retried_operations += 1;
        let retry = self.backend().and_then(|b| {
            b.refresh_header(header_line)?;
            b.write(header_line, false)
        });
        retry.map_err(|e| self.dropped(e))
    }

    /// Seal the active file and open a fresh one.
    ///
    /// A failure here is reported as a rotation error; the backend stays
    /// in place and reopens its file on the next write.
    pub fn close_and_renew(&mut self, header: &dyn Fn() -> String) -> Result<ActiveFile> {
        self.ensure_active(header)?;
        self.backend()?
            .close_and_renew()
            .map_err(|e| DlgError::Rotate {
                details: e.to_string(),
            })
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.active.as_mut() {
            Some(active) => active.backend().flush(),
            None => Ok(()),
        }
    }
}
