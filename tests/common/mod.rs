#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};

use diaglog::core::config::Config;
use diaglog::core::errors::{DlgError, Result};
use diaglog::format::line::{LogFormatter, Payload};
use diaglog::format::reader::{StoredLine, read_log_file};
use diaglog::platform::pal::{AlwaysGranted, StaticHostInfo};
use diaglog::recorder::{LogRecorder, RecorderEnv, ThreadDispatcher};
use diaglog::writer::{ActiveFile, BackendKind, MappedWriter, PlainWriter, WriterBackend};

// ──────────────────────────── CLI runner ────────────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_dlog") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "dlog.exe" } else { "dlog" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve dlog binary path for integration test"),
    }
}

/// Run `dlog` with `args`, feeding `stdin`, and keep a transcript on disk.
pub fn run_cli_case(case_name: &str, args: &[&str], stdin: &str) -> CmdResult {
    let root = std::env::temp_dir().join("dlog-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut child = Command::new(&bin_path)
        .args(args)
        .env("DLOG_OUTPUT_FORMAT", "json")
        .env("RUST_BACKTRACE", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn dlog command");
    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(stdin.as_bytes())
        .expect("feed stdin");
    let output = child.wait_with_output().expect("execute dlog command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────────── Fault-injecting backend ────────────────────────

/// Switches and counters shared between a test and every backend instance
/// its factory builds.
#[derive(Default)]
pub struct Faults {
    pub fail_init: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_renew: AtomicBool,
    pub inits: AtomicU64,
    pub writes: AtomicU64,
}

impl Faults {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_init(&self, on: bool) {
        self.fail_init.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_renew(&self, on: bool) {
        self.fail_renew.store(on, Ordering::SeqCst);
    }

    pub fn inits(&self) -> u64 {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

/// A real backend whose operations fail whenever the shared switches say so.
pub struct Faulty<B> {
    inner: B,
    faults: Arc<Faults>,
}

impl<B: WriterBackend> Faulty<B> {
    pub fn new(inner: B, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }

    fn label(&self) -> &'static str {
        self.inner.kind().label()
    }
}

impl<B: WriterBackend> WriterBackend for Faulty<B> {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn init(&mut self, header: &str, dir: &Path, cipher_key: &str) -> Result<()> {
        self.faults.inits.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_init.load(Ordering::SeqCst) {
            return Err(DlgError::Init {
                backend: self.label(),
                details: "injected init failure".to_string(),
            });
        }
        self.inner.init(header, dir, cipher_key)
    }

    fn write(&mut self, content: &str, encrypt: bool) -> Result<()> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(DlgError::Write {
                backend: self.label(),
                details: "injected write failure".to_string(),
            });
        }
        self.faults.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(content, encrypt)
    }

    fn refresh_header(&mut self, header: &str) -> Result<()> {
        self.inner.refresh_header(header)
    }

    fn close_and_renew(&mut self) -> Result<ActiveFile> {
        if self.faults.fail_renew.load(Ordering::SeqCst) {
            return Err(DlgError::Rotate {
                details: "injected rotation failure".to_string(),
            });
        }
        self.inner.close_and_renew()
    }

    fn active_file(&self) -> Option<&ActiveFile> {
        self.inner.active_file()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

// ──────────────────────── Parking backend ────────────────────────

/// Plain writer that announces each write on `entered` and then waits on
/// `release`. Dropping the release sender lets every write through.
pub struct Parking {
    inner: PlainWriter,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl WriterBackend for Parking {
    fn kind(&self) -> BackendKind {
        BackendKind::Plain
    }

    fn init(&mut self, header: &str, dir: &Path, cipher_key: &str) -> Result<()> {
        self.inner.init(header, dir, cipher_key)
    }

    fn write(&mut self, content: &str, encrypt: bool) -> Result<()> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        self.inner.write(content, encrypt)
    }

    fn refresh_header(&mut self, header: &str) -> Result<()> {
        self.inner.refresh_header(header)
    }

    fn close_and_renew(&mut self) -> Result<ActiveFile> {
        self.inner.close_and_renew()
    }

    fn active_file(&self) -> Option<&ActiveFile> {
        self.inner.active_file()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

// ──────────────────────────── Recorder setup ────────────────────────────

pub fn test_env() -> RecorderEnv {
    RecorderEnv {
        gate: Arc::new(AlwaysGranted),
        host: Arc::new(StaticHostInfo {
            platform: "linux".to_string(),
            process_name: "e2e".to_string(),
            app_version: "9.9.9".to_string(),
            device_info: "test-rig".to_string(),
            rooted: false,
        }),
        dispatcher: Arc::new(ThreadDispatcher::spawn().expect("callback thread")),
        formatter: LogFormatter::default(),
    }
}

pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::with_directory(dir);
    cfg.storage.mapped_region_bytes = 4096;
    cfg.session.user_info = "initial-user".to_string();
    cfg.session.device_id = "device-0".to_string();
    cfg
}

/// Recorder over a fault-injecting mapped writer and a counting plain writer.
pub fn faulty_recorder(
    config: Config,
    env: RecorderEnv,
    mapped: &Arc<Faults>,
    plain: &Arc<Faults>,
) -> LogRecorder {
    let region = config.storage.mapped_region_bytes;
    let mapped = Arc::clone(mapped);
    let plain = Arc::clone(plain);
    LogRecorder::with_backends(
        config,
        env,
        Box::new(move || Faulty::new(MappedWriter::new(region), Arc::clone(&mapped))),
        Box::new(move || Faulty::new(PlainWriter::new(), Arc::clone(&plain))),
    )
    .expect("recorder starts")
}

/// Plain-only recorder whose writes park until the returned sender drops.
/// The receiver yields once per write that reached the backend.
pub fn parking_recorder(
    mut config: Config,
    env: RecorderEnv,
) -> (LogRecorder, Receiver<()>, Sender<()>) {
    config.storage.backup_forced = true;
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::bounded(0);
    let rec = LogRecorder::with_backends(
        config,
        env,
        Box::new(PlainWriter::new),
        Box::new(move || Parking {
            inner: PlainWriter::new(),
            entered: entered_tx.clone(),
            release: release_rx.clone(),
        }),
    )
    .expect("recorder starts");
    (rec, entered_rx, release_tx)
}

// ──────────────────────────── Inspection ────────────────────────────

/// Visible file names in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// `(tag, payload)` of every parsed line of a file.
pub fn entries(path: &Path) -> Vec<(String, Payload)> {
    read_log_file(path, None)
        .expect("read log file")
        .into_iter()
        .filter_map(|line| match line {
            StoredLine::Parsed(p) => Some((p.tag, p.payload)),
            _ => None,
        })
        .collect()
}

/// Message bodies of every non-header line.
pub fn messages(path: &Path) -> Vec<String> {
    entries(path)
        .into_iter()
        .filter(|(tag, _)| tag != "basic")
        .map(|(_, payload)| match payload {
            Payload::Single(msg) => msg,
            Payload::Fields(fields) => fields.join(","),
        })
        .collect()
}
