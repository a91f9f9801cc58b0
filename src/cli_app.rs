//! Top-level CLI definition and dispatch.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use diaglog::core::config::Config;
use diaglog::format::line::Payload;
use diaglog::format::reader::{StoredLine, read_log_file};
use diaglog::recorder::{LogRecorder, RecorderEnv, UploadOutcome, UploadStager};
use diaglog::writer::cipher::LineCipher;

/// Longest wait for an upload listener before `record --stage` gives up.
const STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Diagnostic log recorder.
#[derive(Debug, Parser)]
#[command(
    name = "dlog",
    author,
    version,
    about = "Append-only diagnostic log recorder",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Log level used when `DLOG_LOG` is not set.
    pub const fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Record stdin lines, one log entry per line.
    Record(RecordArgs),
    /// Print the entries of a plain or mapped log file.
    Decode(DecodeArgs),
    /// Rename sealed log files in a directory into upload-ready names.
    Stage(StageArgs),
    /// Print the effective configuration.
    Config,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct RecordArgs {
    /// Tag attached to every recorded line.
    #[arg(long, short)]
    tag: String,
    /// Encrypt lines with the configured cipher key.
    #[arg(long)]
    encrypt: bool,
    /// Seal and stage files for upload once stdin is exhausted.
    #[arg(long)]
    stage: bool,
    /// Log directory (overrides configuration).
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
    /// Write plain files only.
    #[arg(long)]
    plain: bool,
}

#[derive(Debug, Clone, Args)]
struct DecodeArgs {
    /// Log file to read.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Cipher key for encrypted lines (defaults to the configured key).
    #[arg(long, value_name = "KEY")]
    key: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct StageArgs {
    /// Log directory.
    #[arg(value_name = "DIR")]
    dir: PathBuf,
    /// Name of the file still being written; it is left in place.
    #[arg(long, value_name = "NAME", default_value = "")]
    active: String,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<diaglog::core::errors::DlgError> for CliError {
    fn from(e: diaglog::core::errors::DlgError) -> Self {
        match e {
            diaglog::core::errors::DlgError::InvalidConfig { .. }
            | diaglog::core::errors::DlgError::MissingConfig { .. }
            | diaglog::core::errors::DlgError::ConfigParse { .. } => Self::User(e.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch parsed CLI arguments.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Record(args) => run_record(cli, args),
        Command::Decode(args) => run_decode(cli, args),
        Command::Stage(args) => run_stage(cli, args),
        Command::Config => run_config(cli),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_record(cli: &Cli, args: &RecordArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &args.dir {
        config.storage.directory.clone_from(dir);
    }
    if args.plain {
        config.storage.backup_forced = true;
    }
    config.normalize_paths();

    let env = RecorderEnv::standard(&config.storage.directory)?;
    let recorder = LogRecorder::start(config, env)?;

    let mut recorded = 0_u64;
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        recorder.log(&args.tag, line, args.encrypt);
        recorded += 1;
    }
    recorder.flush()?;

    let staged = if args.stage {
        let (tx, rx) = crossbeam_channel::bounded(1);
        recorder.prepare_upload(tx);
        Some(
            rx.recv_timeout(STAGE_TIMEOUT)
                .is_ok_and(|outcome| outcome == UploadOutcome::Ready),
        )
    } else {
        None
    };

    let state = recorder.writer_state();
    let stats = recorder.stats();
    let dir = recorder.directory().to_path_buf();
    recorder.shutdown();

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "Recorded {recorded} line(s) into {} ({state:?})",
                dir.display()
            );
            if stats.dropped_tasks > 0 || stats.selector.dropped_operations > 0 {
                println!(
                    "  {} {} queued task(s), {} write(s) dropped",
                    "warning:".yellow(),
                    stats.dropped_tasks,
                    stats.selector.dropped_operations
                );
            }
            match staged {
                Some(true) => println!("  Files staged for upload."),
                Some(false) => println!("  {} upload staging failed", "warning:".yellow()),
                None => {}
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "record",
                "directory": dir.to_string_lossy(),
                "recorded": recorded,
                "state": format!("{state:?}"),
                "dropped_tasks": stats.dropped_tasks,
                "dropped_writes": stats.selector.dropped_operations,
                "fallbacks": stats.selector.fallbacks,
                "staged": staged,
            });
            write_json_line(&payload)?;
        }
    }

    if staged == Some(false) {
        return Err(CliError::Runtime("upload staging failed".to_string()));
    }
    Ok(())
}

fn run_decode(cli: &Cli, args: &DecodeArgs) -> Result<(), CliError> {
    let key = match &args.key {
        Some(key) => key.clone(),
        None => Config::load(cli.config.as_deref())?.security.cipher_key,
    };
    let cipher = LineCipher::from_key(&key);
    let lines = read_log_file(&args.file, cipher.as_ref())?;

    let mode = output_mode(cli);
    let mut stdout = io::stdout().lock();
    for line in &lines {
        match mode {
            OutputMode::Human => writeln!(stdout, "{}", human_line(line))?,
            OutputMode::Json => {
                serde_json::to_writer(&mut stdout, &json_line(line))?;
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}

fn payload_text(payload: &Payload) -> String {
    match payload {
        Payload::Single(msg) => msg.clone(),
        Payload::Fields(fields) => fields.join(" | "),
    }
}

fn human_line(line: &StoredLine) -> String {
    match line {
        StoredLine::Parsed(p) => {
            let lock = if p.encrypted { " [enc]" } else { "" };
            format!(
                "{} {}{} {}",
                p.timestamp.to_rfc3339().dimmed(),
                p.tag.bold(),
                lock.cyan(),
                payload_text(&p.payload)
            )
        }
        StoredLine::Sealed(_) => format!("{}", "<encrypted line, key required>".yellow()),
        StoredLine::Unparseable { raw, reason } => {
            format!("{} {raw} ({reason})", "?".red())
        }
    }
}

fn json_line(line: &StoredLine) -> Value {
    match line {
        StoredLine::Parsed(p) => {
            let payload = match &p.payload {
                Payload::Single(msg) => json!(msg),
                Payload::Fields(fields) => json!(fields),
            };
            json!({
                "timestamp": p.timestamp.to_rfc3339(),
                "tag": p.tag,
                "encrypted": p.encrypted,
                "payload": payload,
            })
        }
        StoredLine::Sealed(raw) => json!({ "sealed": raw }),
        StoredLine::Unparseable { raw, reason } => json!({ "raw": raw, "error": reason }),
    }
}

fn run_stage(cli: &Cli, args: &StageArgs) -> Result<(), CliError> {
    let report = UploadStager::new(&args.dir).stage(&args.active)?;
    match output_mode(cli) {
        OutputMode::Human => {
            println!("Staged {} file(s):", report.staged.len());
            for path in &report.staged {
                println!("  {}", path.display());
            }
            println!("  Skipped: {}", report.skipped);
        }
        OutputMode::Json => {
            let staged: Vec<String> = report
                .staged
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            let payload = json!({
                "command": "stage",
                "staged": staged,
                "skipped": report.skipped,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli) -> Result<(), CliError> {
    let config = redacted(Config::load(cli.config.as_deref())?);
    match output_mode(cli) {
        OutputMode::Human => println!("{}", config.to_toml()?),
        OutputMode::Json => {
            let value = serde_json::to_value(&config)?;
            write_json_line(&json!({ "command": "config", "config": value }))?;
        }
    }
    Ok(())
}

/// Config safe to print: a configured cipher key is masked.
fn redacted(mut config: Config) -> Config {
    if !config.security.cipher_key.is_empty() {
        config.security.cipher_key = "<redacted>".to_string();
    }
    config
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DLOG_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
