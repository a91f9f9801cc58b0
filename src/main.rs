#![deny(unsafe_code)]

//! dlog: command-line front end of the diaglog recorder.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    init_tracing(&args);
    if let Err(e) = cli_app::run(&args) {
        eprintln!("dlog: {e}");
        std::process::exit(e.exit_code());
    }
}

/// Diagnostics go to stderr; `DLOG_LOG` takes precedence over -v/-q.
fn init_tracing(args: &cli_app::Cli) {
    let fallback = args.default_log_level();
    let filter =
        EnvFilter::try_from_env("DLOG_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
