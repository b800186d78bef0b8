mod cli;
mod config_file;
mod exit_codes;
mod output;
mod run;
mod run_error;
mod run_support;
mod summary_export;

use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::exit_codes::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LOG_ENV: &str = "SURGE_LOG";

/// Logs go to stderr so stdout stays parseable with `--output json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(ExitCode::for_parse_error(&err).as_i32());
    });

    init_tracing();

    let result = match cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Validate(args) => run::validate(args).await,
    };

    let code = result.unwrap_or_else(|err| {
        eprintln!("error: {err}");
        err.exit_code()
    });
    std::process::exit(code.as_i32());
}
