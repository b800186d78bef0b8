use anyhow::Context as _;
use surge_core::{RunConfig, RunHooks, RunOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{RunArgs, ValidateArgs};
use crate::config_file::ConfigFile;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::{apply_overrides, merged_env};
use crate::summary_export;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let config = load_config(&args).await.map_err(RunError::invalid_input)?;
    let out = output::formatter(args.output, args.quiet);

    out.print_header(&config);

    let stop = CancellationToken::new();
    let interrupt = tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; stopping the run");
                stop.cancel();
            }
        }
    });

    let hooks = RunHooks {
        progress: out.progress(),
        stop: Some(stop),
    };
    let result = surge_core::run(config, hooks).await;
    interrupt.abort();

    let report = result
        .context("run failed")
        .map_err(RunError::runtime)?;

    out.print_summary(&report).map_err(RunError::runtime)?;

    if let Some(path) = &args.summary_export {
        summary_export::write(path, &report)
            .await
            .map_err(RunError::runtime)?;
        info!(path = %path.display(), "summary exported");
    }

    Ok(ExitCode::from_report(&report))
}

pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let env = merged_env(&args.env).map_err(RunError::invalid_input)?;
    let options = ConfigFile::load(&args.config)
        .await
        .and_then(ConfigFile::into_options)
        .map_err(RunError::invalid_input)?;
    let config = RunConfig::from_options(options, &env)
        .with_context(|| format!("invalid config: {}", args.config.display()))
        .map_err(RunError::invalid_input)?;

    println!(
        "ok: scenario={} target={} stages={} max_vus={} duration={} thresholds={} checks={}",
        config.scenario,
        config.target_url,
        config.stages.len(),
        config.max_vus(),
        humantime::format_duration(config.total_duration()),
        config.thresholds.len(),
        config.checks.len(),
    );

    Ok(ExitCode::Success)
}

/// Reads the config file (if any), layers CLI flags on top and validates.
async fn load_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let env = merged_env(&args.env)?;

    let mut options = match &args.config {
        Some(path) => ConfigFile::load(path).await?.into_options()?,
        None => RunOptions::default(),
    };
    apply_overrides(&mut options, args);

    RunConfig::from_options(options, &env).context("invalid run config")
}
