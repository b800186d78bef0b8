use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use surge_core::{RampMode, SignedDuration, StageOptions};

/// Durations keep a leading `-` so validation can reject it with a config error.
fn parse_duration(input: &str) -> Result<SignedDuration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m, 0.5)".to_string());
    }
    s.parse()
}

/// `DURATION:TARGET`, e.g. `30s:100`.
fn parse_stage(input: &str) -> Result<StageOptions, String> {
    let (duration, target) = input
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:100)"))?;
    let duration = parse_duration(duration)?;
    let target = target
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid stage target in '{input}' (expected an integer)"))?;
    Ok(StageOptions { duration, target })
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (k, v) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{input}'"))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty key in '{input}'"));
    }
    Ok((k.to_string(), v.trim().to_string()))
}

fn parse_ramp(input: &str) -> Result<RampMode, String> {
    input
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| format!("invalid ramp '{input}' (expected linear or step)"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bars on stderr and a human-readable summary on stdout.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Staged HTTP load driver",
    long_about = "surge drives a staged virtual-user ramp against one HTTP endpoint.\n\nEach virtual user repeatedly sends a GET to the target URL. The number of virtual users follows the configured stages; thresholds decide whether the run passed.\n\n`{{ NAME }}` placeholders in the target URL are filled from the environment; use `--env KEY=VALUE` to add/override values.",
    after_help = "Examples:\n  surge run bench.yaml\n  surge run --url http://localhost:8080/hello --stage 10s:50 --stage 10s:0\n  surge run bench.yaml --threshold 'http_req_duration=p(95)<500' --output json\n  surge run bench.yaml --env HOST=127.0.0.1:8080 --summary-export summary.json\n  surge validate bench.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    #[command(
        long_about = "Run the configured stages against the target URL.\n\nCLI flags override values from the config file; --stage and --threshold replace the file's lists when given."
    )]
    Run(RunArgs),

    /// Parse and validate a config file without sending requests
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a run config (.yaml/.yml/.json)
    pub config: Option<PathBuf>,

    /// Target URL (overrides `targetURL`)
    #[arg(long)]
    pub url: Option<String>,

    /// Stage as DURATION:TARGET (repeatable; replaces the file's stages)
    #[arg(
        long = "stage",
        value_name = "DURATION:TARGET",
        value_parser = parse_stage,
        allow_hyphen_values = true
    )]
    pub stages: Vec<StageOptions>,

    /// Virtual users at the start of the first stage
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    pub start_vus: Option<i64>,

    /// How the target moves inside a stage
    #[arg(long, value_parser = parse_ramp)]
    pub ramp: Option<RampMode>,

    /// Pause between requests of one virtual user (seconds or e.g. 500ms)
    #[arg(long, value_parser = parse_duration, allow_hyphen_values = true)]
    pub interval: Option<SignedDuration>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration, allow_hyphen_values = true)]
    pub timeout: Option<SignedDuration>,

    /// Grace for virtual users retired by a falling target
    #[arg(long, value_parser = parse_duration, allow_hyphen_values = true)]
    pub graceful_ramp_down: Option<SignedDuration>,

    /// Grace for virtual users still running after the last stage
    #[arg(long, value_parser = parse_duration, allow_hyphen_values = true)]
    pub graceful_stop: Option<SignedDuration>,

    /// Threshold as METRIC=EXPR (repeatable; replaces the file's thresholds)
    #[arg(long = "threshold", value_name = "METRIC=EXPR", value_parser = parse_key_value)]
    pub thresholds: Vec<(String, String)>,

    /// Check as NAME=EXPR (repeatable; overrides a file check of the same name)
    #[arg(long = "check", value_name = "NAME=EXPR", value_parser = parse_key_value)]
    pub checks: Vec<(String, String)>,

    /// Scheduler/progress period
    #[arg(long, value_parser = parse_duration, allow_hyphen_values = true)]
    pub tick: Option<SignedDuration>,

    /// Add/override env vars used for placeholders (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write a k6-style JSON summary to this path
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,

    /// Hide progress output
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to a run config (.yaml/.yml/.json)
    pub config: PathBuf,

    /// Add/override env vars used for placeholders (repeatable, KEY=VALUE)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_stage_accepts_duration_and_target() {
        assert_eq!(
            parse_stage("30s:100"),
            Ok(StageOptions {
                duration: SignedDuration::positive(Duration::from_secs(30)),
                target: 100,
            })
        );
        assert_eq!(
            parse_stage("1m30s:0").map(|s| s.duration),
            Ok(SignedDuration::positive(Duration::from_secs(90)))
        );
    }

    #[test]
    fn parse_stage_keeps_negative_values_for_validation() {
        let stage = parse_stage("-5s:10").unwrap_or_else(|e| panic!("{e}"));
        assert!(stage.duration.is_negative());

        let stage = parse_stage("5s:-1").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(stage.target, -1);
    }

    #[test]
    fn parse_stage_rejects_malformed_values() {
        assert!(parse_stage("30s").is_err());
        assert!(parse_stage("30x:10").is_err());
        assert!(parse_stage("30s:ten").is_err());
    }

    #[test]
    fn parse_key_value_splits_on_first_equals() {
        assert_eq!(
            parse_key_value("http_req_duration=p(95)<=500"),
            Ok(("http_req_duration".to_string(), "p(95)<=500".to_string()))
        );
        assert!(parse_key_value("=rate<0.01").is_err());
        assert!(parse_key_value("no-equals").is_err());
    }

    #[test]
    fn cli_parses_run_flags() {
        let parsed = Cli::try_parse_from([
            "surge",
            "run",
            "bench.yaml",
            "--url",
            "http://localhost:8080/hello",
            "--stage",
            "10s:50",
            "--stage",
            "-5s:0",
            "--interval",
            "0.5",
            "--threshold",
            "http_req_failed=rate<0.01",
            "--check",
            "ok=status == 200",
            "--env",
            "HOST=localhost",
            "--output",
            "json",
            "--ramp",
            "step",
            "-q",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("bench.yaml")));
                assert_eq!(args.url.as_deref(), Some("http://localhost:8080/hello"));
                assert_eq!(args.stages.len(), 2);
                assert!(args.stages[1].duration.is_negative());
                assert_eq!(
                    args.interval,
                    Some(SignedDuration::positive(Duration::from_millis(500)))
                );
                assert_eq!(
                    args.thresholds,
                    vec![("http_req_failed".to_string(), "rate<0.01".to_string())]
                );
                assert_eq!(args.checks[0].1, "status == 200");
                assert_eq!(args.env, vec!["HOST=localhost".to_string()]);
                assert!(matches!(args.output, OutputFormat::Json));
                assert_eq!(args.ramp, Some(RampMode::Step));
                assert!(args.quiet);
            }
            Command::Validate(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_run_without_config() {
        let cli = Cli::try_parse_from(["surge", "run", "--url", "http://x/"])
            .unwrap_or_else(|e| panic!("{e}"));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, None);
                assert!(args.stages.is_empty());
                assert!(matches!(args.output, OutputFormat::HumanReadable));
            }
            Command::Validate(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["surge", "run", "--graceful-stop", "10x"]).is_err());
    }
}
