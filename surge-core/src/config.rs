use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use surge_http::PrepareError;

use crate::aggregator::builtin_metric_kind;
use crate::checks::{Check, ExpectedStatuses};
use crate::error::ConfigError;
use crate::schedule::RampSchedule;
use crate::thresholds::{Threshold, ThresholdSet, compile_thresholds};

pub type EnvVars = Arc<[(Arc<str>, Arc<str>)]>;

pub const DEFAULT_SCENARIO: &str = "default";
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// How the target moves inside a stage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum RampMode {
    /// Interpolate from the previous target to the stage target.
    #[default]
    Linear,
    /// Jump to the stage target when the stage starts.
    Step,
}

/// A duration that remembers a leading minus sign, so `-5s` survives parsing
/// and can be rejected with a useful message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignedDuration {
    negative: bool,
    magnitude: Duration,
}

impl SignedDuration {
    pub const ZERO: Self = Self {
        negative: false,
        magnitude: Duration::ZERO,
    };

    #[must_use]
    pub fn positive(magnitude: Duration) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    #[must_use]
    pub fn negative(magnitude: Duration) -> Self {
        Self {
            negative: true,
            magnitude,
        }
    }

    pub fn from_secs_f64(secs: f64) -> Result<Self, String> {
        if !secs.is_finite() {
            return Err(format!("invalid duration: {secs}"));
        }
        let magnitude = Duration::try_from_secs_f64(secs.abs()).map_err(|e| e.to_string())?;
        Ok(Self {
            negative: secs.is_sign_negative(),
            magnitude,
        })
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.negative && !self.magnitude.is_zero()
    }

    /// The duration, or `None` when negative.
    #[must_use]
    pub fn to_duration(self) -> Option<Duration> {
        (!self.is_negative()).then_some(self.magnitude)
    }
}

impl From<Duration> for SignedDuration {
    fn from(value: Duration) -> Self {
        Self::positive(value)
    }
}

impl fmt::Display for SignedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        write!(f, "{}", humantime::format_duration(self.magnitude))
    }
}

impl FromStr for SignedDuration {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Err("empty duration".to_string());
        }

        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        // Bare numbers are seconds.
        if let Ok(secs) = rest.parse::<f64>() {
            let mut d = Self::from_secs_f64(secs)?;
            d.negative = negative;
            return Ok(d);
        }

        let magnitude = humantime::parse_duration(rest)
            .map_err(|e| format!("invalid duration `{raw}`: {e}"))?;
        Ok(Self {
            negative,
            magnitude,
        })
    }
}

/// One stage as written by the user; validated into a [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOptions {
    pub duration: SignedDuration,
    pub target: i64,
}

/// Unvalidated run configuration, as read from a config file and CLI flags.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scenario: Option<String>,
    pub target_url: Option<String>,
    pub stages: Vec<StageOptions>,
    pub start_vus: Option<i64>,
    pub ramp: Option<RampMode>,
    pub graceful_ramp_down: Option<SignedDuration>,
    pub graceful_stop: Option<SignedDuration>,
    pub request_interval: Option<SignedDuration>,
    pub request_timeout: Option<SignedDuration>,
    pub connect_timeout: Option<SignedDuration>,
    pub tick: Option<SignedDuration>,
    pub expected_statuses: Option<String>,
    pub headers: Vec<(String, String)>,
    pub thresholds: Vec<ThresholdSet>,
    /// `(name, expression)` pairs.
    pub checks: Vec<(String, String)>,
}

/// Validated, immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub scenario: String,
    pub target_url: String,
    pub stages: Vec<Stage>,
    pub start_vus: u64,
    pub ramp: RampMode,
    pub graceful_ramp_down: Duration,
    pub graceful_stop: Duration,
    pub thresholds: Vec<Threshold>,
    pub checks: Vec<Check>,
    pub expected_statuses: ExpectedStatuses,
    pub request_interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub headers: Vec<(String, String)>,
    /// Scheduler reconcile period.
    pub tick: Duration,
}

impl RunConfig {
    /// Validates `opts`, expanding `{{ NAME }}` placeholders in the target URL from `env`.
    pub fn from_options(opts: RunOptions, env: &EnvVars) -> Result<Self, ConfigError> {
        if opts.stages.is_empty() {
            return Err(ConfigError::EmptyStages);
        }

        let mut stages = Vec::with_capacity(opts.stages.len());
        for (index, s) in opts.stages.iter().enumerate() {
            let duration =
                s.duration
                    .to_duration()
                    .ok_or_else(|| ConfigError::NegativeStageDuration {
                        index,
                        raw: s.duration.to_string(),
                    })?;
            let target = u64::try_from(s.target).map_err(|_| ConfigError::NegativeStageTarget {
                index,
                target: s.target,
            })?;
            stages.push(Stage { duration, target });
        }

        let start_vus = match opts.start_vus {
            Some(v) => u64::try_from(v).map_err(|_| ConfigError::NegativeStartVus(v))?,
            None => 0,
        };

        let raw_url = opts.target_url.ok_or(ConfigError::MissingTargetUrl)?;
        let target_url = expand_placeholders(&raw_url, env)?;
        surge_http::GetRequest::new(&target_url, &opts.headers).map_err(|e| match e {
            PrepareError::InvalidHeader { name, reason } => ConfigError::InvalidHeader { name, reason },
            other => ConfigError::InvalidTargetUrl {
                url: target_url.clone(),
                reason: other.to_string(),
            },
        })?;

        let graceful_ramp_down = non_negative(
            "gracefulRampDown",
            opts.graceful_ramp_down,
            DEFAULT_GRACEFUL_RAMP_DOWN,
        )?;
        let graceful_stop = non_negative("gracefulStop", opts.graceful_stop, DEFAULT_GRACEFUL_STOP)?;
        let request_interval =
            non_negative("requestIntervalSeconds", opts.request_interval, Duration::ZERO)?;
        let request_timeout =
            positive("requestTimeout", opts.request_timeout, DEFAULT_REQUEST_TIMEOUT)?;
        let connect_timeout =
            positive("connectTimeout", opts.connect_timeout, DEFAULT_CONNECT_TIMEOUT)?;
        let tick = positive("tick", opts.tick, DEFAULT_TICK)?;

        let expected_statuses = match opts.expected_statuses.as_deref() {
            Some(raw) => raw.parse::<ExpectedStatuses>().map_err(|reason| {
                ConfigError::InvalidExpectedStatuses {
                    raw: raw.to_string(),
                    reason,
                }
            })?,
            None => ExpectedStatuses::default(),
        };

        let checks = opts
            .checks
            .iter()
            .map(|(name, expr)| {
                Check::parse(name, expr).map_err(|reason| ConfigError::InvalidCheck {
                    name: name.clone(),
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let thresholds = compile_thresholds(&opts.thresholds, builtin_metric_kind)?;

        Ok(Self {
            scenario: opts
                .scenario
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCENARIO.to_string()),
            target_url,
            stages,
            start_vus,
            ramp: opts.ramp.unwrap_or_default(),
            graceful_ramp_down,
            graceful_stop,
            thresholds,
            checks,
            expected_statuses,
            request_interval,
            request_timeout,
            connect_timeout,
            headers: opts.headers,
            tick,
        })
    }

    #[must_use]
    pub fn schedule(&self) -> RampSchedule {
        RampSchedule::new(self.start_vus, self.stages.clone(), self.ramp)
    }

    /// Highest target the schedule ever asks for.
    #[must_use]
    pub fn max_vus(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start_vus)
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }
}

fn non_negative(
    field: &'static str,
    value: Option<SignedDuration>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(v) => v.to_duration().ok_or_else(|| ConfigError::NegativeDuration {
            field,
            raw: v.to_string(),
        }),
        None => Ok(default),
    }
}

fn positive(
    field: &'static str,
    value: Option<SignedDuration>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let d = non_negative(field, value, default)?;
    if d.is_zero() {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(d)
}

/// Replaces every `{{ NAME }}` in `raw` with the value of `NAME` from `env`.
pub fn expand_placeholders(raw: &str, env: &EnvVars) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| ConfigError::InvalidTargetUrl {
                url: raw.to_string(),
                reason: "unterminated `{{` placeholder".to_string(),
            })?;

        let name = after[..close].trim();
        let value = env
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_ref())
            .ok_or_else(|| ConfigError::UnresolvedPlaceholder(name.to_string()))?;
        out.push_str(value);

        rest = &after[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}
