use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::{RampMode, RunOptions, SignedDuration, StageOptions, ThresholdSet};
use tracing::warn;

/// Run configuration as written in a YAML (or JSON) file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub scenario: Option<String>,

    #[serde(rename = "targetURL", alias = "targetUrl", default)]
    pub target_url: Option<String>,

    /// Pause between requests of one virtual user.
    #[serde(alias = "requestIntervalSeconds", default)]
    pub request_interval: Option<YamlDuration>,

    #[serde(default)]
    pub request_timeout: Option<YamlDuration>,

    #[serde(default)]
    pub connect_timeout: Option<YamlDuration>,

    #[serde(rename = "startVUs", default)]
    pub start_vus: Option<i64>,

    /// `linear` or `step`.
    #[serde(default)]
    pub ramp: Option<String>,

    #[serde(default)]
    pub graceful_ramp_down: Option<YamlDuration>,

    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,

    #[serde(default)]
    pub tick: Option<YamlDuration>,

    #[serde(default)]
    pub expected_statuses: Option<ExpectedStatusesYaml>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub stages: Vec<StageYaml>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,

    #[serde(default)]
    pub checks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ExpectedStatusesYaml {
    Code(u16),
    List(String),
}

/// A single expression, a list of them, or k6-style `{threshold: ...}` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Many(Vec<ThresholdItemYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdItemYaml {
    Expr(String),
    Object {
        threshold: String,
        #[serde(rename = "abortOnFail", default)]
        abort_on_fail: bool,
    },
}

/// Duration as a humantime string (`10s`), integer seconds or float seconds.
/// Negative values are kept and rejected later by validation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct YamlDuration(SignedDuration);

impl YamlDuration {
    fn into_inner(self) -> SignedDuration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(SignedDuration::positive(
                    std::time::Duration::from_secs(v),
                )))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let magnitude = std::time::Duration::from_secs(v.unsigned_abs());
                Ok(YamlDuration(if v < 0 {
                    SignedDuration::negative(magnitude)
                } else {
                    SignedDuration::positive(magnitude)
                }))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                SignedDuration::from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<SignedDuration>()
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl ConfigFile {
    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("failed to parse run config")
    }

    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub(crate) fn into_options(self) -> anyhow::Result<RunOptions> {
        let ramp = self
            .ramp
            .map(|raw| {
                raw.trim()
                    .to_ascii_lowercase()
                    .parse::<RampMode>()
                    .map_err(|_| anyhow::anyhow!("invalid ramp `{raw}` (expected linear or step)"))
            })
            .transpose()?;

        let expected_statuses = self.expected_statuses.map(|e| match e {
            ExpectedStatusesYaml::Code(code) => code.to_string(),
            ExpectedStatusesYaml::List(raw) => raw,
        });

        let thresholds = self
            .thresholds
            .into_iter()
            .map(|(metric, exprs)| {
                let expressions = match exprs {
                    ThresholdExprYaml::One(expr) => vec![expr],
                    ThresholdExprYaml::Many(items) => items
                        .into_iter()
                        .map(|item| match item {
                            ThresholdItemYaml::Expr(expr) => expr,
                            ThresholdItemYaml::Object {
                                threshold,
                                abort_on_fail,
                            } => {
                                if abort_on_fail {
                                    warn!(%metric, %threshold, "abortOnFail is not supported; ignoring");
                                }
                                threshold
                            }
                        })
                        .collect(),
                };
                ThresholdSet {
                    metric,
                    expressions,
                }
            })
            .collect();

        Ok(RunOptions {
            scenario: self.scenario,
            target_url: self.target_url,
            stages: self
                .stages
                .into_iter()
                .map(|s| StageOptions {
                    duration: s.duration.into_inner(),
                    target: s.target,
                })
                .collect(),
            start_vus: self.start_vus,
            ramp,
            graceful_ramp_down: self.graceful_ramp_down.map(YamlDuration::into_inner),
            graceful_stop: self.graceful_stop.map(YamlDuration::into_inner),
            request_interval: self.request_interval.map(YamlDuration::into_inner),
            request_timeout: self.request_timeout.map(YamlDuration::into_inner),
            connect_timeout: self.connect_timeout.map(YamlDuration::into_inner),
            tick: self.tick.map(YamlDuration::into_inner),
            expected_statuses,
            headers: self.headers.into_iter().collect(),
            thresholds,
            checks: self.checks.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options(raw: &str) -> RunOptions {
        ConfigFile::parse(raw)
            .and_then(ConfigFile::into_options)
            .unwrap_or_else(|e| panic!("{e:#}"))
    }

    #[test]
    fn parses_full_config() {
        let opts = options(
            r#"
scenario: breaking
targetURL: "http://{{ HOST }}/benchmarking/api"
requestIntervalSeconds: 0.5
requestTimeout: 10s
startVUs: 2
ramp: step
gracefulRampDown: 2s
gracefulStop: 3s
expectedStatuses: "200-299"
headers:
  accept: application/json
stages:
  - { duration: 10s, target: 100 }
  - { duration: 5, target: 0 }
thresholds:
  http_req_failed: "rate<0.01"
  http_req_duration: ["p(95)<500", "avg<200"]
checks:
  is status 200: "status == 200"
"#,
        );

        assert_eq!(opts.scenario.as_deref(), Some("breaking"));
        assert_eq!(
            opts.target_url.as_deref(),
            Some("http://{{ HOST }}/benchmarking/api")
        );
        assert_eq!(
            opts.request_interval,
            Some(SignedDuration::positive(Duration::from_millis(500)))
        );
        assert_eq!(opts.start_vus, Some(2));
        assert_eq!(opts.ramp, Some(RampMode::Step));
        assert_eq!(opts.expected_statuses.as_deref(), Some("200-299"));
        assert_eq!(
            opts.headers,
            vec![("accept".to_string(), "application/json".to_string())]
        );
        assert_eq!(
            opts.stages,
            vec![
                StageOptions {
                    duration: SignedDuration::positive(Duration::from_secs(10)),
                    target: 100,
                },
                StageOptions {
                    duration: SignedDuration::positive(Duration::from_secs(5)),
                    target: 0,
                },
            ]
        );
        assert_eq!(
            opts.thresholds,
            vec![
                ThresholdSet {
                    metric: "http_req_duration".to_string(),
                    expressions: vec!["p(95)<500".to_string(), "avg<200".to_string()],
                },
                ThresholdSet {
                    metric: "http_req_failed".to_string(),
                    expressions: vec!["rate<0.01".to_string()],
                },
            ]
        );
        assert_eq!(
            opts.checks,
            vec![("is status 200".to_string(), "status == 200".to_string())]
        );
    }

    #[test]
    fn keeps_negative_durations_for_validation() {
        let opts = options(
            r#"
stages:
  - { duration: -5s, target: 1 }
  - { duration: -2, target: 1 }
"#,
        );
        assert!(opts.stages.iter().all(|s| s.duration.is_negative()));
    }

    #[test]
    fn accepts_k6_threshold_objects() {
        let opts = options(
            r#"
thresholds:
  http_req_failed:
    - threshold: "rate<0.01"
      abortOnFail: true
    - "rate<0.5"
"#,
        );
        assert_eq!(
            opts.thresholds[0].expressions,
            vec!["rate<0.01".to_string(), "rate<0.5".to_string()]
        );
    }

    #[test]
    fn accepts_json() {
        let opts = options(
            r#"{"targetURL": "http://localhost/", "stages": [{"duration": "1s", "target": 3}], "expectedStatuses": 204}"#,
        );
        assert_eq!(opts.stages.len(), 1);
        assert_eq!(opts.expected_statuses.as_deref(), Some("204"));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_ramp() {
        assert!(ConfigFile::parse("vus: 10\n").is_err());
        let bad_ramp = ConfigFile::parse("ramp: sideways\n")
            .and_then(ConfigFile::into_options);
        assert!(bad_ramp.is_err());
    }

    #[test]
    fn empty_file_is_default() {
        let opts = options("");
        assert!(opts.stages.is_empty());
        assert!(opts.target_url.is_none());
    }
}
