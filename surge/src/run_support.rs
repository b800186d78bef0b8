use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context as _;
use surge_core::{EnvVars, RunOptions, ThresholdSet};

use crate::cli::RunArgs;

pub(crate) fn merged_env(overrides: &[String]) -> anyhow::Result<EnvVars> {
    let mut map: BTreeMap<String, String> = std::env::vars().collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    let vars: Vec<(Arc<str>, Arc<str>)> = map
        .into_iter()
        .map(|(k, v)| (Arc::<str>::from(k), Arc::<str>::from(v)))
        .collect();

    Ok(Arc::from(vars.into_boxed_slice()))
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

/// Layers CLI flags over options read from a config file.
pub(crate) fn apply_overrides(opts: &mut RunOptions, args: &RunArgs) {
    if let Some(url) = &args.url {
        opts.target_url = Some(url.clone());
    }
    if !args.stages.is_empty() {
        opts.stages = args.stages.clone();
    }
    if args.start_vus.is_some() {
        opts.start_vus = args.start_vus;
    }
    if args.ramp.is_some() {
        opts.ramp = args.ramp;
    }
    if args.interval.is_some() {
        opts.request_interval = args.interval;
    }
    if args.timeout.is_some() {
        opts.request_timeout = args.timeout;
    }
    if args.graceful_ramp_down.is_some() {
        opts.graceful_ramp_down = args.graceful_ramp_down;
    }
    if args.graceful_stop.is_some() {
        opts.graceful_stop = args.graceful_stop;
    }
    if args.tick.is_some() {
        opts.tick = args.tick;
    }
    if !args.thresholds.is_empty() {
        opts.thresholds = group_thresholds(&args.thresholds);
    }
    for (name, expr) in &args.checks {
        match opts.checks.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = expr.clone(),
            None => opts.checks.push((name.clone(), expr.clone())),
        }
    }
}

/// Groups `METRIC=EXPR` pairs by metric, keeping first-seen order.
fn group_thresholds(pairs: &[(String, String)]) -> Vec<ThresholdSet> {
    let mut sets: Vec<ThresholdSet> = Vec::new();
    for (metric, expr) in pairs {
        match sets.iter_mut().find(|s| &s.metric == metric) {
            Some(set) => set.expressions.push(expr.clone()),
            None => sets.push(ThresholdSet {
                metric: metric.clone(),
                expressions: vec![expr.clone()],
            }),
        }
    }
    sets
}
