use std::sync::Arc;

mod progress;
mod summary;
mod units;

use progress::HumanProgress;
use summary::render;
use units::{format_bytes, format_duration_single, format_rate};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Option<Arc<HumanProgress>>,
}

impl HumanReadableOutput {
    pub(crate) fn new(show_progress: bool) -> Self {
        Self {
            progress: show_progress.then(|| Arc::new(HumanProgress::new())),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, config: &surge_core::RunConfig) {
        if let Some(progress) = &self.progress {
            progress.start(&config.scenario, config.total_duration());
        }
        println!("scenario: {}", config.scenario);
        println!("target: {}", config.target_url);
        println!(
            "stages: {} ramp={} max_vus={} duration={} graceful_ramp_down={} graceful_stop={}",
            config.stages.len(),
            config.ramp,
            config.max_vus(),
            format_duration_single(config.total_duration()),
            format_duration_single(config.graceful_ramp_down),
            format_duration_single(config.graceful_stop),
        );
        for t in &config.thresholds {
            println!("threshold: {} {}", t.metric, t.expression);
        }
        println!();
    }

    fn progress(&self) -> Option<surge_core::ProgressFn> {
        let progress = self.progress.clone()?;

        Some(Arc::new(move |u| {
            let m = &u.metrics;
            let errors_now: u64 = m.errors_now.values().sum();
            let throughput_per_sec = m
                .bytes_received_per_sec_now
                .saturating_add(m.bytes_sent_per_sec_now);

            let mut message = match &u.stage {
                Some(stage) => format!(
                    "stage={}/{} target={} live={} draining={} elapsed={} stage_remaining={}",
                    stage.stage,
                    stage.stages,
                    u.target,
                    u.live,
                    u.draining,
                    format_duration_single(u.elapsed),
                    format_duration_single(stage.stage_remaining),
                ),
                None => format!(
                    "target={} live={} draining={} elapsed={}",
                    u.target,
                    u.live,
                    u.draining,
                    format_duration_single(u.elapsed),
                ),
            };

            message.push_str(&format!(
                " iters/s={} rps={} tps={}/s errors={errors_now}/{}",
                format_rate(m.iterations_per_sec_now),
                format_rate(m.rps_now),
                format_bytes(throughput_per_sec),
                m.failed_requests_total,
            ));
            if !m.thresholds_failing.is_empty() {
                message.push_str(&format!(" thresholds_failing={}", m.thresholds_failing.len()));
            }

            progress.update(u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &surge_core::RunReport) -> anyhow::Result<()> {
        if let Some(progress) = &self.progress {
            progress.finish();
        }
        print!("{}", render(report));

        let failed: Vec<_> = report.thresholds.iter().filter(|t| !t.passed).collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match t.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    None => eprintln!("  {}: {} (no data)", t.metric, t.expression),
                }
            }
        }

        Ok(())
    }
}
