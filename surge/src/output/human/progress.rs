use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const REDRAW_HZ: u8 = 5;

/// Run-length bar on stderr, measured in elapsed milliseconds.
///
/// Hidden until [`HumanProgress::start`]; updates before that are dropped.
pub(crate) struct HumanProgress {
    bar: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub(crate) fn start(&self, scenario: &str, total: Duration) {
        self.bar.set_style(bar_style());
        self.bar.set_prefix(scenario.to_string());
        self.bar.set_length(millis(total));
        self.bar
            .set_draw_target(ProgressDrawTarget::stderr_with_hz(REDRAW_HZ));
    }

    pub(crate) fn update(&self, elapsed: Duration, message: String) {
        let len = self.bar.length().unwrap_or(0);
        self.bar.set_position(millis(elapsed).min(len));
        self.bar.set_message(message);
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {elapsed_precise} [{bar:24.green/white}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_clamped_to_run_length() {
        let p = HumanProgress::new();
        p.start("default", Duration::from_secs(2));
        p.update(Duration::from_secs(5), "draining".to_string());
        assert_eq!(p.bar.position(), 2_000);
        p.finish();
        assert!(p.bar.is_finished());
    }
}
