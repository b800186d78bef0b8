use std::time::Duration;

use crate::config::{RampMode, Stage};

/// Where the run stands inside its stage list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// One stage placed on the run clock.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: Duration,
    end: Duration,
    from: u64,
    to: u64,
}

impl Segment {
    fn len(&self) -> Duration {
        self.end - self.start
    }

    /// Target `offset` into the segment. Linear ramps truncate toward the
    /// starting target, so a ramp down sheds a VU only once it is fully due.
    fn target(&self, offset: Duration, mode: RampMode) -> u64 {
        if mode == RampMode::Step {
            return self.to;
        }
        let len = self.len().as_nanos();
        if len == 0 {
            return self.to;
        }
        let offset = offset.as_nanos().min(len);
        let (lo, hi) = (self.from.min(self.to), self.from.max(self.to));
        let moved = (u128::from(hi - lo) * offset / len) as u64;
        if self.to >= self.from {
            self.from + moved
        } else {
            self.from - moved
        }
    }
}

/// VU target as a piecewise function of elapsed run time.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start: u64,
    mode: RampMode,
    segments: Vec<Segment>,
}

impl RampSchedule {
    pub fn new(start: u64, stages: Vec<Stage>, mode: RampMode) -> Self {
        let mut clock = Duration::ZERO;
        let mut from = start;
        let segments = stages
            .iter()
            .map(|stage| {
                let seg = Segment {
                    start: clock,
                    end: clock.saturating_add(stage.duration),
                    from,
                    to: stage.target,
                };
                clock = seg.end;
                from = stage.target;
                seg
            })
            .collect();

        Self {
            start,
            mode,
            segments,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.segments.last().map_or(Duration::ZERO, |s| s.end)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// The segment running at `elapsed`: the first that ends after it, so
    /// zero-length stages apply their target at once.
    fn segment_at(&self, elapsed: Duration) -> Option<(usize, &Segment)> {
        let idx = self.segments.partition_point(|s| s.end <= elapsed);
        self.segments.get(idx).map(|s| (idx, s))
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        match self.segment_at(elapsed) {
            Some((_, seg)) => seg.target(elapsed.saturating_sub(seg.start), self.mode),
            None => self.segments.last().map_or(self.start, |s| s.to),
        }
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let last = self.segments.len().checked_sub(1)?;
        let (index, seg) = self
            .segment_at(elapsed)
            .or_else(|| self.segments.last().map(|s| (last, s)))?;

        let stage_elapsed = elapsed.saturating_sub(seg.start).min(seg.len());
        Some(StageSnapshot {
            index,
            count: self.segments.len(),
            stage_elapsed,
            stage_remaining: seg.len() - stage_elapsed,
            start_target: seg.from,
            end_target: seg.to,
            current_target: seg.target(stage_elapsed, self.mode),
        })
    }
}
