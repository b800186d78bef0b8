use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::{ExecutorContext, ExecutorExit, ExecutorHandle, spawn_executor};
use crate::progress::{ProgressFn, ProgressTracker, ProgressUpdate, StageProgress};
use crate::report::ExecutorStats;
use crate::schedule::RampSchedule;

/// How long hard-stopped executors get to record their abandoned request
/// before they are aborted.
const HARD_STOP_WINDOW: Duration = Duration::from_millis(500);

/// Keeps the number of live executors equal to the schedule's target.
pub(crate) struct Scheduler {
    schedule: RampSchedule,
    ctx: Arc<ExecutorContext>,
    /// Spawn order; the newest executors are retired first.
    live: Vec<ExecutorHandle>,
    draining: Vec<ExecutorHandle>,
    next_id: u64,
    stats: ExecutorStats,
}

impl Scheduler {
    pub(crate) fn new(ctx: Arc<ExecutorContext>) -> Self {
        Self {
            schedule: ctx.config.schedule(),
            ctx,
            live: Vec::new(),
            draining: Vec::new(),
            next_id: 1,
            stats: ExecutorStats::default(),
        }
    }

    pub(crate) fn live(&self) -> u64 {
        self.live.len() as u64
    }

    pub(crate) fn draining(&self) -> u64 {
        self.draining.len() as u64
    }

    /// Runs every stage, then drains. Returns once no executor is left.
    pub(crate) async fn run(
        mut self,
        started: Instant,
        progress: Option<ProgressFn>,
        stop: CancellationToken,
    ) -> Result<ExecutorStats> {
        let config = self.ctx.config.clone();
        let total = self.schedule.total_duration();
        let ends_at = tokio::time::Instant::from_std(started) + total;

        let mut interval = tokio::time::interval(config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tracker = ProgressTracker::new(started);
        let mut tick_id: u64 = 0;

        info!(
            scenario = %config.scenario,
            stages = config.stages.len(),
            duration = ?total,
            max_vus = config.max_vus(),
            "run started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = tokio::time::sleep_until(ends_at) => {
                    info!("stages complete");
                    break;
                }
                () = stop.cancelled() => {
                    info!("stop requested");
                    break;
                }
            }

            let elapsed = started.elapsed();
            if self.schedule.is_done(elapsed) {
                info!("stages complete");
                break;
            }

            self.reap().await?;
            let target = self.schedule.target_at(elapsed);
            self.reconcile(target);

            if let Some(progress) = &progress {
                tick_id = tick_id.saturating_add(1);
                let (metrics, dt) = tracker.sample(
                    &self.ctx.aggregator,
                    &config.thresholds,
                    elapsed,
                    Instant::now(),
                );
                progress(ProgressUpdate {
                    tick: tick_id,
                    elapsed,
                    interval: dt,
                    scenario: config.scenario.clone(),
                    total_duration: total,
                    target,
                    live: self.live(),
                    draining: self.draining(),
                    stage: self
                        .schedule
                        .stage_snapshot_at(elapsed)
                        .map(StageProgress::from),
                    metrics,
                });
            }
        }

        self.drain(config.graceful_stop).await?;
        Ok(self.stats)
    }

    /// Spawns or retires executors until exactly `target` are live.
    pub(crate) fn reconcile(&mut self, target: u64) {
        let live = self.live();

        if live < target {
            for _ in live..target {
                let id = self.next_id;
                self.next_id = self.next_id.saturating_add(1);
                self.live.push(spawn_executor(id, self.ctx.clone()));
                self.stats.spawned = self.stats.spawned.saturating_add(1);
            }
            debug!(from = live, to = target, "spawned executors");
        } else if live > target {
            let grace = self.ctx.config.graceful_ramp_down;
            for _ in target..live {
                let Some(handle) = self.live.pop() else {
                    break;
                };
                handle.retire(grace);
                self.stats.retired = self.stats.retired.saturating_add(1);
                self.draining.push(handle);
            }
            debug!(from = live, to = target, ?grace, "retired executors");
        }

        let running = self.live().saturating_add(self.draining());
        self.stats.peak = self.stats.peak.max(running);
    }

    /// Collects executors that have already exited.
    async fn reap(&mut self) -> Result<()> {
        let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.live)
            .into_iter()
            .partition(ExecutorHandle::is_finished);
        self.live = live;

        let (drained, draining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.draining)
            .into_iter()
            .partition(ExecutorHandle::is_finished);
        self.draining = draining;

        for handle in done.into_iter().chain(drained) {
            let exit = handle.join().await;
            self.account(exit)?;
        }
        Ok(())
    }

    fn account(&mut self, exit: std::result::Result<ExecutorExit, JoinError>) -> Result<()> {
        match exit {
            Ok(ExecutorExit::Retired) => {}
            Ok(ExecutorExit::Interrupted) => {
                self.stats.interrupted = self.stats.interrupted.saturating_add(1);
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Retires everything with `graceful_stop`, then hard-stops what is left.
    async fn drain(&mut self, graceful_stop: Duration) -> Result<()> {
        for handle in self.live.drain(..) {
            handle.retire(graceful_stop);
            self.stats.retired = self.stats.retired.saturating_add(1);
            self.draining.push(handle);
        }

        info!(
            executors = self.draining.len(),
            grace = ?graceful_stop,
            "draining executors"
        );

        // Handles are still polled past the deadline; only those running then are forced.
        let deadline = tokio::time::Instant::now() + graceful_stop;
        let mut remaining = Vec::new();
        for mut handle in std::mem::take(&mut self.draining) {
            match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(exit) => self.account(exit)?,
                Err(_) => remaining.push(handle),
            }
        }

        if remaining.is_empty() {
            return Ok(());
        }

        warn!(
            executors = remaining.len(),
            grace = ?graceful_stop,
            "graceful stop elapsed; abandoning in-flight requests"
        );
        self.ctx.hard_stop.cancel();
        self.stats.forced_stops = self.stats.forced_stops.saturating_add(remaining.len() as u64);

        let deadline = tokio::time::Instant::now() + HARD_STOP_WINDOW;
        for mut handle in remaining {
            match tokio::time::timeout_at(deadline, &mut handle.join).await {
                Ok(exit) => self.account(exit)?,
                Err(_) => {
                    warn!(vu = handle.id, "executor did not stop; aborting");
                    handle.abort();
                    let exit = handle.join().await;
                    self.account(exit)?;
                }
            }
        }

        Ok(())
    }
}
