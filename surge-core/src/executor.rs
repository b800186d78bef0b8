use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use surge_http::{GetRequest, HttpClient, HttpTransportErrorKind, PrepareError};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::aggregator::{Aggregator, OutcomeError, RequestOutcome};
use crate::config::RunConfig;

/// Cooperative stop request for one executor, carrying its grace period.
#[derive(Debug, Default)]
pub struct RetireSignal {
    token: CancellationToken,
    grace: OnceLock<Duration>,
}

impl RetireSignal {
    /// The first grace period wins; later calls only re-cancel.
    pub fn retire(&self, grace: Duration) {
        let _ = self.grace.set(grace);
        self.token.cancel();
    }

    pub fn is_retired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the grace period of a retired executor has run out.
    async fn grace_elapsed(&self) {
        self.token.cancelled().await;
        let grace = self.grace.get().copied().unwrap_or(Duration::ZERO);
        tokio::time::sleep(grace).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorExit {
    /// Left between iterations.
    Retired,
    /// An in-flight request was abandoned.
    Interrupted,
}

/// One running virtual user.
#[derive(Debug)]
pub struct ExecutorHandle {
    pub id: u64,
    retire: Arc<RetireSignal>,
    pub(crate) join: JoinHandle<ExecutorExit>,
}

impl ExecutorHandle {
    pub fn retire(&self, grace: Duration) {
        self.retire.retire(grace);
    }

    pub fn is_retired(&self) -> bool {
        self.retire.is_retired()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn abort(&self) {
        self.join.abort();
    }

    pub async fn join(self) -> Result<ExecutorExit, JoinError> {
        self.join.await
    }

    #[cfg(test)]
    pub(crate) fn from_task(id: u64, join: JoinHandle<ExecutorExit>) -> Self {
        Self {
            id,
            retire: Arc::default(),
            join,
        }
    }
}

/// State shared by every executor of a run.
#[derive(Debug)]
pub(crate) struct ExecutorContext {
    pub(crate) config: Arc<RunConfig>,
    pub(crate) client: HttpClient,
    pub(crate) aggregator: Arc<Aggregator>,
    pub(crate) hard_stop: CancellationToken,
    request: GetRequest,
}

impl ExecutorContext {
    pub(crate) fn new(
        config: Arc<RunConfig>,
        client: HttpClient,
        aggregator: Arc<Aggregator>,
        hard_stop: CancellationToken,
    ) -> Result<Self, PrepareError> {
        let request = GetRequest::new(&config.target_url, &config.headers)?
            .with_timeout(config.request_timeout);

        Ok(Self {
            config,
            client,
            aggregator,
            hard_stop,
            request,
        })
    }

    /// Bytes a request put on the wire before it failed or was cut off.
    fn bytes_sent_before(&self, error: OutcomeError) -> u64 {
        match error {
            OutcomeError::Abandoned
            | OutcomeError::Transport(HttpTransportErrorKind::Timeout)
            | OutcomeError::Transport(HttpTransportErrorKind::Body) => self.request.wire_bytes(),
            OutcomeError::Transport(_) => 0,
        }
    }

    fn record(&self, outcome: RequestOutcome) {
        for (index, check) in self.config.checks.iter().enumerate() {
            self.aggregator.record_check(index, check.evaluate(&outcome));
        }
        self.aggregator.record_outcome(outcome);
    }
}

pub(crate) fn spawn_executor(id: u64, ctx: Arc<ExecutorContext>) -> ExecutorHandle {
    let retire = Arc::new(RetireSignal::default());
    let join = tokio::spawn(run_executor(id, ctx, retire.clone()));
    ExecutorHandle { id, retire, join }
}

async fn run_executor(id: u64, ctx: Arc<ExecutorContext>, retire: Arc<RetireSignal>) -> ExecutorExit {
    let _active = ctx.aggregator.enter_vu();
    debug!(vu = id, "executor started");

    loop {
        if retire.is_retired() || ctx.hard_stop.is_cancelled() {
            debug!(vu = id, "executor retired");
            return ExecutorExit::Retired;
        }

        let timestamp = SystemTime::now();
        let started = Instant::now();
        let exchange = ctx.client.send(&ctx.request);

        let result = tokio::select! {
            res = exchange => Some(res),
            () = retire.grace_elapsed() => None,
            () = ctx.hard_stop.cancelled() => None,
        };
        let latency = started.elapsed();

        let Some(result) = result else {
            debug!(vu = id, ?latency, "in-flight request abandoned");
            ctx.record(RequestOutcome {
                timestamp,
                latency,
                status: None,
                failed: true,
                error: Some(OutcomeError::Abandoned),
                bytes_sent: ctx.bytes_sent_before(OutcomeError::Abandoned),
                bytes_received: 0,
            });
            ctx.aggregator.record_interrupted_iteration();
            return ExecutorExit::Interrupted;
        };

        let outcome = match result {
            Ok(res) => RequestOutcome {
                timestamp,
                latency,
                status: Some(res.status),
                failed: !ctx.config.expected_statuses.contains(res.status),
                error: None,
                bytes_sent: res.bytes_sent,
                bytes_received: res.bytes_received,
            },
            Err(err) => {
                trace!(vu = id, error = %err, "request failed");
                let error = OutcomeError::Transport(err.transport_error_kind());
                RequestOutcome {
                    timestamp,
                    latency,
                    status: None,
                    failed: true,
                    error: Some(error),
                    bytes_sent: ctx.bytes_sent_before(error),
                    bytes_received: 0,
                }
            }
        };
        ctx.record(outcome);
        ctx.aggregator.record_iteration(started.elapsed());

        let interval = ctx.config.request_interval;
        if !interval.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = retire.token.cancelled() => {}
                () = ctx.hard_stop.cancelled() => {}
            }
        }
    }
}
