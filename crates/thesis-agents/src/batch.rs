use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thesis_models::config::{FailurePolicy, RuntimeConfig};
use thesis_models::work::{WorkResult, WorkUnit};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{error, info, warn};

use crate::error::AgentError;
use crate::executor::UnitExecutor;

/// What a batch task hands back: unit index, outcome and time spent.
type Settled = (usize, Result<String, String>, Duration);

/// Executes batches of work units concurrently.
///
/// Results come back in submission order regardless of completion order.
/// A unit that errors, panics or exceeds `unit_timeout` is handled according
/// to the failure policy: `Capture` records it in the unit's slot, `FailFast`
/// aborts the batch.
pub struct BatchRunner {
    executor: Arc<dyn UnitExecutor>,
    policy: FailurePolicy,
    unit_timeout: Duration,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(executor: Arc<dyn UnitExecutor>) -> Self {
        Self {
            executor,
            policy: FailurePolicy::default(),
            unit_timeout: Duration::from_secs(300),
            limiter: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_runtime(
        executor: Arc<dyn UnitExecutor>,
        runtime: &RuntimeConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(executor)
            .with_policy(runtime.failure_policy)
            .with_unit_timeout(Duration::from_secs(runtime.unit_timeout_seconds))
            .with_max_concurrency(runtime.max_concurrency)
            .with_cancellation(cancel)
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Cap units in flight. 0 removes the cap.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.limiter = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every unit and return one result per unit, in submission order.
    pub async fn run_batch(&self, units: Vec<WorkUnit>) -> Result<Vec<WorkResult>, AgentError> {
        if units.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let total = units.len();
        info!(units = total, policy = %self.policy, "Dispatching batch");

        let units: Vec<Arc<WorkUnit>> = units.into_iter().map(Arc::new).collect();
        let mut join_set = JoinSet::new();
        let mut indices: HashMap<Id, usize> = HashMap::with_capacity(total);

        for (index, unit) in units.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let limiter = self.limiter.clone();
            let unit = Arc::clone(unit);
            let timeout = self.unit_timeout;

            let handle = join_set.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let unit_start = Instant::now();
                let outcome = execute_with_timeout(executor, unit, timeout).await;
                (index, outcome, unit_start.elapsed())
            });
            indices.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<WorkResult>> = vec![None; total];
        let mut failures = 0usize;

        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    join_set.abort_all();
                    warn!(units = total, "Batch cancelled");
                    return Err(AgentError::Cancelled);
                }
                next = join_set.join_next_with_id() => next,
            };

            let Some(joined) = joined else { break };
            let Some((index, outcome, elapsed)) = settle(joined, &indices, start) else {
                join_set.abort_all();
                error!(units = total, "Untracked batch task failed, aborting batch");
                return Err(AgentError::Cancelled);
            };

            let unit = &units[index];
            let elapsed_ms = elapsed.as_millis() as u64;
            match outcome {
                Ok(raw) => {
                    info!(index, agent = %unit.role(), elapsed_ms, "Unit completed");
                    slots[index] = Some(WorkResult::completed(unit, raw, elapsed_ms));
                }
                Err(message) => match self.policy {
                    FailurePolicy::FailFast => {
                        join_set.abort_all();
                        error!(index, agent = %unit.role(), error = %message, "Unit failed, aborting batch");
                        return Err(AgentError::UnitFailed {
                            index,
                            role: unit.role().to_string(),
                            message,
                        });
                    }
                    FailurePolicy::Capture => {
                        failures += 1;
                        warn!(index, agent = %unit.role(), error = %message, elapsed_ms, "Unit failed");
                        slots[index] = Some(WorkResult::failed(unit, message, elapsed_ms));
                    }
                },
            }
        }

        let results: Vec<WorkResult> = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(AgentError::Cancelled)?;

        info!(
            units = total,
            failures,
            elapsed_ms = start.elapsed().as_millis(),
            "Batch complete"
        );
        Ok(results)
    }
}

/// Resolve a joined batch task to its unit index. A task that died outside
/// the unit wrapper fails its own slot with the join error.
fn settle(
    joined: Result<(Id, Settled), JoinError>,
    indices: &HashMap<Id, usize>,
    since: Instant,
) -> Option<Settled> {
    match joined {
        Ok((_, settled)) => Some(settled),
        Err(e) => {
            let index = *indices.get(&e.id())?;
            error!(index, error = %e, "Batch task failed");
            Some((index, Err(format!("Unit task failed: {e}")), since.elapsed()))
        }
    }
}

/// Run one unit in its own task so a panic is reported as a failure, and
/// abort it once the timeout elapses.
async fn execute_with_timeout(
    executor: Arc<dyn UnitExecutor>,
    unit: Arc<WorkUnit>,
    timeout: Duration,
) -> Result<String, String> {
    let task = AbortOnDropHandle::new(tokio::spawn(async move { executor.execute(&unit).await }));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(raw))) => Ok(raw),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(e)) => Err(format!("Unit task panicked: {e}")),
        Err(_) => Err(AgentError::Timeout(timeout.as_secs()).to_string()),
    }
}
