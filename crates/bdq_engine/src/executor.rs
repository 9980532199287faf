//! Bounded-concurrency dispatch of distinct tuples to the test provider.
//!
//! Distinct-tuple discovery and scheduling are single-threaded and
//! deterministic; only the provider invocations run concurrently. The work
//! queue is phase-barriered: every Validation completes before the first
//! Amendment dispatches, then Issues, then Measures.

use crate::cache::TupleCache;
use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::error::JobError;
use crate::plan::{PlannedTest, TestPlan};
use crate::provider::{NamedArgs, TestProvider};
use bdq_protocol::defaults;
use bdq_protocol::{Outcome, OutcomeStatus, TestType};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub budget: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: defaults::RETRY_BUDGET,
            base: Duration::from_millis(defaults::BACKOFF_BASE_MS),
            cap: Duration::from_millis(defaults::BACKOFF_CAP_MS),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retry `n` (1-based): the capped exponential delay plus
    /// full jitter on top, so consecutive attempts are always at least the
    /// nominal delay apart.
    pub fn backoff_before(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let nominal = self
            .base
            .saturating_mul(1u32 << shift)
            .min(self.cap);
        let jitter_ms = if nominal.as_millis() == 0 {
            0
        } else {
            use rand::Rng;
            rand::thread_rng().gen_range(0..=nominal.as_millis() as u64)
        };
        nominal + Duration::from_millis(jitter_ms)
    }
}

/// Executor configuration, resolved from job overrides.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub concurrency: usize,
    pub per_tuple_timeout: Duration,
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

/// Worker-pool size when the caller does not override it.
pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(defaults::CONCURRENCY_FLOOR);
    cpus.clamp(defaults::CONCURRENCY_FLOOR, defaults::CONCURRENCY_CEILING)
}

/// Per-test distinct tuples in first-seen row order, aligned with the plan.
#[derive(Debug)]
pub struct DistinctTuples {
    pub per_test: Vec<Vec<Vec<String>>>,
}

impl DistinctTuples {
    pub fn total(&self) -> usize {
        self.per_test.iter().map(Vec::len).sum()
    }
}

/// Single pass over the records per planned test, collapsing identical
/// tuples. Insertion order is first-seen row order.
pub fn collect_distinct_tuples(plan: &TestPlan, dataset: &Dataset) -> DistinctTuples {
    let mut per_test = Vec::with_capacity(plan.len());
    for planned in &plan.tests {
        let mut seen = HashSet::new();
        let mut tuples = Vec::new();
        for row in 0..dataset.row_count() {
            let tuple = planned.tuple(dataset, row);
            let key = planned.key_for(&tuple);
            if seen.insert(key.tuple_hash) {
                tuples.push(tuple);
            }
        }
        debug!(
            test = %planned.descriptor.label,
            distinct = tuples.len(),
            rows = dataset.row_count(),
            "collected distinct tuples"
        );
        per_test.push(tuples);
    }
    DistinctTuples { per_test }
}

#[derive(Debug)]
struct WorkItem {
    plan_idx: usize,
    tuple: Vec<String>,
}

/// Populate the cache with an outcome for every (planned test, distinct
/// tuple) pair.
pub async fn execute(
    plan: Arc<TestPlan>,
    distinct: &DistinctTuples,
    provider: Arc<dyn TestProvider>,
    cache: Arc<TupleCache>,
    config: &ExecutorConfig,
) -> Result<(), JobError> {
    for phase in [
        TestType::Validation,
        TestType::Amendment,
        TestType::Issue,
        TestType::Measure,
    ] {
        if config.cancel.is_cancelled() {
            break;
        }
        let items: Vec<WorkItem> = plan
            .tests
            .iter()
            .enumerate()
            .filter(|(_, t)| t.descriptor.test_type == phase)
            .flat_map(|(plan_idx, _)| {
                distinct.per_test[plan_idx]
                    .iter()
                    .map(move |tuple| WorkItem {
                        plan_idx,
                        tuple: tuple.clone(),
                    })
            })
            .collect();
        if items.is_empty() {
            continue;
        }
        info!(phase = %phase, work_items = items.len(), "dispatching phase");
        run_phase(plan.clone(), items, provider.clone(), cache.clone(), config).await?;
    }

    if config.cancel.is_cancelled() {
        return Err(JobError::cancelled());
    }
    Ok(())
}

async fn run_phase(
    plan: Arc<TestPlan>,
    items: Vec<WorkItem>,
    provider: Arc<dyn TestProvider>,
    cache: Arc<TupleCache>,
    config: &ExecutorConfig,
) -> Result<(), JobError> {
    let workers = config.concurrency.max(1).min(items.len());
    let (tx, rx) = mpsc::channel::<WorkItem>(items.len());
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = rx.clone();
        let plan = plan.clone();
        let provider = provider.clone();
        let cache = cache.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let item = { rx.lock().await.recv().await };
                let Some(item) = item else { break };
                // On cancellation the queue is drained without dispatching
                if config.cancel.is_cancelled() {
                    continue;
                }
                let planned = &plan.tests[item.plan_idx];
                let key = planned.key_for(&item.tuple);
                cache
                    .get_or_compute(key, || {
                        invoke_with_retry(provider.as_ref(), planned, &item.tuple, &config)
                    })
                    .await;
            }
        }));
    }

    for item in items {
        if tx.send(item).await.is_err() {
            break;
        }
    }
    drop(tx);

    for handle in handles {
        handle
            .await
            .map_err(|err| JobError::internal_bug(format!("executor worker panicked: {err}")))?;
    }
    Ok(())
}

/// One work item: invoke the provider with timeout and retry, folding every
/// failure mode into an outcome so the queue never aborts.
async fn invoke_with_retry(
    provider: &dyn TestProvider,
    planned: &PlannedTest,
    tuple: &[String],
    config: &ExecutorConfig,
) -> Outcome {
    let mut args = NamedArgs::new();
    for (name, value) in &planned.parameters {
        args.insert(name.clone(), value.clone());
    }
    // data columns shadow a parameter of the same name
    for (name, value) in planned.arg_names.iter().zip(tuple) {
        args.insert(name.clone(), value.clone());
    }

    let label = planned.descriptor.label.as_str();
    let mut last_external: Option<Outcome> = None;
    let mut completed_attempts: u32 = 0;

    loop {
        if config.cancel.is_cancelled() {
            return Outcome::internal_prerequisites_not_met(defaults::CANCELLED_BY_CALLER_MESSAGE);
        }

        let call = provider.invoke(&planned.descriptor.handle, &args);
        let call_result = tokio::select! {
            _ = config.cancel.cancelled() => {
                return Outcome::internal_prerequisites_not_met(
                    defaults::CANCELLED_BY_CALLER_MESSAGE,
                );
            }
            result = tokio::time::timeout(config.per_tuple_timeout, call) => result,
        };

        let transient_reason = match call_result {
            Ok(Ok(outcome)) => {
                if outcome.status == OutcomeStatus::ExternalPrerequisitesNotMet {
                    // transient signal; the outcome itself stands if it
                    // persists through the whole budget
                    let reason = format!("external prerequisites not met: {}", outcome.comment);
                    last_external = Some(outcome);
                    reason
                } else {
                    return outcome;
                }
            }
            Ok(Err(err)) if err.is_transient() => err.to_string(),
            Ok(Err(err)) => {
                return Outcome::internal_prerequisites_not_met(format!(
                    "test '{}' failed: {}",
                    label, err
                ));
            }
            Err(_) => format!(
                "provider call exceeded {} ms",
                config.per_tuple_timeout.as_millis()
            ),
        };

        completed_attempts += 1;
        if completed_attempts > config.retry.budget {
            if let Some(external) = last_external {
                return external;
            }
            return Outcome::internal_prerequisites_not_met(format!(
                "test '{}' failed after {} attempts: {}",
                label, completed_attempts, transient_reason
            ));
        }

        let backoff = config.retry.backoff_before(completed_attempts);
        debug!(
            test = label,
            attempt = completed_attempts,
            backoff_ms = backoff.as_millis() as u64,
            reason = %transient_reason,
            "retrying provider call"
        );
        tokio::select! {
            _ = config.cancel.cancelled() => {
                return Outcome::internal_prerequisites_not_met(
                    defaults::CANCELLED_BY_CALLER_MESSAGE,
                );
            }
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
