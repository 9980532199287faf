//! Job orchestration: the engine's single entry point.
//!
//! `run_job` wires the pipeline together: parse the dataset, build the
//! plan, execute distinct tuples against the provider under the job
//! timeout, then project. Fatal errors skip projection entirely; there are
//! no partial artifacts.

use crate::cache::TupleCache;
use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::digest::Digest;
use crate::error::JobError;
use crate::executor::{self, DistinctTuples, ExecutorConfig, RetryPolicy};
use crate::plan::{self, TestPlan};
use crate::project::{self, AmendedDataset, RawResults};
use crate::provider::TestProvider;
use crate::registry::Registry;
use bdq_protocol::{defaults, JobErrorKind};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Caller-supplied knobs for one job. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    /// Worker-pool size; defaults to min(8, max(2, logical CPUs)).
    pub concurrency: Option<usize>,
    pub per_tuple_timeout_seconds: Option<u64>,
    pub job_timeout_seconds: Option<u64>,
    /// Test-parameter overrides applied during plan build.
    pub parameters: BTreeMap<String, String>,
    /// External cancellation handle; the job creates its own when absent.
    pub cancellation: Option<CancellationToken>,
}

impl JobOverrides {
    /// Parse overrides from a JSON object (the form adapters hand over).
    /// Unknown keys and malformed values produce warnings and are ignored;
    /// the cancellation handle cannot come from JSON and stays `None`.
    pub fn from_json_map(map: &serde_json::Map<String, Value>) -> (Self, Vec<String>) {
        let mut overrides = JobOverrides::default();
        let mut warnings = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                "concurrency" => match value.as_u64() {
                    Some(n) if n > 0 => overrides.concurrency = Some(n as usize),
                    _ => warnings.push(format!(
                        "override 'concurrency' must be a positive integer, got {value}; ignored"
                    )),
                },
                "per_tuple_timeout_seconds" => match value.as_u64() {
                    Some(n) if n > 0 => overrides.per_tuple_timeout_seconds = Some(n),
                    _ => warnings.push(format!(
                        "override 'per_tuple_timeout_seconds' must be a positive integer, got {value}; ignored"
                    )),
                },
                "job_timeout_seconds" => match value.as_u64() {
                    Some(n) if n > 0 => overrides.job_timeout_seconds = Some(n),
                    _ => warnings.push(format!(
                        "override 'job_timeout_seconds' must be a positive integer, got {value}; ignored"
                    )),
                },
                "parameters" => match value.as_object() {
                    Some(parameters) => {
                        for (name, parameter) in parameters {
                            match parameter.as_str() {
                                Some(v) => {
                                    overrides
                                        .parameters
                                        .insert(name.clone(), v.to_string());
                                }
                                None => warnings.push(format!(
                                    "parameter '{name}' must be a string; ignored"
                                )),
                            }
                        }
                    }
                    None => warnings
                        .push("override 'parameters' must be an object; ignored".to_string()),
                },
                other => {
                    warnings.push(format!("unknown override '{other}' ignored"));
                }
            }
        }

        (overrides, warnings)
    }
}

/// Everything a successful job emits, atomically at job end.
#[derive(Debug)]
pub struct JobOutput {
    pub raw_results: RawResults,
    pub amended_dataset: AmendedDataset,
    pub digest: Digest,
    pub warnings: Vec<String>,
}

/// Run one assessment job over an attachment.
///
/// The registry is built once by the owning collaborator and shared across
/// jobs; everything else is job-scoped. On any fatal error no artifacts are
/// produced.
pub async fn run_job(
    input_bytes: &[u8],
    filename: &str,
    registry: &Registry,
    provider: Arc<dyn TestProvider>,
    overrides: JobOverrides,
) -> Result<JobOutput, JobError> {
    let mut warnings = Vec::new();

    let dataset = Dataset::parse(input_bytes, filename)?;
    warnings.extend(dataset.warnings.iter().cloned());

    let duplicate_ids = dataset.row_count() - dataset.distinct_record_ids();
    if duplicate_ids > 0 {
        warnings.push(format!(
            "{} row(s) share a record identifier with an earlier row",
            duplicate_ids
        ));
    }

    let (test_plan, plan_warnings) = plan::build_plan(registry, &dataset, &overrides.parameters)?;
    warnings.extend(plan_warnings);
    info!(
        filename,
        rows = dataset.row_count(),
        core_type = %dataset.core_type,
        planned_tests = test_plan.len(),
        "job planned"
    );

    let cancel = overrides.cancellation.clone().unwrap_or_default();
    let config = ExecutorConfig {
        concurrency: overrides
            .concurrency
            .unwrap_or_else(executor::default_concurrency)
            .max(1),
        per_tuple_timeout: Duration::from_secs(
            overrides
                .per_tuple_timeout_seconds
                .unwrap_or(defaults::DEFAULT_PER_TUPLE_TIMEOUT_SECS),
        ),
        retry: RetryPolicy::default(),
        cancel: cancel.clone(),
    };
    let job_timeout = Duration::from_secs(
        overrides
            .job_timeout_seconds
            .unwrap_or(defaults::DEFAULT_JOB_TIMEOUT_SECS),
    );

    let plan_arc = Arc::new(test_plan);
    let cache = Arc::new(TupleCache::new());
    let distinct = executor::collect_distinct_tuples(&plan_arc, &dataset);

    run_executor(
        plan_arc.clone(),
        &distinct,
        provider,
        cache.clone(),
        &config,
        job_timeout,
        &cancel,
    )
    .await?;

    let projection = project::project(&dataset, &plan_arc, &cache, &distinct)?;
    warnings.extend(projection.warnings);
    if !projection.digest.skipped_tests.is_empty() {
        warn!(
            skipped = projection.digest.skipped_tests.len(),
            "some tests were skipped entirely due to prerequisite failures"
        );
    }

    info!(
        raw_rows = projection.raw_results.rows.len(),
        provider_computations = cache.computed(),
        "job complete"
    );

    Ok(JobOutput {
        raw_results: projection.raw_results,
        amended_dataset: projection.amended_dataset,
        digest: projection.digest,
        warnings,
    })
}

async fn run_executor(
    plan: Arc<TestPlan>,
    distinct: &DistinctTuples,
    provider: Arc<dyn TestProvider>,
    cache: Arc<TupleCache>,
    config: &ExecutorConfig,
    job_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), JobError> {
    let execution = executor::execute(plan, distinct, provider, cache, config);
    match tokio::time::timeout(job_timeout, execution).await {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            Err(JobError::new(
                JobErrorKind::JobTimeoutExceeded,
                format!("job exceeded its {} s budget", job_timeout.as_secs()),
            ))
        }
    }
}
