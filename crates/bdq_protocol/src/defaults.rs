//! Canonical default values shared across the engine and adapters.

/// Upper bound on the executor worker pool.
pub const CONCURRENCY_CEILING: usize = 8;
/// Lower bound on the executor worker pool.
pub const CONCURRENCY_FLOOR: usize = 2;

/// Wall-clock budget for a single provider invocation.
pub const DEFAULT_PER_TUPLE_TIMEOUT_SECS: u64 = 30;
/// Wall-clock budget for a whole job.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 900;

/// Additional attempts after the first failed provider call.
pub const RETRY_BUDGET: u32 = 3;
/// First retry backoff.
pub const BACKOFF_BASE_MS: u64 = 1_000;
/// Backoff ceiling; doubling stops here.
pub const BACKOFF_CAP_MS: u64 = 8_000;

/// How many most-common non-pass values the digest reports per test.
pub const TOP_VALUES_PER_TEST: usize = 5;

pub const CANCELLED_BY_CALLER_MESSAGE: &str = "Cancelled by caller";
