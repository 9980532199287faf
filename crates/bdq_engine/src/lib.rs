//! BDQ test-planning and execution engine.
//!
//! Given a parsed Darwin Core table and a registry of available tests, the
//! engine decides which tests apply, collapses rows into the minimum set of
//! distinct parameter tuples per test, dispatches those tuples to the test
//! provider with bounded parallelism and retry, maps results back to every
//! originating row, and derives the raw-results table, the amended dataset,
//! and a structured digest.
//!
//! Data flow:
//!
//! ```text
//! Dataset Reader -> Plan Builder -> Executor <-> Tuple Cache <-> Test Provider
//!                                       |
//!                                       v
//!                               Result Projector -> {raw results, amended dataset, digest}
//! ```
//!
//! The engine is stateless across jobs: the registry is loaded once by the
//! owning collaborator and handed in as an immutable value; plan, cache,
//! and artifacts live for one [`job::run_job`] call.
//!
//! # Modules
//!
//! - [`registry`]: test-descriptor table and applicability queries
//! - [`dataset`]: delimiter sniffing, header normalization, core-type detection
//! - [`plan`]: applicable-test resolution and tuple extraction
//! - [`cache`]: single-writer memoization of `(test, tuple)` outcomes
//! - [`executor`]: phase-barriered bounded-concurrency dispatch with retry
//! - [`project`]: back-projection into the output artifacts
//! - [`digest`]: the structured summary handed to the summarizer
//! - [`job`]: the `run_job` entry point
//! - [`provider`]: the invocation contract for the BDQ test library
//! - [`cancel`]: cooperative job cancellation

pub mod cache;
pub mod cancel;
pub mod dataset;
pub mod digest;
pub mod error;
pub mod executor;
pub mod job;
pub mod plan;
pub mod project;
pub mod provider;
pub mod registry;

pub use cache::{TupleCache, TupleKey};
pub use cancel::CancellationToken;
pub use dataset::{CoreType, Dataset, Header};
pub use digest::{Digest, TestDigest};
pub use error::{DatasetError, JobError, PlanError, ProviderError, RegistryError};
pub use executor::{default_concurrency, ExecutorConfig, RetryPolicy};
pub use job::{run_job, JobOutput, JobOverrides};
pub use plan::{build_plan, PlannedTest, TestPlan};
pub use project::{AmendedDataset, RawResults, RAW_RESULTS_COLUMNS};
pub use provider::{NamedArgs, TestProvider, WireOutcome};
pub use registry::{Registry, TestDescriptor, TestParameter};
