//! Error types for the assessment engine.
//!
//! Component errors are small thiserror enums; everything fatal converges on
//! [`JobError`], the structured value `run_job` hands back to its caller.
//! Per-tuple failures never become errors here - they degrade to outcomes
//! and flow into the output tables.

use bdq_protocol::JobErrorKind;
use std::collections::BTreeMap;
use thiserror::Error;

/// Registry load/lookup errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registry source: {0}")]
    Invalid(String),

    #[error("unknown test: {0}")]
    NotFound(String),
}

/// Dataset reader errors. All of these are fatal to the job.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no attachment bytes to read")]
    NoAttachment,

    #[error("dataset has a header but zero data rows")]
    EmptyDataset,

    #[error("header contains neither occurrenceID nor taxonID")]
    NoCoreColumn,

    #[error("row {row} is malformed: {detail}")]
    MalformedRow { row: usize, detail: String },
}

/// Plan construction errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no registry test applies to the dataset columns")]
    NoApplicableTests,
}

/// Failures signalled by a test provider, split by retryability.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// Connection failures, I/O errors, timeouts. Retried with backoff.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Malformed responses, unknown tests. Never retried.
    #[error("permanent provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// The structured fatal error a job surfaces to its caller.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Invariant violations. Reaching this is a bug in the engine, not in
    /// the input.
    pub fn internal_bug(message: impl Into<String>) -> Self {
        Self::new(JobErrorKind::InternalBug, message)
    }

    pub fn cancelled() -> Self {
        Self::new(
            JobErrorKind::Cancelled,
            bdq_protocol::defaults::CANCELLED_BY_CALLER_MESSAGE,
        )
    }
}

impl From<DatasetError> for JobError {
    fn from(err: DatasetError) -> Self {
        let kind = match &err {
            DatasetError::NoAttachment => JobErrorKind::NoAttachment,
            DatasetError::EmptyDataset => JobErrorKind::EmptyDataset,
            DatasetError::NoCoreColumn => JobErrorKind::NoCoreColumn,
            DatasetError::MalformedRow { .. } => JobErrorKind::MalformedRow,
        };
        let mut job = JobError::new(kind, err.to_string());
        if let DatasetError::MalformedRow { row, .. } = err {
            job = job.with_context("row", row.to_string());
        }
        job
    }
}

impl From<RegistryError> for JobError {
    fn from(err: RegistryError) -> Self {
        JobError::new(JobErrorKind::RegistryInvalid, err.to_string())
    }
}

impl From<PlanError> for JobError {
    fn from(err: PlanError) -> Self {
        JobError::new(JobErrorKind::NoApplicableTests, err.to_string())
    }
}
