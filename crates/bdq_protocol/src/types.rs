//! Canonical enums and the Outcome value.
//!
//! Status and label strings on the wire are exactly the SCREAMING_SNAKE
//! forms defined by the BDQ vocabulary; `as_str` is the single source of
//! truth for each of them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Canonical Enums (used across all crates)
// ============================================================================

/// The four BDQ test classes.
///
/// The ordering of the variants is the plan-phase ordering: all Validations
/// run before any Amendment, then Issues, then Measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TestType {
    Validation,
    Amendment,
    Issue,
    Measure,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Validation => "Validation",
            TestType::Amendment => "Amendment",
            TestType::Issue => "Issue",
            TestType::Measure => "Measure",
        }
    }

    /// Scheduling phase: Validations before Amendments before Issues before
    /// Measures.
    pub fn phase(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TestType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "validation" => Ok(TestType::Validation),
            "amendment" => Ok(TestType::Amendment),
            "issue" => Ok(TestType::Issue),
            "measure" => Ok(TestType::Measure),
            _ => Err(TypeParseError::TestType(s.to_string())),
        }
    }
}

/// Outcome status as defined by the BDQ response vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    RunHasResult,
    Amended,
    NotAmended,
    FilledIn,
    ExternalPrerequisitesNotMet,
    InternalPrerequisitesNotMet,
    Ambiguous,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::RunHasResult => "RUN_HAS_RESULT",
            OutcomeStatus::Amended => "AMENDED",
            OutcomeStatus::NotAmended => "NOT_AMENDED",
            OutcomeStatus::FilledIn => "FILLED_IN",
            OutcomeStatus::ExternalPrerequisitesNotMet => "EXTERNAL_PREREQUISITES_NOT_MET",
            OutcomeStatus::InternalPrerequisitesNotMet => "INTERNAL_PREREQUISITES_NOT_MET",
            OutcomeStatus::Ambiguous => "AMBIGUOUS",
        }
    }

    /// Both prerequisite-not-met variants.
    pub fn is_prerequisites_not_met(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::ExternalPrerequisitesNotMet | OutcomeStatus::InternalPrerequisitesNotMet
        )
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RUN_HAS_RESULT" => Ok(OutcomeStatus::RunHasResult),
            "AMENDED" => Ok(OutcomeStatus::Amended),
            "NOT_AMENDED" => Ok(OutcomeStatus::NotAmended),
            "FILLED_IN" => Ok(OutcomeStatus::FilledIn),
            "EXTERNAL_PREREQUISITES_NOT_MET" => Ok(OutcomeStatus::ExternalPrerequisitesNotMet),
            "INTERNAL_PREREQUISITES_NOT_MET" => Ok(OutcomeStatus::InternalPrerequisitesNotMet),
            "AMBIGUOUS" => Ok(OutcomeStatus::Ambiguous),
            _ => Err(TypeParseError::Status(s.to_string())),
        }
    }
}

/// Pass/fail labels carried by Validation and Issue results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultLabel {
    Compliant,
    NotCompliant,
    PotentialIssue,
    NotIssue,
}

impl ResultLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultLabel::Compliant => "COMPLIANT",
            ResultLabel::NotCompliant => "NOT_COMPLIANT",
            ResultLabel::PotentialIssue => "POTENTIAL_ISSUE",
            ResultLabel::NotIssue => "NOT_ISSUE",
        }
    }
}

impl fmt::Display for ResultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResultLabel {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "COMPLIANT" => Ok(ResultLabel::Compliant),
            "NOT_COMPLIANT" => Ok(ResultLabel::NotCompliant),
            "POTENTIAL_ISSUE" => Ok(ResultLabel::PotentialIssue),
            "NOT_ISSUE" => Ok(ResultLabel::NotIssue),
            _ => Err(TypeParseError::Label(s.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("invalid test type: '{0}'. Expected: Validation, Amendment, Issue, or Measure")]
    TestType(String),
    #[error("invalid outcome status: '{0}'")]
    Status(String),
    #[error("invalid result label: '{0}'")]
    Label(String),
}

// ============================================================================
// Outcome
// ============================================================================

/// A single value an Amendment proposes for a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub column: String,
    pub value: String,
}

impl Proposal {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// The result slot of an Outcome: a pass/fail label, a list of proposed
/// values, or nothing (prerequisite-not-met and measure-less statuses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ResultValue {
    #[default]
    Empty,
    Label(ResultLabel),
    Proposals(Vec<Proposal>),
    /// Free-form value produced by Measures (e.g. a count).
    Value(String),
}

/// The immutable result of one test invocation on one tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub result: ResultValue,
    pub comment: String,
}

impl Outcome {
    pub fn new(status: OutcomeStatus, result: ResultValue, comment: impl Into<String>) -> Self {
        Self {
            status,
            result,
            comment: comment.into(),
        }
    }

    pub fn compliant(comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::RunHasResult,
            ResultValue::Label(ResultLabel::Compliant),
            comment,
        )
    }

    pub fn not_compliant(comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::RunHasResult,
            ResultValue::Label(ResultLabel::NotCompliant),
            comment,
        )
    }

    pub fn potential_issue(comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::RunHasResult,
            ResultValue::Label(ResultLabel::PotentialIssue),
            comment,
        )
    }

    pub fn not_issue(comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::RunHasResult,
            ResultValue::Label(ResultLabel::NotIssue),
            comment,
        )
    }

    pub fn amended(proposals: Vec<Proposal>, comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::Amended,
            ResultValue::Proposals(proposals),
            comment,
        )
    }

    pub fn filled_in(proposals: Vec<Proposal>, comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::FilledIn,
            ResultValue::Proposals(proposals),
            comment,
        )
    }

    pub fn not_amended(comment: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::NotAmended, ResultValue::Empty, comment)
    }

    pub fn measure(value: impl Into<String>, comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::RunHasResult,
            ResultValue::Value(value.into()),
            comment,
        )
    }

    pub fn external_prerequisites_not_met(comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::ExternalPrerequisitesNotMet,
            ResultValue::Empty,
            comment,
        )
    }

    pub fn internal_prerequisites_not_met(comment: impl Into<String>) -> Self {
        Self::new(
            OutcomeStatus::InternalPrerequisitesNotMet,
            ResultValue::Empty,
            comment,
        )
    }

    pub fn ambiguous(comment: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Ambiguous, ResultValue::Empty, comment)
    }

    /// The proposed (column, value) pairs, if this outcome carries any.
    pub fn proposals(&self) -> &[Proposal] {
        match &self.result {
            ResultValue::Proposals(pairs) => pairs,
            _ => &[],
        }
    }

    /// Whether this outcome is a pass for a test of the given type.
    ///
    /// Passing outcomes contribute no raw-results row:
    /// - Validation passes on RUN_HAS_RESULT + COMPLIANT
    /// - Amendment passes on NOT_AMENDED
    /// - Issue passes on RUN_HAS_RESULT + NOT_ISSUE
    /// - Measure never passes (every measure result is recorded)
    /// - prerequisite-not-met is never a pass
    pub fn is_pass(&self, test_type: TestType) -> bool {
        match test_type {
            TestType::Validation => {
                self.status == OutcomeStatus::RunHasResult
                    && self.result == ResultValue::Label(ResultLabel::Compliant)
            }
            TestType::Amendment => self.status == OutcomeStatus::NotAmended,
            TestType::Issue => {
                self.status == OutcomeStatus::RunHasResult
                    && self.result == ResultValue::Label(ResultLabel::NotIssue)
            }
            TestType::Measure => false,
        }
    }

    /// Canonical rendering of the result slot.
    ///
    /// Labels render as their vocabulary string; proposals render as
    /// `key=value` pairs sorted lexicographically by key and pipe-joined
    /// with no surrounding whitespace; everything else renders empty.
    pub fn render_result(&self) -> String {
        match &self.result {
            ResultValue::Empty => String::new(),
            ResultValue::Label(label) => label.as_str().to_string(),
            ResultValue::Value(value) => value.clone(),
            ResultValue::Proposals(pairs) => {
                let mut rendered: Vec<String> = pairs
                    .iter()
                    .map(|p| format!("{}={}", p.column, p.value))
                    .collect();
                rendered.sort();
                rendered.join("|")
            }
        }
    }
}

// ============================================================================
// Fatal error taxonomy
// ============================================================================

/// The fatal error kinds a job can surface to its caller.
///
/// Per-tuple failures never appear here; they degrade to outcomes and flow
/// into the output tables instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobErrorKind {
    NoAttachment,
    EmptyDataset,
    NoCoreColumn,
    MalformedRow,
    RegistryInvalid,
    NoApplicableTests,
    Cancelled,
    JobTimeoutExceeded,
    InternalBug,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::NoAttachment => "NO_ATTACHMENT",
            JobErrorKind::EmptyDataset => "EMPTY_DATASET",
            JobErrorKind::NoCoreColumn => "NO_CORE_COLUMN",
            JobErrorKind::MalformedRow => "MALFORMED_ROW",
            JobErrorKind::RegistryInvalid => "REGISTRY_INVALID",
            JobErrorKind::NoApplicableTests => "NO_APPLICABLE_TESTS",
            JobErrorKind::Cancelled => "CANCELLED",
            JobErrorKind::JobTimeoutExceeded => "JOB_TIMEOUT_EXCEEDED",
            JobErrorKind::InternalBug => "INTERNAL_BUG",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
