//! The test-provider boundary.
//!
//! The engine never implements BDQ test logic; it hands a named-argument
//! map and an implementation handle to a [`TestProvider`] and gets an
//! [`Outcome`] back. Providers must tolerate concurrent invocation from
//! multiple workers.

use crate::error::ProviderError;
use async_trait::async_trait;
use bdq_protocol::{Outcome, OutcomeStatus, Proposal, ResultValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arguments for one provider invocation: data columns in their namespaced
/// form plus declared parameters, all as strings.
pub type NamedArgs = BTreeMap<String, String>;

/// Uniform invocation contract for the library of BDQ test routines.
#[async_trait]
pub trait TestProvider: Send + Sync {
    /// Run the test behind `handle` with the given arguments.
    ///
    /// Transport-level failures surface as [`ProviderError`]; test-level
    /// dispositions (including prerequisite failures) surface as outcomes.
    async fn invoke(&self, handle: &str, args: &NamedArgs) -> Result<Outcome, ProviderError>;
}

/// Outcome as emitted by an external provider process or service.
///
/// Adapters deserialize this and convert via [`WireOutcome::into_outcome`],
/// which maps any status string outside the known vocabulary to
/// `INTERNAL_PREREQUISITES_NOT_MET` with the original string preserved in
/// the comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireOutcome {
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub amendments: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl WireOutcome {
    pub fn into_outcome(self) -> Outcome {
        let comment = self.comment.unwrap_or_default();
        let status: OutcomeStatus = match self.status.parse() {
            Ok(status) => status,
            Err(_) => {
                return Outcome::internal_prerequisites_not_met(format!(
                    "provider returned unknown status '{}': {}",
                    self.status, comment
                ));
            }
        };

        let result = if let Some(amendments) = self.amendments {
            ResultValue::Proposals(
                amendments
                    .into_iter()
                    .map(|(column, value)| Proposal::new(column, value))
                    .collect(),
            )
        } else if let Some(result) = self.result {
            match result.parse() {
                Ok(label) => ResultValue::Label(label),
                // measures return free-form values
                Err(_) if !result.is_empty() => ResultValue::Value(result),
                Err(_) => ResultValue::Empty,
            }
        } else {
            ResultValue::Empty
        };

        Outcome::new(status, result, comment)
    }
}
