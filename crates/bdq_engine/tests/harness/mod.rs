//! Shared test harness: a scripted in-process test provider plus registry
//! and dataset fixtures.

// not every test binary uses every fixture
#![allow(dead_code)]

use async_trait::async_trait;
use bdq_engine::error::ProviderError;
use bdq_engine::provider::{NamedArgs, TestProvider};
use bdq_protocol::Outcome;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

type Handler = Box<dyn Fn(&NamedArgs) -> Result<Outcome, ProviderError> + Send + Sync>;

/// In-process provider whose behaviour per implementation handle is
/// scripted by the test. Records every invocation.
#[derive(Default)]
pub struct ScriptedProvider {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, NamedArgs)>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every invocation (to widen race windows).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on(
        mut self,
        handle: &str,
        handler: impl Fn(&NamedArgs) -> Result<Outcome, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(handle.to_string(), Box::new(handler));
        self
    }

    pub fn calls(&self) -> Vec<(String, NamedArgs)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, handle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == handle)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TestProvider for ScriptedProvider {
    async fn invoke(&self, handle: &str, args: &NamedArgs) -> Result<Outcome, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((handle.to_string(), args.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.handlers.get(handle) {
            Some(handler) => handler(args),
            None => Err(ProviderError::Permanent(format!("unknown test: {handle}"))),
        }
    }
}

/// Registry with one country-code Validation.
pub const COUNTRY_REGISTRY: &str = "\
label,guid,type,information_element,acted_upon,consulted,parameters,implementation
VALIDATION_COUNTRYCODE_STANDARD,urn:uuid:0493bcfb,Validation,LOCATION,dwc:countryCode,,,countrycode_standard
";

/// Registry with one event-date Amendment.
pub const EVENTDATE_REGISTRY: &str = "\
label,guid,type,information_element,acted_upon,consulted,parameters,implementation
AMENDMENT_EVENTDATE_STANDARDIZED,urn:uuid:718dfc3c,Amendment,EVENT,dwc:eventDate,,,eventdate_standardized
";

/// A compliant/not-compliant country-code handler over ISO-looking codes.
pub fn country_code_handler(args: &NamedArgs) -> Result<Outcome, ProviderError> {
    let code = args.get("dwc:countryCode").map(String::as_str).unwrap_or("");
    if matches!(code, "US" | "GB" | "NO" | "FR") {
        Ok(Outcome::compliant("valid ISO 3166-1-alpha-2 code"))
    } else {
        Ok(Outcome::not_compliant(format!(
            "'{code}' is not a valid ISO 3166-1-alpha-2 code"
        )))
    }
}
