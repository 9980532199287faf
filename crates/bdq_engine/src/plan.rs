//! Test-plan construction.
//!
//! Intersects the registry with the dataset header, resolves parameters,
//! and fixes the total execution order: Validations, then Amendments, then
//! Issues, then Measures, each group in registry natural order. The plan is
//! also where record values become tuples - the normalized value sequences
//! that drive deduplication.

use crate::cache::TupleKey;
use crate::dataset::Dataset;
use crate::error::PlanError;
use crate::registry::{Registry, TestDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One applicable test, fully resolved against a concrete dataset.
#[derive(Debug, Clone)]
pub struct PlannedTest {
    pub descriptor: TestDescriptor,
    /// Declared (namespaced) column names, acted-upon first. These are the
    /// keys the provider sees.
    pub arg_names: Vec<String>,
    /// Header indices aligned with `arg_names`.
    pub columns: Vec<usize>,
    /// Resolved parameters: descriptor defaults overlaid with job-supplied
    /// overrides.
    pub parameters: BTreeMap<String, String>,
}

impl PlannedTest {
    /// The tuple a record yields for this test: values at the resolved
    /// columns, whitespace-trimmed, missing values as the empty string.
    pub fn tuple(&self, dataset: &Dataset, row: usize) -> Vec<String> {
        self.columns
            .iter()
            .map(|&col| dataset.value(row, col).trim().to_string())
            .collect()
    }

    /// Cache key for a tuple of this test.
    pub fn key_for(&self, tuple: &[String]) -> TupleKey {
        TupleKey::new(self.descriptor.cache_key(), tuple)
    }
}

/// The ordered sequence of planned tests for one job.
#[derive(Debug)]
pub struct TestPlan {
    pub tests: Vec<PlannedTest>,
}

impl TestPlan {
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Build the plan for a dataset.
///
/// `parameter_overrides` is the job-supplied name→value mapping; names that
/// match no applicable test's declared parameters produce a warning and are
/// ignored.
pub fn build_plan(
    registry: &Registry,
    dataset: &Dataset,
    parameter_overrides: &BTreeMap<String, String>,
) -> Result<(TestPlan, Vec<String>), PlanError> {
    let mut warnings = Vec::new();
    let mut tests = Vec::new();
    let mut known_parameters: BTreeSet<&str> = BTreeSet::new();

    for descriptor in registry.applicable(&dataset.header) {
        let arg_names: Vec<String> = descriptor.columns().map(str::to_string).collect();
        // applicable() guarantees resolution, but re-check rather than index
        // blindly so a registry/header mismatch cannot panic
        let columns: Option<Vec<usize>> = arg_names
            .iter()
            .map(|name| dataset.header.resolve(name))
            .collect();
        let Some(columns) = columns else {
            continue;
        };

        let mut parameters = BTreeMap::new();
        for parameter in &descriptor.parameters {
            known_parameters.insert(parameter.name.as_str());
            if let Some(default) = &parameter.default {
                parameters.insert(parameter.name.clone(), default.clone());
            }
        }
        for (name, value) in parameter_overrides {
            if descriptor.parameters.iter().any(|p| &p.name == name) {
                parameters.insert(name.clone(), value.clone());
            }
        }

        tests.push(PlannedTest {
            descriptor: descriptor.clone(),
            arg_names,
            columns,
            parameters,
        });
    }

    for name in parameter_overrides.keys() {
        if !known_parameters.contains(name.as_str()) {
            warnings.push(format!(
                "parameter override '{}' matches no applicable test; ignored",
                name
            ));
        }
    }

    // Stable sort: phase order between groups, registry natural order within
    tests.sort_by_key(|t| t.descriptor.test_type.phase());

    if tests.is_empty() {
        return Err(PlanError::NoApplicableTests);
    }

    debug!(planned = tests.len(), "test plan built");
    Ok((TestPlan { tests }, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::registry::Registry;
    use bdq_protocol::TestType;

    const REGISTRY: &str = "\
label,guid,type,information_element,acted_upon,consulted,parameters,implementation
MEASURE_EVENTDATE_DURATIONINSECONDS,,Measure,EVENT,dwc:eventDate,,,eventdate_duration
AMENDMENT_EVENTDATE_STANDARDIZED,,Amendment,EVENT,dwc:eventDate,,,eventdate_standardized
VALIDATION_COUNTRYCODE_STANDARD,,Validation,LOCATION,dwc:countryCode,,bdq:sourceAuthority=ISO 3166-1,countrycode_standard
VALIDATION_EVENTDATE_INRANGE,,Validation,EVENT,dwc:eventDate,,bdq:earliestValidDate=1582-11-15|bdq:latestValidDate=2030-12-31,eventdate_inrange
VALIDATION_DEPTH_INRANGE,,Validation,LOCATION,dwc:minimumDepthInMeters,dwc:maximumDepthInMeters,,depth_inrange
";

    fn fixture() -> (Registry, Dataset) {
        let registry = Registry::from_bytes(REGISTRY.as_bytes()).unwrap();
        let dataset = Dataset::parse(
            b"occurrenceID,countryCode,eventDate\no1, US ,1880-05-08\n",
            "d.csv",
        )
        .unwrap();
        (registry, dataset)
    }

    #[test]
    fn plan_orders_validations_before_amendments_before_measures() {
        let (registry, dataset) = fixture();
        let (plan, warnings) = build_plan(&registry, &dataset, &BTreeMap::new()).unwrap();
        assert!(warnings.is_empty());
        let types: Vec<TestType> = plan
            .tests
            .iter()
            .map(|t| t.descriptor.test_type)
            .collect();
        assert_eq!(
            types,
            vec![TestType::Validation, TestType::Validation, TestType::Amendment, TestType::Measure]
        );
        // registry natural order within the validation group
        assert_eq!(
            plan.tests[0].descriptor.label,
            "VALIDATION_COUNTRYCODE_STANDARD"
        );
        assert_eq!(plan.tests[1].descriptor.label, "VALIDATION_EVENTDATE_INRANGE");
    }

    #[test]
    fn unresolvable_columns_skip_the_descriptor() {
        let (registry, dataset) = fixture();
        let (plan, _) = build_plan(&registry, &dataset, &BTreeMap::new()).unwrap();
        assert!(plan
            .tests
            .iter()
            .all(|t| t.descriptor.label != "VALIDATION_DEPTH_INRANGE"));
    }

    #[test]
    fn tuples_are_trimmed() {
        let (registry, dataset) = fixture();
        let (plan, _) = build_plan(&registry, &dataset, &BTreeMap::new()).unwrap();
        let country = &plan.tests[0];
        assert_eq!(country.tuple(&dataset, 0), vec!["US".to_string()]);
    }

    #[test]
    fn defaults_and_overrides_overlay() {
        let (registry, dataset) = fixture();
        let mut overrides = BTreeMap::new();
        overrides.insert("bdq:earliestValidDate".to_string(), "1700-01-01".to_string());
        overrides.insert("bdq:noSuchParameter".to_string(), "x".to_string());
        let (plan, warnings) = build_plan(&registry, &dataset, &overrides).unwrap();

        let country = &plan.tests[0];
        assert_eq!(
            country.parameters.get("bdq:sourceAuthority").map(String::as_str),
            Some("ISO 3166-1")
        );
        let inrange = &plan.tests[1];
        assert_eq!(
            inrange.parameters.get("bdq:earliestValidDate").map(String::as_str),
            Some("1700-01-01")
        );
        assert_eq!(
            inrange.parameters.get("bdq:latestValidDate").map(String::as_str),
            Some("2030-12-31")
        );

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bdq:noSuchParameter"));
    }

    #[test]
    fn empty_plan_is_an_error() {
        let registry = Registry::from_bytes(
            "label,guid,type,information_element,acted_upon,consulted,parameters,implementation\n\
             VALIDATION_DEPTH_INRANGE,,Validation,LOCATION,dwc:minimumDepthInMeters,,,depth_inrange\n"
                .as_bytes(),
        )
        .unwrap();
        let dataset = Dataset::parse(b"occurrenceID,countryCode\no1,US\n", "d.csv").unwrap();
        assert!(matches!(
            build_plan(&registry, &dataset, &BTreeMap::new()),
            Err(PlanError::NoApplicableTests)
        ));
    }
}
