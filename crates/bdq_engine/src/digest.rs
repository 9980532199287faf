//! Structured job summary.
//!
//! The digest is what the natural-language summarizer downstream consumes:
//! totals, per-test counters, per-information-element aggregates, tests
//! lost entirely to prerequisite failures, and the most frequent offending
//! values per test. Counters are row-weighted - they count (row, test)
//! outcomes after back-projection - while distinct tuple counts are
//! reported separately.

use crate::cache::TupleCache;
use crate::dataset::Dataset;
use crate::executor::DistinctTuples;
use crate::plan::TestPlan;
use bdq_protocol::defaults::TOP_VALUES_PER_TEST;
use bdq_protocol::{Outcome, OutcomeStatus, ResultLabel, ResultValue, TestType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Row-weighted outcome counters for one test.
#[derive(Debug, Default, Clone, Serialize)]
pub struct OutcomeCounts {
    pub compliant: usize,
    pub not_compliant: usize,
    pub amended: usize,
    pub filled_in: usize,
    pub not_amended: usize,
    pub potential_issue: usize,
    pub not_issue: usize,
    pub measures: usize,
    pub prerequisites_not_met: usize,
    pub ambiguous: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &Outcome) {
        match outcome.status {
            OutcomeStatus::RunHasResult => match &outcome.result {
                ResultValue::Label(ResultLabel::Compliant) => self.compliant += 1,
                ResultValue::Label(ResultLabel::NotCompliant) => self.not_compliant += 1,
                ResultValue::Label(ResultLabel::PotentialIssue) => self.potential_issue += 1,
                ResultValue::Label(ResultLabel::NotIssue) => self.not_issue += 1,
                _ => self.measures += 1,
            },
            OutcomeStatus::Amended => self.amended += 1,
            OutcomeStatus::FilledIn => self.filled_in += 1,
            OutcomeStatus::NotAmended => self.not_amended += 1,
            OutcomeStatus::ExternalPrerequisitesNotMet
            | OutcomeStatus::InternalPrerequisitesNotMet => self.prerequisites_not_met += 1,
            OutcomeStatus::Ambiguous => self.ambiguous += 1,
        }
    }
}

/// One of the most frequent non-pass tuples for a test.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValueCount {
    /// Pipe-joined tuple values.
    pub values: String,
    pub rows: usize,
}

/// Per-test summary.
#[derive(Debug, Clone, Serialize)]
pub struct TestDigest {
    pub test_id: String,
    pub test_type: String,
    pub information_element: String,
    pub distinct_tuples: usize,
    pub counts: OutcomeCounts,
    pub top_nonpass_values: Vec<ValueCount>,
}

/// Aggregate over every test sharing an information-element class.
/// Measures are assessed but never flagged.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ClassCounts {
    pub assessed: usize,
    pub flagged: usize,
}

/// The structured summary emitted alongside the two tables.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub core_type: String,
    pub row_count: usize,
    pub planned_test_count: usize,
    pub distinct_tuple_total: usize,
    pub tests: Vec<TestDigest>,
    pub information_elements: BTreeMap<String, ClassCounts>,
    /// Tests where every distinct tuple ended prerequisite-not-met.
    pub skipped_tests: Vec<String>,
    /// Rows sharing a record identifier with an earlier row.
    pub duplicate_record_identifiers: usize,
}

/// Accumulates (row, test) observations during projection.
pub struct DigestBuilder {
    per_test: Vec<TestAccumulator>,
}

struct TestAccumulator {
    counts: OutcomeCounts,
    nonpass_values: HashMap<String, usize>,
}

impl DigestBuilder {
    pub fn new(plan: &TestPlan) -> Self {
        Self {
            per_test: plan
                .tests
                .iter()
                .map(|_| TestAccumulator {
                    counts: OutcomeCounts::default(),
                    nonpass_values: HashMap::new(),
                })
                .collect(),
        }
    }

    /// Record one (row, test) outcome.
    pub fn record(&mut self, plan_idx: usize, test_type: TestType, outcome: &Outcome, tuple: &[String]) {
        let acc = &mut self.per_test[plan_idx];
        acc.counts.record(outcome);
        if !outcome.is_pass(test_type) {
            *acc.nonpass_values.entry(tuple.join("|")).or_insert(0) += 1;
        }
    }

    pub fn finish(
        self,
        dataset: &Dataset,
        plan: &TestPlan,
        distinct: &DistinctTuples,
        cache: &TupleCache,
    ) -> Digest {
        let mut tests = Vec::with_capacity(plan.len());
        let mut information_elements: BTreeMap<String, ClassCounts> = BTreeMap::new();
        let mut skipped_tests = Vec::new();

        for (plan_idx, (planned, acc)) in plan.tests.iter().zip(self.per_test).enumerate() {
            let test_type = planned.descriptor.test_type;

            let mut top: Vec<ValueCount> = acc
                .nonpass_values
                .into_iter()
                .map(|(values, rows)| ValueCount { values, rows })
                .collect();
            top.sort_by(|a, b| b.rows.cmp(&a.rows).then_with(|| a.values.cmp(&b.values)));
            top.truncate(TOP_VALUES_PER_TEST);

            let class = information_elements
                .entry(planned.descriptor.information_element.clone())
                .or_default();
            let assessed: usize = [
                acc.counts.compliant,
                acc.counts.not_compliant,
                acc.counts.amended,
                acc.counts.filled_in,
                acc.counts.not_amended,
                acc.counts.potential_issue,
                acc.counts.not_issue,
                acc.counts.measures,
                acc.counts.prerequisites_not_met,
                acc.counts.ambiguous,
            ]
            .iter()
            .sum();
            class.assessed += assessed;
            if test_type != TestType::Measure {
                class.flagged += assessed
                    - match test_type {
                        TestType::Validation => acc.counts.compliant,
                        TestType::Amendment => acc.counts.not_amended,
                        TestType::Issue => acc.counts.not_issue,
                        TestType::Measure => 0,
                    };
            }

            // A test is skipped when every distinct tuple ended in a
            // prerequisite-not-met status.
            let tuples = &distinct.per_test[plan_idx];
            let all_prereq = !tuples.is_empty()
                && tuples.iter().all(|tuple| {
                    cache
                        .get(&planned.key_for(tuple))
                        .map(|o| o.status.is_prerequisites_not_met())
                        .unwrap_or(false)
                });
            if all_prereq {
                skipped_tests.push(planned.descriptor.label.clone());
            }

            tests.push(TestDigest {
                test_id: planned.descriptor.label.clone(),
                test_type: test_type.as_str().to_string(),
                information_element: planned.descriptor.information_element.clone(),
                distinct_tuples: tuples.len(),
                counts: acc.counts,
                top_nonpass_values: top,
            });
        }

        Digest {
            generated_at: Utc::now(),
            core_type: dataset.core_type.as_str().to_string(),
            row_count: dataset.row_count(),
            planned_test_count: plan.len(),
            distinct_tuple_total: distinct.total(),
            tests,
            information_elements,
            skipped_tests,
            duplicate_record_identifiers: dataset.row_count() - dataset.distinct_record_ids(),
        }
    }
}
