//! Back-projection of cached outcomes onto the source rows.
//!
//! Produces the three job artifacts in one deterministic pass: the
//! raw-results table (one row per non-pass (record, test) pair, in
//! (row-index, plan-order) lexicographic order), the amended dataset
//! (identical shape to the input, cells changed only where an Amendment
//! proposed a value), and the digest.

use crate::cache::TupleCache;
use crate::dataset::Dataset;
use crate::digest::{Digest, DigestBuilder};
use crate::error::JobError;
use crate::executor::DistinctTuples;
use crate::plan::{PlannedTest, TestPlan};
use bdq_protocol::{Outcome, OutcomeStatus, TestType};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Raw-results header, in output order.
pub const RAW_RESULTS_COLUMNS: [&str; 8] = [
    "record-identifier",
    "test-id",
    "test-type",
    "status",
    "result",
    "comment",
    "acted-upon",
    "values",
];

/// One raw-results row.
#[derive(Debug, Clone)]
pub struct RawResultRow {
    pub record_identifier: String,
    pub test_id: String,
    pub test_type: TestType,
    pub status: OutcomeStatus,
    pub result: String,
    pub comment: String,
    pub acted_upon: String,
    pub values: String,
}

/// The raw-results table. Serializes as TSV with a header row.
#[derive(Debug, Default)]
pub struct RawResults {
    pub rows: Vec<RawResultRow>,
}

impl RawResults {
    pub fn to_tsv(&self) -> Result<String, JobError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer
            .write_record(RAW_RESULTS_COLUMNS)
            .map_err(|err| JobError::internal_bug(format!("raw-results render: {err}")))?;
        for row in &self.rows {
            writer
                .write_record([
                    row.record_identifier.as_str(),
                    row.test_id.as_str(),
                    row.test_type.as_str(),
                    row.status.as_str(),
                    row.result.as_str(),
                    row.comment.as_str(),
                    row.acted_upon.as_str(),
                    row.values.as_str(),
                ])
                .map_err(|err| JobError::internal_bug(format!("raw-results render: {err}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| JobError::internal_bug(format!("raw-results render: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|err| JobError::internal_bug(format!("raw-results render: {err}")))
    }
}

/// The amended dataset: input header verbatim, same rows, amended cells.
/// Serializes with the input's detected delimiter.
#[derive(Debug)]
pub struct AmendedDataset {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub delimiter: u8,
}

impl AmendedDataset {
    pub fn to_delimited(&self) -> Result<String, JobError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());
        writer
            .write_record(&self.header)
            .map_err(|err| JobError::internal_bug(format!("amended-dataset render: {err}")))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| JobError::internal_bug(format!("amended-dataset render: {err}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| JobError::internal_bug(format!("amended-dataset render: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|err| JobError::internal_bug(format!("amended-dataset render: {err}")))
    }
}

/// The three artifacts, emitted together at job end.
#[derive(Debug)]
pub struct Projection {
    pub raw_results: RawResults,
    pub amended_dataset: AmendedDataset,
    pub digest: Digest,
    pub warnings: Vec<String>,
}

/// Map cached outcomes back to every source row and derive all artifacts.
///
/// Every (planned test, distinct tuple) pair must be finalized in the
/// cache; a missing entry is an invariant violation.
pub fn project(
    dataset: &Dataset,
    plan: &TestPlan,
    cache: &TupleCache,
    distinct: &DistinctTuples,
) -> Result<Projection, JobError> {
    let mut warnings = Vec::new();

    let (amended_rows, overwrite_notes) =
        apply_amendments(dataset, plan, cache, &mut warnings)?;

    let mut builder = DigestBuilder::new(plan);
    let mut raw_rows = Vec::new();

    for row in 0..dataset.row_count() {
        for (plan_idx, planned) in plan.tests.iter().enumerate() {
            let tuple = planned.tuple(dataset, row);
            let outcome = lookup_outcome(cache, planned, &tuple)?;
            let test_type = planned.descriptor.test_type;
            builder.record(plan_idx, test_type, &outcome, &tuple);

            if outcome.is_pass(test_type) {
                continue;
            }

            let mut comment = outcome.comment.clone();
            if let Some(notes) = overwrite_notes.get(&(row, plan_idx)) {
                if !comment.is_empty() {
                    comment.push_str("; ");
                }
                comment.push_str(&notes.join("; "));
            }

            // prerequisite-not-met rows carry an empty result column
            let result = if outcome.status.is_prerequisites_not_met() {
                String::new()
            } else {
                outcome.render_result()
            };

            raw_rows.push(RawResultRow {
                record_identifier: dataset.record_id(row).to_string(),
                test_id: planned.descriptor.label.clone(),
                test_type,
                status: outcome.status,
                result,
                comment,
                acted_upon: planned.descriptor.acted_upon.join(","),
                values: tuple.join("|"),
            });
        }
    }

    let digest = builder.finish(dataset, plan, distinct, cache);
    debug!(
        raw_rows = raw_rows.len(),
        skipped_tests = digest.skipped_tests.len(),
        "projection complete"
    );

    Ok(Projection {
        raw_results: RawResults { rows: raw_rows },
        amended_dataset: AmendedDataset {
            header: dataset.header.columns().to_vec(),
            rows: amended_rows,
            delimiter: dataset.delimiter,
        },
        digest,
        warnings,
    })
}

type OverwriteNotes = HashMap<(usize, usize), Vec<String>>;

/// Apply Amendment outcomes in plan order. The last writer wins a contested
/// cell; the overwritten amendment gets a note keyed by (row, plan index)
/// for the raw-results comment.
fn apply_amendments(
    dataset: &Dataset,
    plan: &TestPlan,
    cache: &TupleCache,
    warnings: &mut Vec<String>,
) -> Result<(Vec<Vec<String>>, OverwriteNotes), JobError> {
    let mut rows = dataset.rows().to_vec();
    let mut notes: OverwriteNotes = HashMap::new();
    let mut unknown_columns: BTreeSet<String> = BTreeSet::new();

    for row in 0..dataset.row_count() {
        // column index -> (plan index, value) of the amendment that last
        // wrote the cell on this row
        let mut last_writer: HashMap<usize, (usize, String)> = HashMap::new();

        for (plan_idx, planned) in plan.tests.iter().enumerate() {
            if planned.descriptor.test_type != TestType::Amendment {
                continue;
            }
            let tuple = planned.tuple(dataset, row);
            let outcome = lookup_outcome(cache, planned, &tuple)?;
            if !matches!(
                outcome.status,
                OutcomeStatus::Amended | OutcomeStatus::FilledIn
            ) {
                continue;
            }

            for proposal in outcome.proposals() {
                let Some(col) = dataset.header.resolve(&proposal.column) else {
                    unknown_columns.insert(format!(
                        "test '{}' proposed a value for unknown column '{}'; ignored",
                        planned.descriptor.label, proposal.column
                    ));
                    continue;
                };
                if let Some((earlier_idx, earlier_value)) = last_writer.get(&col) {
                    if earlier_value != &proposal.value {
                        notes.entry((row, *earlier_idx)).or_default().push(format!(
                            "proposed {}={} superseded by {}",
                            dataset.header.columns()[col],
                            earlier_value,
                            planned.descriptor.label
                        ));
                    }
                }
                rows[row][col] = proposal.value.clone();
                last_writer.insert(col, (plan_idx, proposal.value.clone()));
            }
        }
    }

    warnings.extend(unknown_columns);
    Ok((rows, notes))
}

fn lookup_outcome(
    cache: &TupleCache,
    planned: &PlannedTest,
    tuple: &[String],
) -> Result<Outcome, JobError> {
    cache.get(&planned.key_for(tuple)).ok_or_else(|| {
        JobError::internal_bug(format!(
            "no cached outcome for test '{}' tuple [{}]",
            planned.descriptor.label,
            tuple.join("|")
        ))
    })
}
