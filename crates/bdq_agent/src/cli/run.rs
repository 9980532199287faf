//! `bdq-agent run` - assess a local dataset file and write the artifacts.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage
//! bdq-agent run --input occurrences.csv --registry tests.tsv \
//!     --provider-cmd "java -jar bdqtestrunner.jar --single"
//!
//! # Tuning
//! bdq-agent run --input occurrences.csv --registry tests.tsv \
//!     --provider-cmd ./provider.sh --concurrency 4 --per-tuple-timeout 10 \
//!     --param "bdq:sourceAuthority=ISO 3166-1" --out ./results
//! ```

use crate::provider::SubprocessProvider;
use anyhow::{Context, Result};
use bdq_engine::{run_job, CancellationToken, JobOverrides, Registry};
use clap::Args;
use comfy_table::Table;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Arguments for the `run` command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Dataset file (CSV/TSV with an occurrenceID or taxonID column)
    #[arg(long, short, value_name = "FILE")]
    pub input: PathBuf,

    /// Test-descriptor table
    #[arg(long, short, value_name = "FILE")]
    pub registry: PathBuf,

    /// Provider command, invoked once per distinct tuple
    #[arg(long, value_name = "CMD")]
    pub provider_cmd: String,

    /// Output directory for the three artifacts
    #[arg(long, short, default_value = "./out")]
    pub out: PathBuf,

    /// Worker-pool size (default: min(8, max(2, logical CPUs)))
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-tuple provider timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub per_tuple_timeout: Option<u64>,

    /// Whole-job timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub job_timeout: Option<u64>,

    /// Test-parameter override, `name=value` (repeatable)
    #[arg(long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,
}

/// Execute the run command
pub async fn cmd_run(args: RunArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input not found: {}", args.input.display());
    }
    if !args.registry.exists() {
        anyhow::bail!("Registry not found: {}", args.registry.display());
    }

    let input_bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read input: {}", args.input.display()))?;
    let registry_bytes = std::fs::read(&args.registry)
        .with_context(|| format!("Failed to read registry: {}", args.registry.display()))?;
    let registry = Registry::from_bytes(&registry_bytes)
        .with_context(|| format!("Failed to load registry: {}", args.registry.display()))?;

    let provider = SubprocessProvider::from_command_line(&args.provider_cmd)
        .context("--provider-cmd must name a program")?;

    let mut parameters = BTreeMap::new();
    for param in &args.params {
        match param.split_once('=') {
            Some((name, value)) => {
                parameters.insert(name.trim().to_string(), value.to_string());
            }
            None => anyhow::bail!("--param expects NAME=VALUE, got '{param}'"),
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling job");
            ctrl_c_token.cancel();
        }
    });

    let overrides = JobOverrides {
        concurrency: args.concurrency,
        per_tuple_timeout_seconds: args.per_tuple_timeout,
        job_timeout_seconds: args.job_timeout,
        parameters,
        cancellation: Some(cancel),
    };

    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset.csv".to_string());

    let output = run_job(&input_bytes, &filename, &registry, Arc::new(provider), overrides)
        .await
        .map_err(|err| {
            anyhow::anyhow!("job failed [{}]: {}", err.kind, err.message)
        })?;

    for warning in &output.warnings {
        warn!("{warning}");
    }

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output directory: {}", args.out.display()))?;
    let raw_path = args.out.join("raw_results.tsv");
    let amended_path = args.out.join(amended_name(&filename));
    let digest_path = args.out.join("digest.json");

    std::fs::write(&raw_path, output.raw_results.to_tsv()?)
        .with_context(|| format!("Failed to write {}", raw_path.display()))?;
    std::fs::write(&amended_path, output.amended_dataset.to_delimited()?)
        .with_context(|| format!("Failed to write {}", amended_path.display()))?;
    std::fs::write(
        &digest_path,
        serde_json::to_string_pretty(&output.digest)?,
    )
    .with_context(|| format!("Failed to write {}", digest_path.display()))?;

    info!(
        raw = %raw_path.display(),
        amended = %amended_path.display(),
        digest = %digest_path.display(),
        "artifacts written"
    );
    print_summary(&output);
    Ok(())
}

fn amended_name(filename: &str) -> String {
    match Path::new(filename).file_stem().zip(Path::new(filename).extension()) {
        Some((stem, ext)) => format!(
            "{}_amended.{}",
            stem.to_string_lossy(),
            ext.to_string_lossy()
        ),
        None => format!("{filename}_amended"),
    }
}

fn print_summary(output: &bdq_engine::JobOutput) {
    let digest = &output.digest;
    println!(
        "{} rows assessed against {} tests ({} distinct tuples); {} finding(s)",
        digest.row_count,
        digest.planned_test_count,
        digest.distinct_tuple_total,
        output.raw_results.rows.len()
    );
    if !digest.skipped_tests.is_empty() {
        println!("skipped (prerequisites not met): {}", digest.skipped_tests.join(", "));
    }

    let mut table = Table::new();
    table.set_header(["test", "type", "distinct", "flagged", "amended"]);
    for test in &digest.tests {
        let flagged = test.counts.not_compliant + test.counts.potential_issue;
        let amended = test.counts.amended + test.counts.filled_in;
        table.add_row([
            test.test_id.clone(),
            test.test_type.clone(),
            test.distinct_tuples.to_string(),
            flagged.to_string(),
            amended.to_string(),
        ]);
    }
    println!("{table}");
}
