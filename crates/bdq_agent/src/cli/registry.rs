//! `bdq-agent registry` - inspect the test-descriptor table.
//!
//! Lists every descriptor, or only the ones applicable to a given column
//! set, so operators can see which tests a dataset would trigger without
//! running a job.

use anyhow::{Context, Result};
use bdq_engine::{Header, Registry, TestDescriptor};
use clap::Args;
use comfy_table::Table;
use std::path::PathBuf;

/// Arguments for the `registry` command
#[derive(Debug, Args)]
pub struct RegistryArgs {
    /// Test-descriptor table
    #[arg(long, short, value_name = "FILE")]
    pub registry: PathBuf,

    /// Comma-separated column names; list only tests applicable to them
    #[arg(long, value_name = "COLS")]
    pub columns: Option<String>,
}

/// Execute the registry command
pub fn cmd_registry(args: RegistryArgs) -> Result<()> {
    let bytes = std::fs::read(&args.registry)
        .with_context(|| format!("Failed to read registry: {}", args.registry.display()))?;
    let registry = Registry::from_bytes(&bytes)
        .with_context(|| format!("Failed to load registry: {}", args.registry.display()))?;

    let descriptors: Vec<&TestDescriptor> = match &args.columns {
        Some(columns) => {
            let names: Vec<String> = columns
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            let (header, _) = Header::new(names);
            registry.applicable(&header)
        }
        None => registry.list().iter().collect(),
    };

    let mut table = Table::new();
    table.set_header(["test", "type", "element", "acted upon", "consulted"]);
    for descriptor in &descriptors {
        table.add_row([
            descriptor.label.clone(),
            descriptor.test_type.to_string(),
            descriptor.information_element.clone(),
            descriptor.acted_upon.join(","),
            descriptor.consulted.join(","),
        ]);
    }
    println!("{table}");
    println!("{} of {} tests", descriptors.len(), registry.len());
    Ok(())
}
