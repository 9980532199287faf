//! Test-descriptor registry.
//!
//! The registry source is a delimited table (same sniffing rules as
//! datasets) with one row per known BDQ test. Expected columns:
//!
//! | column                | content                                          |
//! |-----------------------|--------------------------------------------------|
//! | `label`               | stable test id, e.g. `VALIDATION_COUNTRYCODE_STANDARD` |
//! | `guid`                | opaque stable identifier (may be empty)          |
//! | `type`                | Validation / Amendment / Issue / Measure         |
//! | `information_element` | coarse grouping label for the digest             |
//! | `acted_upon`          | columns the test reads and may amend (`,` or `\|` separated) |
//! | `consulted`           | additional read-only columns (`,` or `\|` separated) |
//! | `parameters`          | `name=default` entries, `\|` separated           |
//! | `implementation`      | opaque handle passed to the test provider        |
//!
//! The registry is built once at startup and immutable afterwards.

use crate::dataset::{normalize_name, sniff_delimiter, Header};
use crate::error::RegistryError;
use bdq_protocol::TestType;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A named scalar parameter a test accepts, with an optional default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestParameter {
    pub name: String,
    pub default: Option<String>,
}

/// Immutable description of one BDQ test.
#[derive(Debug, Clone)]
pub struct TestDescriptor {
    pub label: String,
    pub guid: String,
    pub test_type: TestType,
    pub acted_upon: Vec<String>,
    pub consulted: Vec<String>,
    pub parameters: Vec<TestParameter>,
    pub information_element: String,
    /// Opaque pointer to the implementation in the test provider.
    pub handle: String,
}

impl TestDescriptor {
    /// Cache/dedup key: the GUID when present, else the label.
    pub fn cache_key(&self) -> &str {
        if self.guid.is_empty() {
            &self.label
        } else {
            &self.guid
        }
    }

    /// Every column the test reads, acted-upon first, in declared order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.acted_upon
            .iter()
            .chain(self.consulted.iter())
            .map(String::as_str)
    }

    /// Parameters without a default, i.e. the ones a caller must supply.
    fn required_caller_parameters(&self) -> usize {
        self.parameters
            .iter()
            .filter(|p| p.default.is_none())
            .count()
    }
}

/// All known tests, in source (natural) order.
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<TestDescriptor>,
    lookup: HashMap<String, usize>,
}

impl Registry {
    /// Load and validate the descriptor table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(RegistryError::Invalid("registry source is empty".into()));
        }

        let first_line_end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
        let delimiter = sniff_delimiter(&bytes[..first_line_end]);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|err| RegistryError::Invalid(err.to_string()))?
            .clone();
        let column = |name: &str| -> Option<usize> {
            headers
                .iter()
                .position(|h| normalize_name(h) == normalize_name(name))
        };
        let label_col = column("label")
            .ok_or_else(|| RegistryError::Invalid("missing 'label' column".into()))?;
        let type_col = column("type")
            .ok_or_else(|| RegistryError::Invalid("missing 'type' column".into()))?;
        let handle_col = column("implementation")
            .ok_or_else(|| RegistryError::Invalid("missing 'implementation' column".into()))?;
        let acted_col = column("acted_upon")
            .ok_or_else(|| RegistryError::Invalid("missing 'acted_upon' column".into()))?;
        let guid_col = column("guid");
        let consulted_col = column("consulted");
        let params_col = column("parameters");
        let element_col = column("information_element");

        let cell = |record: &csv::StringRecord, idx: Option<usize>| -> String {
            idx.and_then(|i| record.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let mut descriptors: Vec<TestDescriptor> = Vec::new();
        // label (normalized) -> position in `descriptors`
        let mut by_label: HashMap<String, usize> = HashMap::new();

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|err| {
                RegistryError::Invalid(format!("descriptor row {}: {}", row, err))
            })?;

            let label = cell(&record, Some(label_col));
            if label.is_empty() {
                return Err(RegistryError::Invalid(format!(
                    "descriptor row {} has an empty label",
                    row
                )));
            }
            let handle = cell(&record, Some(handle_col));
            if handle.is_empty() {
                return Err(RegistryError::Invalid(format!(
                    "descriptor '{}' has an empty implementation handle",
                    label
                )));
            }
            let test_type: TestType = cell(&record, Some(type_col)).parse().map_err(|err| {
                RegistryError::Invalid(format!("descriptor '{}': {}", label, err))
            })?;

            let descriptor = TestDescriptor {
                guid: cell(&record, guid_col),
                test_type,
                acted_upon: split_names(&cell(&record, Some(acted_col))),
                consulted: split_names(&cell(&record, consulted_col)),
                parameters: parse_parameters(&cell(&record, params_col)),
                information_element: cell(&record, element_col),
                handle,
                label,
            };

            match by_label.get(&descriptor.label.to_ascii_lowercase()) {
                Some(&existing) => {
                    // Alias: prefer the default-bearing variant, the one
                    // that needs fewer caller-supplied parameters. Ties keep
                    // the first-seen descriptor and its natural position.
                    let kept = &descriptors[existing];
                    if descriptor.required_caller_parameters()
                        < kept.required_caller_parameters()
                    {
                        warn!(
                            label = %descriptor.label,
                            "replacing aliased descriptor with default-bearing variant"
                        );
                        descriptors[existing] = descriptor;
                    }
                }
                None => {
                    by_label.insert(descriptor.label.to_ascii_lowercase(), descriptors.len());
                    descriptors.push(descriptor);
                }
            }
        }

        if descriptors.is_empty() {
            return Err(RegistryError::Invalid(
                "registry source yields zero descriptors".into(),
            ));
        }

        let mut lookup = HashMap::new();
        for (idx, descriptor) in descriptors.iter().enumerate() {
            lookup.insert(descriptor.label.to_ascii_lowercase(), idx);
            if !descriptor.guid.is_empty() {
                lookup.insert(descriptor.guid.to_ascii_lowercase(), idx);
            }
        }

        debug!(count = descriptors.len(), "registry loaded");
        Ok(Self {
            descriptors,
            lookup,
        })
    }

    /// All descriptors in natural order.
    pub fn list(&self) -> &[TestDescriptor] {
        &self.descriptors
    }

    /// Descriptors whose acted-upon and consulted columns all resolve in
    /// the header.
    pub fn applicable(&self, header: &Header) -> Vec<&TestDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.columns().all(|c| header.contains(c)))
            .collect()
    }

    /// Look up a descriptor by label or GUID (case-insensitive).
    pub fn lookup(&self, label_or_guid: &str) -> Result<&TestDescriptor, RegistryError> {
        self.lookup
            .get(&label_or_guid.trim().to_ascii_lowercase())
            .map(|&idx| &self.descriptors[idx])
            .ok_or_else(|| RegistryError::NotFound(label_or_guid.to_string()))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn split_names(cell: &str) -> Vec<String> {
    cell.split(['|', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `name=default|name2` parameter entries. Defaults may contain
/// commas, so only the pipe separates entries.
fn parse_parameters(cell: &str) -> Vec<TestParameter> {
    cell.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, default)) => TestParameter {
                name: name.trim().to_string(),
                default: Some(default.trim().to_string()),
            },
            None => TestParameter {
                name: entry.to_string(),
                default: None,
            },
        })
        .collect()
}
