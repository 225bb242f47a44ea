//! Function table packing.
//!
//! Turns descriptors plus compiled fragments into one ordered
//! [`FunctionTable`] per lambda type, and moves tables to and from disk. A
//! table file is a JSON array of `Pair <bytes> <index>` values in index order,
//! which is also the setter argument shape, so a file can be uploaded as is.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use lambda_deploy_types::micheline::{as_bytes, pair_bytes_index};
use lambda_deploy_types::{CompiledFragment, FragmentDescriptor, FunctionTable, LambdaType};

use crate::error::DeployError;
use crate::paths::atomic_write_json;

/// Reject two descriptors of one type sharing an index.
pub fn check_unique_indices(
    lambda_type: LambdaType,
    descriptors: &[FragmentDescriptor],
) -> Result<(), DeployError> {
    let mut seen: HashMap<u32, &str> = HashMap::with_capacity(descriptors.len());
    for d in descriptors {
        if let Some(first) = seen.insert(d.index, &d.name) {
            return Err(DeployError::DuplicateIndex {
                lambda_type,
                index: d.index,
                names: (first.to_string(), d.name.clone()),
            });
        }
    }
    Ok(())
}

/// Descriptors that pass `keep`, e.g. everything but deployer-only lambdas.
pub fn select<P>(descriptors: &[FragmentDescriptor], keep: P) -> Vec<FragmentDescriptor>
where
    P: Fn(&FragmentDescriptor) -> bool,
{
    descriptors.iter().filter(|d| keep(d)).cloned().collect()
}

/// Match compiled fragments to descriptors by index and order them.
///
/// Every descriptor needs exactly one fragment; a table with a hole is not
/// safe to upload.
pub fn pack(
    lambda_type: LambdaType,
    contract: &str,
    descriptors: &[FragmentDescriptor],
    compiled: Vec<CompiledFragment>,
) -> Result<FunctionTable, DeployError> {
    check_unique_indices(lambda_type, descriptors)?;

    let mut by_index: BTreeMap<u32, CompiledFragment> = BTreeMap::new();
    for fragment in compiled {
        let index = fragment.index;
        if by_index.insert(index, fragment).is_some() {
            return Err(DeployError::configuration(format!(
                "{} lambda index {} was compiled twice",
                lambda_type, index
            )));
        }
    }

    let mut ordered: Vec<&FragmentDescriptor> = descriptors.iter().collect();
    ordered.sort_by_key(|d| d.index);

    let mut fragments = Vec::with_capacity(ordered.len());
    for d in ordered {
        let fragment = by_index.remove(&d.index).ok_or_else(|| DeployError::Compilation {
            target: format!("{} lambda '{}'", lambda_type, d.name),
            diagnostics: format!("no compiled fragment for index {}", d.index),
        })?;
        fragments.push(fragment);
    }
    if let Some(extra) = by_index.keys().next() {
        return Err(DeployError::configuration(format!(
            "compiled {} lambda index {} has no descriptor",
            lambda_type, extra
        )));
    }

    Ok(FunctionTable {
        lambda_type,
        contract: contract.to_string(),
        fragments,
    })
}

/// Read a descriptor file: `[{ "index": 0, "name": "..." }, ...]`.
pub fn read_descriptors(path: &Path) -> Result<Vec<FragmentDescriptor>, DeployError> {
    let raw = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    serde_json::from_str(&raw)
        .map_err(|e| DeployError::serialization(format!("descriptors {}", path.display()), e))
}

pub fn table_to_json(table: &FunctionTable) -> Value {
    Value::Array(
        table
            .fragments
            .iter()
            .map(|f| pair_bytes_index(&f.bytes, f.index))
            .collect(),
    )
}

pub fn write_table(path: &Path, table: &FunctionTable) -> Result<(), DeployError> {
    atomic_write_json(path, &table_to_json(table))
}

/// Load a table file. Names are not stored in table files, so fragments
/// come back with an empty `name`.
pub fn read_table(
    path: &Path,
    lambda_type: LambdaType,
    contract: &str,
) -> Result<FunctionTable, DeployError> {
    let raw = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| DeployError::serialization(format!("table {}", path.display()), e))?;
    let entries = value.as_array().ok_or_else(|| {
        DeployError::serialization(format!("table {}", path.display()), "expected an array")
    })?;

    let mut fragments = Vec::with_capacity(entries.len());
    for (pos, entry) in entries.iter().enumerate() {
        let malformed = || {
            DeployError::serialization(
                format!("table {}", path.display()),
                format!("entry {} is not `Pair <bytes> <int>`", pos),
            )
        };
        let args = entry
            .get("args")
            .and_then(Value::as_array)
            .filter(|a| a.len() == 2)
            .ok_or_else(malformed)?;
        let bytes = as_bytes(&args[0]).ok_or_else(malformed)?;
        let index = args[1]
            .get("int")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(malformed)?;
        fragments.push(CompiledFragment {
            index,
            name: String::new(),
            bytes,
        });
    }

    let descriptors: Vec<FragmentDescriptor> = fragments
        .iter()
        .map(|f| FragmentDescriptor::new(f.index, String::new()))
        .collect();
    pack(lambda_type, contract, &descriptors, fragments)
}
