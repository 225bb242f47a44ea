//! Initial storage templates.
//!
//! A template is a Micheline JSON value in which `{"var": "<name>"}` nodes are
//! replaced at deploy time:
//!
//! | `var`          | value                                                  |
//! |----------------|--------------------------------------------------------|
//! | `deployer`     | signer address, as a string                            |
//! | `dev_lambdas`  | the Dev function table as a `big_map` literal          |
//! | `env:<NAME>`   | environment value; `"as"` picks `string` (default), `int`, `address` or `contract` |
//!
//! Address-typed values are checked before anything reaches the ledger.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use lambda_deploy_core::DeployError;
use lambda_deploy_types::{validate_address, validate_contract_address, FunctionTable};

pub struct StorageVars<'a> {
    pub deployer: &'a str,
    pub dev_lambdas: Option<&'a FunctionTable>,
    pub env: &'a (dyn Fn(&str) -> Option<String> + Send + Sync),
}

/// `<storage_dir>/<contract>.json`
pub fn template_path(storage_dir: &Path, contract_name: &str) -> PathBuf {
    storage_dir.join(format!("{}.json", contract_name))
}

pub fn load_template(storage_dir: &Path, contract_name: &str) -> Result<Value, DeployError> {
    let path = template_path(storage_dir, contract_name);
    let raw = std::fs::read_to_string(&path).map_err(|e| DeployError::io(&path, e))?;
    serde_json::from_str(&raw)
        .map_err(|e| DeployError::serialization(format!("storage template {}", path.display()), e))
}

/// Substitute every variable node in `template`.
pub fn render(template: &Value, vars: &StorageVars<'_>) -> Result<Value, DeployError> {
    match template {
        Value::Array(items) => items
            .iter()
            .map(|item| render(item, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(obj) => match obj.get("var").and_then(Value::as_str) {
            Some(name) => substitute(name, obj, vars),
            None => {
                let mut out = Map::with_capacity(obj.len());
                for (key, value) in obj {
                    out.insert(key.clone(), render(value, vars)?);
                }
                Ok(Value::Object(out))
            }
        },
        other => Ok(other.clone()),
    }
}

fn substitute(
    name: &str,
    node: &Map<String, Value>,
    vars: &StorageVars<'_>,
) -> Result<Value, DeployError> {
    match name {
        "deployer" => {
            check_address(name, vars.deployer, false)?;
            Ok(json!({ "string": vars.deployer }))
        }
        "dev_lambdas" => Ok(vars
            .dev_lambdas
            .map(FunctionTable::to_storage_map)
            .unwrap_or_else(|| Value::Array(Vec::new()))),
        _ => {
            let key = name.strip_prefix("env:").ok_or_else(|| {
                DeployError::configuration(format!("unknown storage variable '{}'", name))
            })?;
            let value = (vars.env)(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    DeployError::configuration(format!(
                        "storage needs environment variable {}",
                        key
                    ))
                })?;
            match node.get("as").and_then(Value::as_str).unwrap_or("string") {
                "string" => Ok(json!({ "string": value })),
                "int" => {
                    let digits = value.strip_prefix('-').unwrap_or(&value);
                    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                        return Err(DeployError::configuration(format!(
                            "{} must be an integer, got '{}'",
                            key, value
                        )));
                    }
                    Ok(json!({ "int": value }))
                }
                "address" => {
                    check_address(key, &value, false)?;
                    Ok(json!({ "string": value }))
                }
                "contract" => {
                    check_address(key, &value, true)?;
                    Ok(json!({ "string": value }))
                }
                other => Err(DeployError::configuration(format!(
                    "unknown storage value type '{}' for {}",
                    other, key
                ))),
            }
        }
    }
}

fn check_address(name: &str, address: &str, contract: bool) -> Result<(), DeployError> {
    let checked = if contract {
        validate_contract_address(address)
    } else {
        validate_address(address)
    };
    checked.map_err(|e| {
        DeployError::configuration(format!("{} is not a valid address ({}): {}", name, e, address))
    })
}
