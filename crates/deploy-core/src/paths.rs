//! Build directory layout and file helpers.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::DeployError;

/// `<output>/<contract>.json`
pub fn artifact_path(output_dir: &Path, contract_name: &str) -> PathBuf {
    output_dir.join(format!("{}.json", contract_name))
}

/// `<contracts>/../compiled/<contract>.tz`
pub fn michelson_text_path(contracts_dir: &Path, contract_name: &str) -> PathBuf {
    contracts_dir
        .join("..")
        .join("compiled")
        .join(format!("{}.tz", contract_name))
}

/// Directory for function tables compiled against `contract_path`:
/// `<output>/lambdas[/test][/factory]`.
pub fn lambdas_dir_for(output_dir: &Path, contract_path: &str) -> PathBuf {
    let lower = contract_path.to_lowercase();
    let mut dir = output_dir.join("lambdas");
    if lower.contains("test") {
        dir.push("test");
    }
    if lower.contains("factory") {
        dir.push("factory");
    }
    dir
}

/// `<output>/lambdas/factory/<name>.txt`
pub fn factory_lambda_path(output_dir: &Path, lambda_name: &str) -> PathBuf {
    output_dir
        .join("lambdas")
        .join("factory")
        .join(format!("{}.txt", lambda_name))
}

/// Contract name of a source file: its file stem.
pub fn contract_name_of(source: &Path) -> Option<String> {
    source
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<(), DeployError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, then rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), DeployError> {
    ensure_parent_dirs(path)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, contents).map_err(|e| DeployError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| DeployError::io(path, e))?;
    Ok(())
}

/// Write pretty-printed JSON atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DeployError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| DeployError::serialization(path.display().to_string(), e))?;
    atomic_write(path, &json)
}

/// Path relative to `base` when possible, with `/` separators.
pub fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lambdas_dir_variants() {
        let out = Path::new("build");
        assert_eq!(
            lambdas_dir_for(out, "contracts/main/dex.ligo"),
            PathBuf::from("build/lambdas")
        );
        assert_eq!(
            lambdas_dir_for(out, "contracts/main/factory.ligo"),
            PathBuf::from("build/lambdas/factory")
        );
        assert_eq!(
            lambdas_dir_for(out, "contracts/test/Factory_test.ligo"),
            PathBuf::from("build/lambdas/test/factory")
        );
    }

    #[test]
    fn test_atomic_write_leaves_no_tmp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dex.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_relative_display() {
        assert_eq!(
            relative_display(Path::new("/repo/contracts/main/dex.ligo"), Path::new("/repo")),
            "contracts/main/dex.ligo"
        );
        assert_eq!(contract_name_of(Path::new("contracts/main/dex.ligo")).as_deref(), Some("dex"));
    }
}
