//! Output formatting for the lambda-deploy CLI

use serde::Serialize;

use lambda_deploy_core::{BatchError, DeployError};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Structured failure report for `--debug-json`.
pub fn format_debug_diagnostic_json(
    command: &str,
    error: &anyhow::Error,
    hints: Vec<String>,
) -> String {
    #[derive(Serialize)]
    struct DebugDiagnostic {
        command: String,
        category: String,
        indeterminate: bool,
        error: String,
        causes: Vec<String>,
        hints: Vec<String>,
        timestamp_utc: String,
    }

    let causes: Vec<String> = error.chain().skip(1).map(|c| c.to_string()).collect();
    let payload = DebugDiagnostic {
        command: command.to_string(),
        category: classify_error(error).to_string(),
        indeterminate: deploy_error(error).is_some_and(DeployError::is_indeterminate),
        error: error.to_string(),
        causes,
        hints,
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
    };
    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
}

/// Default hints for common failures.
pub fn default_diagnostic_hints(command: &str, error: &anyhow::Error) -> Vec<String> {
    let mut hints = Vec::new();
    match deploy_error(error) {
        Some(DeployError::Configuration { .. }) => {
            hints.push("Run `lambda-deploy doctor` to check the compiler and node setup".to_string())
        }
        Some(DeployError::ArtifactMissing { .. }) => {
            hints.push("Compile the contract first with `lambda-deploy compile`".to_string())
        }
        Some(DeployError::AlreadyDeployed { .. }) => hints.push(
            "Skip finished steps with `--from`, or pass `--redeploy` to originate again".to_string(),
        ),
        Some(DeployError::Timeout { .. }) | Some(DeployError::Cancelled { .. }) => hints.push(
            "The operation may still be included; check it on chain before resubmitting"
                .to_string(),
        ),
        Some(DeployError::Compilation { .. }) | Some(DeployError::EmptySource { .. }) => {
            hints.push("Fix the source and rerun; nothing was written for the failed target".to_string())
        }
        _ => {}
    }
    if command == "migrate" && hints.is_empty() {
        hints.push("Steps that finished are recorded in the build artifacts; resume with `--from`".to_string());
    }
    if hints.is_empty() {
        hints.push("Retry with `--verbose` for additional details".to_string());
    }
    hints
}

fn deploy_error(error: &anyhow::Error) -> Option<&DeployError> {
    error
        .downcast_ref::<DeployError>()
        .or_else(|| error.downcast_ref::<BatchError>().map(|b| &b.error))
}

fn classify_error(error: &anyhow::Error) -> &'static str {
    match deploy_error(error) {
        Some(err) => err.category(),
        None => "execution_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_uses_deploy_error_category() {
        let err = anyhow::Error::from(DeployError::AlreadyDeployed {
            contract_name: "dex".to_string(),
            network: "sandbox".to_string(),
            address: "KT1PWx2mnDueood7fEmfbBDKx1D9BAnnXitn".to_string(),
        });
        let hints = default_diagnostic_hints("migrate", &err);
        assert!(hints[0].contains("--redeploy"));

        let json: serde_json::Value =
            serde_json::from_str(&format_debug_diagnostic_json("migrate", &err, hints)).unwrap();
        assert_eq!(json["category"], "already_deployed");
        assert_eq!(json["indeterminate"], false);
    }

    #[test]
    fn test_timeout_is_flagged_indeterminate() {
        let err = anyhow::Error::from(DeployError::Timeout {
            operation: "ooTest".to_string(),
            waited_ms: 1000,
            last_level: None,
        });
        let json: serde_json::Value =
            serde_json::from_str(&format_debug_diagnostic_json("migrate", &err, Vec::new())).unwrap();
        assert_eq!(json["category"], "timeout");
        assert_eq!(json["indeterminate"], true);
    }

    #[test]
    fn test_plain_errors_fall_back() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(classify_error(&err), "execution_error");
        assert_eq!(default_diagnostic_hints("doctor", &err).len(), 1);
    }
}
