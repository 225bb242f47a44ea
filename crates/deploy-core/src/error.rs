//! Error taxonomy of the deployment pipeline.
//!
//! Every variant except [`DeployError::Timeout`] and [`DeployError::Cancelled`]
//! is a definite failure. A timeout means the outcome is unknown: the operation
//! may still be included later.

use std::fmt;
use std::path::PathBuf;

use lambda_deploy_types::{LambdaType, OperationHandle};

#[derive(Debug)]
pub enum DeployError {
    /// Bad configuration or no working compiler strategy.
    Configuration { message: String },

    /// Two descriptors of one lambda type share an index.
    DuplicateIndex {
        lambda_type: LambdaType,
        index: u32,
        names: (String, String),
    },

    /// Source file exists but has no content.
    EmptySource { path: PathBuf },

    /// Compiler exited non-zero or wrote an error to stderr.
    Compilation {
        target: String,
        diagnostics: String,
    },

    /// An artifact with this name was compiled from a different source.
    ArtifactConflict {
        contract_name: String,
        existing_source: String,
        requested_source: String,
    },

    /// No compiled artifact for the contract.
    ArtifactMissing { contract_name: String, path: PathBuf },

    /// The contract already has an address on this network.
    AlreadyDeployed {
        contract_name: String,
        network: String,
        address: String,
    },

    /// The ledger refused the operation, at injection or at application.
    LedgerRejection {
        operation: Option<String>,
        reason: String,
    },

    /// No inclusion found before the deadline. Outcome unknown.
    Timeout {
        operation: String,
        waited_ms: u64,
        last_level: Option<u64>,
    },

    /// The caller abandoned the wait.
    Cancelled { operation: String },

    Io { path: PathBuf, source: std::io::Error },

    Serialization { context: String, message: String },
}

impl DeployError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DeployError::Configuration {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, err: impl fmt::Display) -> Self {
        DeployError::Serialization {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn rejection(operation: Option<&OperationHandle>, reason: impl Into<String>) -> Self {
        DeployError::LedgerRejection {
            operation: operation.map(|h| h.hash.clone()),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable category.
    pub fn category(&self) -> &'static str {
        match self {
            DeployError::Configuration { .. } => "configuration",
            DeployError::DuplicateIndex { .. } => "duplicate_index",
            DeployError::EmptySource { .. } => "empty_source",
            DeployError::Compilation { .. } => "compilation",
            DeployError::ArtifactConflict { .. } => "artifact_conflict",
            DeployError::ArtifactMissing { .. } => "artifact_missing",
            DeployError::AlreadyDeployed { .. } => "already_deployed",
            DeployError::LedgerRejection { .. } => "ledger_rejection",
            DeployError::Timeout { .. } => "timeout",
            DeployError::Cancelled { .. } => "cancelled",
            DeployError::Io { .. } => "io",
            DeployError::Serialization { .. } => "serialization",
        }
    }

    /// Whether the outcome on the ledger is unknown rather than failed.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            DeployError::Timeout { .. } | DeployError::Cancelled { .. }
        )
    }
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::Configuration { message } => {
                write!(f, "configuration error: {}", message)
            }
            DeployError::DuplicateIndex {
                lambda_type,
                index,
                names,
            } => write!(
                f,
                "duplicate index {} in {} lambdas ('{}' and '{}')",
                index, lambda_type, names.0, names.1
            ),
            DeployError::EmptySource { path } => {
                write!(f, "source file {} is empty", path.display())
            }
            DeployError::Compilation {
                target,
                diagnostics,
            } => write!(f, "compilation of {} failed:\n{}", target, diagnostics),
            DeployError::ArtifactConflict {
                contract_name,
                existing_source,
                requested_source,
            } => write!(
                f,
                "there is a compiled version of '{}' whose code is located at {} (requested {})",
                contract_name, existing_source, requested_source
            ),
            DeployError::ArtifactMissing {
                contract_name,
                path,
            } => write!(
                f,
                "no compiled artifact found for '{}' at {}",
                contract_name,
                path.display()
            ),
            DeployError::AlreadyDeployed {
                contract_name,
                network,
                address,
            } => write!(
                f,
                "'{}' is already deployed on {} at {} (use --redeploy to originate again)",
                contract_name, network, address
            ),
            DeployError::LedgerRejection { operation, reason } => match operation {
                Some(hash) => write!(f, "ledger rejected operation {}: {}", hash, reason),
                None => write!(f, "ledger rejected operation: {}", reason),
            },
            DeployError::Timeout {
                operation,
                waited_ms,
                last_level,
            } => {
                write!(
                    f,
                    "confirmation of {} timed out after {}ms",
                    operation, waited_ms
                )?;
                if let Some(level) = last_level {
                    write!(f, " (last scanned level {})", level)?;
                }
                Ok(())
            }
            DeployError::Cancelled { operation } => {
                write!(f, "confirmation of {} was cancelled", operation)
            }
            DeployError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            DeployError::Serialization { context, message } => {
                write!(f, "failed to (de)serialize {}: {}", context, message)
            }
        }
    }
}

impl std::error::Error for DeployError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeployError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A batch submission that stopped part way.
///
/// Groups before `failed_group` are confirmed on chain and stay there; nothing
/// is rolled back.
#[derive(Debug)]
pub struct BatchError {
    pub confirmed: Vec<OperationHandle>,
    pub failed_group: usize,
    pub error: DeployError,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch group {} failed after {} confirmed group(s): {}",
            self.failed_group,
            self.confirmed.len(),
            self.error
        )
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<BatchError> for DeployError {
    fn from(err: BatchError) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_snake_case() {
        let errors = vec![
            DeployError::configuration("no compiler"),
            DeployError::EmptySource {
                path: PathBuf::from("contracts/main/dex.ligo"),
            },
            DeployError::Timeout {
                operation: "ooX".to_string(),
                waited_ms: 150_000,
                last_level: Some(10),
            },
        ];
        let categories: Vec<_> = errors.iter().map(DeployError::category).collect();
        assert_eq!(categories, vec!["configuration", "empty_source", "timeout"]);
    }

    #[test]
    fn test_timeout_and_cancel_are_indeterminate() {
        assert!(DeployError::Cancelled {
            operation: "ooX".to_string()
        }
        .is_indeterminate());
        assert!(!DeployError::rejection(None, "balance too low").is_indeterminate());
    }

    #[test]
    fn test_conflict_message_names_both_paths() {
        let err = DeployError::ArtifactConflict {
            contract_name: "dex".to_string(),
            existing_source: "contracts/main/dex.ligo".to_string(),
            requested_source: "contracts/alt/dex.ligo".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("contracts/main/dex.ligo"));
        assert!(message.contains("contracts/alt/dex.ligo"));
    }
}
