//! Ledger operations as the pipeline sees them: what gets submitted, the
//! handle that comes back, and where it was eventually included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One operation of a submission. Each kind carries exactly the fields the
/// ledger needs for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationPayload {
    /// Deploy a new contract account.
    Origination {
        code: Value,
        storage: Value,
        balance_mutez: u64,
    },
    /// Call a named entrypoint of an existing contract.
    EntrypointCall {
        destination: String,
        entrypoint: String,
        arg: Value,
        amount_mutez: u64,
    },
    /// Plain transfer to the default entrypoint.
    Transfer { destination: String, amount_mutez: u64 },
}

impl OperationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationPayload::Origination { .. } => "origination",
            OperationPayload::EntrypointCall { .. } => "entrypoint_call",
            OperationPayload::Transfer { .. } => "transfer",
        }
    }
}

/// Identifier the ledger returned for a submitted operation.
///
/// Equality is by hash only; `submitted_at` is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationHandle {
    pub hash: String,
    pub submitted_at: DateTime<Utc>,
}

impl OperationHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            submitted_at: Utc::now(),
        }
    }
}

impl PartialEq for OperationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for OperationHandle {}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Head,
    Level(u64),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Head => f.write_str("head"),
            BlockId::Level(level) => write!(f, "{}", level),
        }
    }
}

/// An operation group as found in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEntry {
    pub hash: String,
    #[serde(default)]
    pub contents: Vec<Value>,
}

/// A block reduced to what confirmation needs: its height and its operation
/// passes (validation passes, each a list of operation groups).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub level: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub operations: Vec<Vec<OperationEntry>>,
}

impl Block {
    /// Look for an operation group by hash across every pass. Manager
    /// operations live in the last pass, so passes are scanned from the end.
    pub fn find_operation(&self, op_hash: &str) -> Option<&OperationEntry> {
        self.operations
            .iter()
            .rev()
            .flat_map(|pass| pass.iter())
            .find(|op| op.hash == op_hash)
    }
}

/// Where and how a submitted operation was included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionRecord {
    pub block_level: u64,
    pub block_hash: String,
    pub operation: OperationEntry,
}

impl InclusionRecord {
    fn results(&self) -> impl Iterator<Item = &Value> {
        self.operation
            .contents
            .iter()
            .filter_map(|c| c.pointer("/metadata/operation_result"))
    }

    /// Address created by the first origination in the group.
    pub fn originated_contract(&self) -> Option<String> {
        self.operation
            .contents
            .iter()
            .filter(|c| c.get("kind").and_then(Value::as_str) == Some("origination"))
            .find_map(|c| {
                c.pointer("/metadata/operation_result/originated_contracts/0")
                    .and_then(Value::as_str)
                    .map(String::from)
            })
    }

    /// Description of the failure if any content was not applied.
    ///
    /// Included-but-failed operations still land in a block (and pay fees), so
    /// inclusion alone does not mean success.
    pub fn failure(&self) -> Option<String> {
        let mut failures = Vec::new();
        for (i, result) in self.results().enumerate() {
            let status = result
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if status != "applied" {
                let errors = result
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|errs| {
                        errs.iter()
                            .filter_map(|e| e.get("id").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                if errors.is_empty() {
                    failures.push(format!("content #{} {}", i, status));
                } else {
                    failures.push(format!("content #{} {}: {}", i, status, errors));
                }
            }
        }
        if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        }
    }
}
