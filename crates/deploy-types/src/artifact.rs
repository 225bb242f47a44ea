//! Build artifact: one JSON file per compiled contract.
//!
//! ```json
//! {
//!   "contractName": "dex",
//!   "sourcePath": "contracts/main/dex.ligo",
//!   "updatedAt": "2022-01-20T10:00:00Z",
//!   "compiler": { "name": "ligo", "version": "0.31.0" },
//!   "networks": { "sandbox": { "dex": "KT1..." } },
//!   "michelson": [ ... ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInfo {
    pub name: String,
    pub version: String,
}

impl CompilerInfo {
    pub fn ligo(version: impl Into<String>) -> Self {
        Self {
            name: "ligo".to_string(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub contract_name: String,
    /// Source path relative to the working directory.
    pub source_path: String,
    pub updated_at: DateTime<Utc>,
    pub compiler: CompilerInfo,
    /// SHA-256 of the source text at compile time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    /// network -> { contract name -> address }
    #[serde(default)]
    pub networks: BTreeMap<String, BTreeMap<String, String>>,
    /// network -> addresses replaced by an explicit redeploy, oldest first.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub previous_deployments: BTreeMap<String, Vec<String>>,
    pub michelson: Value,
}

impl BuildArtifact {
    pub fn new(
        contract_name: impl Into<String>,
        source_path: impl Into<String>,
        compiler: CompilerInfo,
        michelson: Value,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            source_path: source_path.into(),
            updated_at: Utc::now(),
            compiler,
            source_hash: None,
            networks: BTreeMap::new(),
            previous_deployments: BTreeMap::new(),
            michelson,
        }
    }

    /// Address this contract was deployed at on `network`, if any.
    pub fn address_on(&self, network: &str) -> Option<&str> {
        self.networks
            .get(network)
            .and_then(|m| m.get(&self.contract_name))
            .map(String::as_str)
    }

    /// Record a deployment. An address already recorded for the network is
    /// moved to `previous_deployments` rather than dropped.
    pub fn record_address(&mut self, network: &str, address: impl Into<String>) {
        let contract_name = self.contract_name.clone();
        let entry = self.networks.entry(network.to_string()).or_default();
        if let Some(old) = entry.insert(contract_name, address.into()) {
            self.previous_deployments
                .entry(network.to_string())
                .or_default()
                .push(old);
        }
    }

    /// Mark the artifact as rebuilt now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether this artifact was built from exactly this source and compiler.
    pub fn is_up_to_date(&self, source_path: &str, compiler_version: &str, source_hash: &str) -> bool {
        self.source_path == source_path
            && self.compiler.version == compiler_version
            && self.source_hash.as_deref() == Some(source_hash)
    }
}
