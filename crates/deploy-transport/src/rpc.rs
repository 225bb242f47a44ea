//! Blocking client for the node's HTTP RPC.
//!
//! Only two read paths are used:
//! - `GET /chains/main/blocks/<head|level>`
//! - `GET /chains/main/blocks/head/context/contracts/<address>/storage`

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::time::Duration;

use lambda_deploy_types::{Block, BlockId, OperationEntry};

/// Node RPC client.
#[derive(Clone)]
pub struct RpcClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl RpcClient {
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(timeout)
            .timeout_connect(connect_timeout)
            .build()
    }

    /// Create a client with default timeouts.
    pub fn new(endpoint: &str) -> Self {
        Self::with_timeouts(
            endpoint,
            Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(Self::DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Create a client with explicit timeouts.
    pub fn with_timeouts(endpoint: &str, timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent: Self::build_agent(timeout, connect_timeout),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.endpoint, path);
        self.agent
            .get(&url)
            .call()
            .map_err(|e| anyhow!("RPC request to {} failed: {}", url, e))?
            .into_json()
            .with_context(|| format!("failed to parse RPC response from {}", url))
    }

    /// Read a block by level or the current head.
    pub fn get_block(&self, id: BlockId) -> Result<Block> {
        let raw = self.get_json(&format!("/chains/main/blocks/{}", id))?;
        parse_block(&raw).with_context(|| format!("malformed block {}", id))
    }

    /// Level of the current head.
    pub fn head_level(&self) -> Result<u64> {
        let header = self.get_json("/chains/main/blocks/head/header")?;
        header
            .get("level")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("head header has no level"))
    }

    /// Current storage of a contract, as Micheline JSON.
    pub fn get_contract_storage(&self, address: &str) -> Result<Value> {
        self.get_json(&format!(
            "/chains/main/blocks/head/context/contracts/{}/storage",
            address
        ))
    }
}

/// Reduce a full block response to [`Block`].
pub fn parse_block(raw: &Value) -> Result<Block> {
    let level = raw
        .pointer("/header/level")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("missing header.level"))?;
    let hash = raw
        .get("hash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut operations = Vec::new();
    if let Some(passes) = raw.get("operations").and_then(Value::as_array) {
        for pass in passes {
            let entries = pass
                .as_array()
                .map(|ops| {
                    ops.iter()
                        .filter_map(|op| {
                            let hash = op.get("hash").and_then(Value::as_str)?;
                            let contents = op
                                .get("contents")
                                .and_then(Value::as_array)
                                .cloned()
                                .unwrap_or_default();
                            Some(OperationEntry {
                                hash: hash.to_string(),
                                contents,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            operations.push(entries);
        }
    }

    Ok(Block {
        level,
        hash,
        operations,
    })
}
