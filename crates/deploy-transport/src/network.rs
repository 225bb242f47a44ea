use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

const SANDBOX_RPC: &str = "http://localhost:20000";
const TESTNET_RPC: &str = "https://testnet-tezos.giganode.io:443";
const MAINNET_RPC: &str = "https://mainnet-tezos.giganode.io:443";

/// Name of the env var that overrides the endpoint for `network`.
pub fn endpoint_env_var(network: &str) -> String {
    format!(
        "LAMBDA_DEPLOY_RPC_{}",
        network.to_ascii_uppercase().replace('-', "_")
    )
}

pub fn default_endpoint(network: &str) -> Option<&'static str> {
    match network {
        "sandbox" => Some(SANDBOX_RPC),
        "testnet" => Some(TESTNET_RPC),
        "mainnet" => Some(MAINNET_RPC),
        _ => None,
    }
}

pub fn default_endpoints() -> BTreeMap<String, String> {
    ["sandbox", "testnet", "mainnet"]
        .iter()
        .filter_map(|n| default_endpoint(n).map(|url| (n.to_string(), url.to_string())))
        .collect()
}

/// Resolve the RPC endpoint for a network: env override, then configured
/// endpoints, then built-in defaults.
pub fn resolve_endpoint(network: &str, configured: &BTreeMap<String, String>) -> Result<String> {
    let network = network.to_ascii_lowercase();
    if let Ok(value) = std::env::var(endpoint_env_var(&network)) {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    if let Some(url) = configured.get(&network) {
        return Ok(url.clone());
    }
    default_endpoint(&network)
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "unknown network '{}' (configured: {})",
                network,
                configured.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
}

pub fn infer_network_from_url(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    if lower.contains("testnet") {
        Some("testnet")
    } else if lower.contains("mainnet") {
        Some("mainnet")
    } else if lower.contains("localhost") || lower.contains("127.0.0.1") {
        Some("sandbox")
    } else {
        None
    }
}
