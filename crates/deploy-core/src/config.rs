//! Deployment configuration.
//!
//! Loaded from YAML (`deploy.yaml` by default), then overridden by environment
//! variables, then by CLI flags in the binary. Every field has a default, so an
//! absent file is equivalent to an empty one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lambda_deploy_transport::network::default_endpoints;
use lambda_deploy_types::LambdaType;

use crate::confirmation::ConfirmOptions;
use crate::error::DeployError;

pub const DEFAULT_CONFIG_FILE: &str = "deploy.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub sync_interval_ms: u64,
    pub timeout_ms: u64,
    pub lookback_blocks: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 500,
            timeout_ms: 150_000,
            lookback_blocks: 3,
        }
    }
}

impl ConfirmationConfig {
    pub fn to_options(&self) -> ConfirmOptions {
        ConfirmOptions::new(Duration::from_millis(self.timeout_ms))
            .with_sync_interval(Duration::from_millis(self.sync_interval_ms))
            .with_lookback(self.lookback_blocks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub ligo_version: String,
    pub preferred_ligo_flavor: String,
    pub ligo_local_path: String,
    pub dockerized_ligo: bool,
    pub docker_path: String,
    pub protocol: String,
    pub contracts_directory: PathBuf,
    pub output_directory: PathBuf,
    pub storage_directory: PathBuf,
    pub deploy_network: String,
    /// network name -> RPC endpoint
    pub networks: BTreeMap<String, String>,
    pub octez_client_path: String,
    pub octez_base_dir: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub deployer_sk: Option<String>,
    pub compile_concurrency: usize,
    pub compile_timeout_secs: u64,
    pub confirmation: ConfirmationConfig,
    /// lambda type name (or `default`) -> max operations per batch
    pub batch_sizes: BTreeMap<String, usize>,
    /// Descriptors skipped when compiling against a factory contract.
    pub factory_excluded_lambdas: Vec<String>,
    pub burn_cap: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        let batch_sizes = [("Admin", 8), ("Token", 5), ("Dex", 8), ("default", 8)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        Self {
            ligo_version: "0.31.0".to_string(),
            preferred_ligo_flavor: "pascaligo".to_string(),
            ligo_local_path: "ligo".to_string(),
            dockerized_ligo: true,
            docker_path: "docker".to_string(),
            protocol: "hangzhou".to_string(),
            contracts_directory: PathBuf::from("contracts/main"),
            output_directory: PathBuf::from("build"),
            storage_directory: PathBuf::from("storage"),
            deploy_network: "sandbox".to_string(),
            networks: default_endpoints(),
            octez_client_path: "octez-client".to_string(),
            octez_base_dir: None,
            deployer_sk: None,
            compile_concurrency: 4,
            compile_timeout_secs: 300,
            confirmation: ConfirmationConfig::default(),
            batch_sizes,
            factory_excluded_lambdas: vec!["add_pool".to_string()],
            burn_cap: "20".to_string(),
        }
    }
}

impl DeployConfig {
    /// Load configuration. An explicit path must exist; the default
    /// `deploy.yaml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| DeployError::io(&path, e))?;
            Self::from_yaml(&raw)?
        } else if required {
            return Err(DeployError::configuration(format!(
                "config file {} not found",
                path.display()
            )));
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DeployError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(raw)
            .map_err(|e| DeployError::serialization("deploy config", e))?;
        // Partial maps extend the defaults instead of replacing them.
        let defaults = Self::default();
        for (k, v) in defaults.batch_sizes {
            config.batch_sizes.entry(k).or_insert(v);
        }
        for (k, v) in defaults.networks {
            config.networks.entry(k).or_insert(v);
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(version) = lookup("LIGO_VERSION").filter(|v| !v.trim().is_empty()) {
            self.ligo_version = version.trim().to_string();
        }
        if let Some(raw) = lookup("DOCKERIZED_LIGO") {
            self.dockerized_ligo = parse_bool(&raw).ok_or_else(|| {
                DeployError::configuration(format!("DOCKERIZED_LIGO must be a boolean, got '{}'", raw))
            })?;
        }
        if let Some(network) = lookup("DEPLOY_NETWORK").filter(|v| !v.trim().is_empty()) {
            self.deploy_network = network.trim().to_lowercase();
        }
        if let Some(sk) = lookup("DEPLOYER_SK").filter(|v| !v.trim().is_empty()) {
            self.deployer_sk = Some(sk.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.compile_concurrency == 0 {
            return Err(DeployError::configuration("compile_concurrency must be at least 1"));
        }
        if self.confirmation.sync_interval_ms == 0 {
            return Err(DeployError::configuration(
                "confirmation.sync_interval_ms must be positive",
            ));
        }
        if let Some((name, _)) = self.batch_sizes.iter().find(|(_, size)| **size == 0) {
            return Err(DeployError::configuration(format!(
                "batch size for {} must be at least 1",
                name
            )));
        }
        Ok(())
    }

    /// Max operations per batch when uploading `lambda_type`.
    pub fn batch_size(&self, lambda_type: LambdaType) -> usize {
        self.batch_sizes
            .get(lambda_type.as_str())
            .or_else(|| self.batch_sizes.get("default"))
            .copied()
            .unwrap_or(8)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    /// Where function tables are written: `<output>/lambdas`.
    pub fn lambdas_directory(&self) -> PathBuf {
        self.output_directory.join("lambdas")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
