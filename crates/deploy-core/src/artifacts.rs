//! On-disk build artifact store: one `<output>/<contract>.json` per contract.
//!
//! Writers of the same contract name are serialized by a per-name lock so the
//! source-path check and the write happen as one step.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use lambda_deploy_types::BuildArtifact;

use crate::error::DeployError;
use crate::paths::{artifact_path, atomic_write_json};

pub struct ArtifactStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, contract_name: &str) -> PathBuf {
        artifact_path(&self.dir, contract_name)
    }

    fn lock_for(&self, contract_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(contract_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn read(&self, contract_name: &str) -> Result<Option<BuildArtifact>, DeployError> {
        let path = self.path_for(contract_name);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| DeployError::io(&path, e))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| DeployError::serialization(format!("artifact {}", path.display()), e))
    }

    /// Read an artifact that must exist.
    pub fn require(&self, contract_name: &str) -> Result<BuildArtifact, DeployError> {
        self.read(contract_name)?
            .ok_or_else(|| DeployError::ArtifactMissing {
                contract_name: contract_name.to_string(),
                path: self.path_for(contract_name),
            })
    }

    /// Fail if an artifact of this name exists for a different source.
    /// Returns the existing artifact, if any.
    pub fn check_source(
        &self,
        contract_name: &str,
        source_path: &str,
    ) -> Result<Option<BuildArtifact>, DeployError> {
        let existing = self.read(contract_name)?;
        if let Some(existing) = &existing {
            if existing.source_path != source_path {
                return Err(DeployError::ArtifactConflict {
                    contract_name: contract_name.to_string(),
                    existing_source: existing.source_path.clone(),
                    requested_source: source_path.to_string(),
                });
            }
        }
        Ok(existing)
    }

    /// Write a freshly compiled artifact.
    ///
    /// Overwrites an artifact from the same source, keeping its deployment
    /// records. Refuses to touch one from a different source.
    pub fn write(&self, mut artifact: BuildArtifact) -> Result<BuildArtifact, DeployError> {
        let lock = self.lock_for(&artifact.contract_name);
        let _guard = lock.lock();

        if let Some(existing) = self.check_source(&artifact.contract_name, &artifact.source_path)? {
            debug!(
                contract = %artifact.contract_name,
                networks = existing.networks.len(),
                "overwriting artifact from same source"
            );
            artifact.networks = existing.networks;
            artifact.previous_deployments = existing.previous_deployments;
        }

        let path = self.path_for(&artifact.contract_name);
        atomic_write_json(&path, &artifact)?;
        info!(contract = %artifact.contract_name, path = %path.display(), "artifact written");
        Ok(artifact)
    }

    /// Record a deployed address without touching the compiled code.
    ///
    /// With `allow_redeploy`, an existing address for the network is moved to
    /// the artifact's previous deployments; without it, it is an error.
    pub fn record_deployment(
        &self,
        contract_name: &str,
        network: &str,
        address: &str,
        allow_redeploy: bool,
    ) -> Result<BuildArtifact, DeployError> {
        let lock = self.lock_for(contract_name);
        let _guard = lock.lock();

        let mut artifact = self.require(contract_name)?;
        if let Some(existing) = artifact.address_on(network) {
            if existing == address {
                return Ok(artifact);
            }
            if !allow_redeploy {
                return Err(DeployError::AlreadyDeployed {
                    contract_name: contract_name.to_string(),
                    network: network.to_string(),
                    address: existing.to_string(),
                });
            }
        }
        artifact.record_address(network, address);
        atomic_write_json(&self.path_for(contract_name), &artifact)?;
        info!(contract = contract_name, network, address, "deployment recorded");
        Ok(artifact)
    }
}
