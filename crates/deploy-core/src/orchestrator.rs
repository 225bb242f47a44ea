//! Deployment orchestrator: originate a compiled contract, then wire its
//! function tables in through the batch submitter.
//!
//! All ledger access goes through the [`DeployContext`] handed to each call,
//! which carries the signer explicitly.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use lambda_deploy_transport::{Ledger, SignerIdentity};
use lambda_deploy_types::{FunctionTables, LambdaType, OperationHandle};

use crate::artifacts::ArtifactStore;
use crate::batch::{ensure_applied, BatchMode, BatchSubmitter};
use crate::confirmation::{confirm, ConfirmOptions};
use crate::error::DeployError;

#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub contract_name: String,
    pub network: String,
    pub address: String,
    pub operation: String,
    pub block_level: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableUpload {
    pub lambda_type: LambdaType,
    pub fragments: usize,
    pub operations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub deployment: Deployment,
    pub tables: Vec<TableUpload>,
}

/// Everything one deployment run needs. Each run builds its own.
#[derive(Clone)]
pub struct DeployContext {
    pub ledger: Arc<dyn Ledger>,
    pub signer: SignerIdentity,
    pub network: String,
    pub store: Arc<ArtifactStore>,
    pub confirm: ConfirmOptions,
    pub batch_mode: BatchMode,
    /// Allow replacing an address already recorded for the network.
    pub redeploy: bool,
}

impl DeployContext {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: SignerIdentity,
        network: impl Into<String>,
        store: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            ledger,
            signer,
            network: network.into(),
            store,
            confirm: ConfirmOptions::default(),
            batch_mode: BatchMode::Sequential,
            redeploy: false,
        }
    }

    pub fn with_confirm(mut self, confirm: ConfirmOptions) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    /// Originate `contract_name` from its build artifact with `storage`.
    ///
    /// Not retried on rejection: a blind resubmission could deploy twice.
    pub async fn originate(
        &self,
        contract_name: &str,
        storage: Value,
    ) -> Result<Deployment, DeployError> {
        let artifact = self.store.require(contract_name)?;
        if let Some(existing) = artifact.address_on(&self.network) {
            if !self.redeploy {
                return Err(DeployError::AlreadyDeployed {
                    contract_name: contract_name.to_string(),
                    network: self.network.clone(),
                    address: existing.to_string(),
                });
            }
            warn!(contract = contract_name, network = %self.network, previous = existing, "redeploying");
        }
        let code = contract_code(contract_name, &artifact.michelson)?;

        info!(contract = contract_name, network = %self.network, signer = %self.signer.address, "originating");
        let handle = self
            .ledger
            .originate(&self.signer, &code, &storage)
            .await
            .map_err(|e| DeployError::rejection(None, format!("{:#}", e)))?;

        let record = confirm(self.ledger.as_ref(), &handle, &self.confirm).await?;
        ensure_applied(&handle, &record)?;
        let address = record.originated_contract().ok_or_else(|| {
            DeployError::rejection(Some(&handle), "no originated contract in operation result")
        })?;

        self.store
            .record_deployment(contract_name, &self.network, &address, self.redeploy)?;
        info!(contract = contract_name, address = %address, op_hash = %handle.hash, level = record.block_level, "originated");
        Ok(Deployment {
            contract_name: contract_name.to_string(),
            network: self.network.clone(),
            address,
            operation: handle.hash,
            block_level: record.block_level,
        })
    }

    /// Upload every table to `address`, Admin first, then Token, then Dex,
    /// then the rest. Stops at the first failing batch.
    pub async fn upload_tables<F>(
        &self,
        address: &str,
        tables: &FunctionTables,
        batch_size: F,
    ) -> Result<Vec<TableUpload>, DeployError>
    where
        F: Fn(LambdaType) -> usize,
    {
        let submitter = BatchSubmitter::new(self.ledger.as_ref(), &self.signer, self.confirm.clone())
            .with_mode(self.batch_mode);
        let mut uploads = Vec::new();
        for table in tables.in_upload_order() {
            if table.is_empty() {
                continue;
            }
            let ops = table.setter_calls(address);
            let max = batch_size(table.lambda_type);
            info!(lambda_type = %table.lambda_type, fragments = ops.len(), batch_size = max, "uploading function table");

            let handles = submitter
                .submit(table.lambda_type.as_str(), &ops, max)
                .await
                .map_err(|err| {
                    warn!(
                        lambda_type = %table.lambda_type,
                        confirmed_batches = err.confirmed.len(),
                        failed_batch = err.failed_group,
                        "table upload stopped; confirmed batches stay on chain"
                    );
                    DeployError::from(err)
                })?;
            uploads.push(TableUpload {
                lambda_type: table.lambda_type,
                fragments: table.len(),
                operations: handles.into_iter().map(|h: OperationHandle| h.hash).collect(),
            });
        }
        Ok(uploads)
    }

    /// Originate, then upload `tables` into the new contract.
    pub async fn deploy<F>(
        &self,
        contract_name: &str,
        storage: Value,
        tables: &FunctionTables,
        batch_size: F,
    ) -> Result<DeployReport, DeployError>
    where
        F: Fn(LambdaType) -> usize,
    {
        let deployment = self.originate(contract_name, storage).await?;
        let tables = self
            .upload_tables(&deployment.address, tables, batch_size)
            .await?;
        Ok(DeployReport { deployment, tables })
    }
}

/// Contract code as Micheline JSON. Artifacts written by older tooling hold
/// it as a JSON string.
fn contract_code(contract_name: &str, michelson: &Value) -> Result<Value, DeployError> {
    match michelson {
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| DeployError::serialization(format!("michelson of {}", contract_name), e)),
        Value::Array(_) => Ok(michelson.clone()),
        _ => Err(DeployError::serialization(
            format!("michelson of {}", contract_name),
            "expected a Micheline sequence",
        )),
    }
}
