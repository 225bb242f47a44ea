use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lambda_deploy_types::{Block, BlockId, OperationHandle, OperationPayload};

use crate::octez::OctezClient;
use crate::rpc::RpcClient;

/// The account that signs submissions. Passed explicitly to every submit call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerIdentity {
    /// Key alias known to the injector.
    pub alias: String,
    /// Public key hash (`tz1...`).
    pub address: String,
}

impl SignerIdentity {
    pub fn new(alias: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            address: address.into(),
        }
    }
}

/// What the pipeline needs from a chain node.
///
/// Submissions return as soon as the operation is injected. Whether and where
/// it was included is found by reading blocks.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Inject one atomic operation group. A group is either a single
    /// origination or any number of transfers and entrypoint calls.
    async fn submit_batch(
        &self,
        signer: &SignerIdentity,
        ops: &[OperationPayload],
    ) -> Result<OperationHandle>;

    async fn get_block(&self, id: BlockId) -> Result<Block>;

    async fn get_contract_storage(&self, address: &str) -> Result<Value>;

    async fn originate(
        &self,
        signer: &SignerIdentity,
        code: &Value,
        storage: &Value,
    ) -> Result<OperationHandle> {
        self.submit_batch(
            signer,
            &[OperationPayload::Origination {
                code: code.clone(),
                storage: storage.clone(),
                balance_mutez: 0,
            }],
        )
        .await
    }
}

/// A real node: reads over HTTP RPC, writes through `octez-client`.
#[derive(Clone)]
pub struct NodeLedger {
    rpc: RpcClient,
    octez: OctezClient,
}

impl NodeLedger {
    pub fn new(rpc: RpcClient, octez: OctezClient) -> Self {
        Self { rpc, octez }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn octez(&self) -> &OctezClient {
        &self.octez
    }
}

#[async_trait]
impl Ledger for NodeLedger {
    async fn submit_batch(
        &self,
        signer: &SignerIdentity,
        ops: &[OperationPayload],
    ) -> Result<OperationHandle> {
        let hash = match ops {
            [] => bail!("refusing to submit an empty operation group"),
            [OperationPayload::Origination {
                code,
                storage,
                balance_mutez,
            }] => {
                self.octez
                    .originate(signer, code, storage, *balance_mutez)
                    .await?
            }
            _ => self.octez.multiple_transfers(signer, ops).await?,
        };
        Ok(OperationHandle::new(hash))
    }

    async fn get_block(&self, id: BlockId) -> Result<Block> {
        let rpc = self.rpc.clone();
        tokio::task::spawn_blocking(move || rpc.get_block(id))
            .await
            .map_err(|e| anyhow!("block read task failed: {}", e))?
    }

    async fn get_contract_storage(&self, address: &str) -> Result<Value> {
        let rpc = self.rpc.clone();
        let address = address.to_string();
        tokio::task::spawn_blocking(move || rpc.get_contract_storage(&address))
            .await
            .map_err(|e| anyhow!("storage read task failed: {}", e))?
            .context("read contract storage")
    }
}
