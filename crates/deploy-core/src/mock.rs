//! In-memory [`Ledger`] for tests.
//!
//! Submissions get sequential hashes and are recorded. Inclusion is either
//! scheduled explicitly ([`MockLedger::include_at`]) or automatic at the
//! current head ([`MockLedger::auto_include`]). Originated contracts start
//! with the storage they were originated with.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use lambda_deploy_transport::{Ledger, SignerIdentity};
use lambda_deploy_types::{Block, BlockId, OperationEntry, OperationHandle, OperationPayload};

#[derive(Debug, Clone)]
pub struct Submission {
    pub signer: SignerIdentity,
    pub hash: String,
    pub ops: Vec<OperationPayload>,
}

#[derive(Default)]
struct MockState {
    head: u64,
    advance_on_head_read: bool,
    auto_include: bool,
    next_id: u64,
    entries: HashMap<String, OperationEntry>,
    included: HashMap<String, u64>,
    submissions: Vec<Submission>,
    fail_reads: usize,
    fail_level_reads: usize,
    fail_level_at: HashSet<u64>,
    levels_read: Vec<u64>,
    rejected_entrypoints: HashSet<String>,
    failing_entrypoints: HashSet<String>,
    storage: HashMap<String, Value>,
}

pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                head,
                ..MockState::default()
            }),
        }
    }

    /// Every head read moves the head one block forward.
    pub fn advancing_every_head_read(self) -> Self {
        self.state.lock().advance_on_head_read = true;
        self
    }

    /// Include every submission in the block at the head current at submit time.
    pub fn auto_include(self) -> Self {
        self.state.lock().auto_include = true;
        self
    }

    /// Submissions containing a call to `entrypoint` are refused at injection.
    pub fn reject_entrypoint(&self, entrypoint: &str) {
        self.state
            .lock()
            .rejected_entrypoints
            .insert(entrypoint.to_string());
    }

    /// Calls to `entrypoint` are included with a `failed` result.
    pub fn fail_entrypoint_on_chain(&self, entrypoint: &str) {
        self.state
            .lock()
            .failing_entrypoints
            .insert(entrypoint.to_string());
    }

    pub fn include_at(&self, hash: &str, level: u64) {
        let mut state = self.state.lock();
        state
            .entries
            .entry(hash.to_string())
            .or_insert_with(|| OperationEntry {
                hash: hash.to_string(),
                contents: Vec::new(),
            });
        state.included.insert(hash.to_string(), level);
    }

    /// The next `n` block reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().fail_reads = n;
    }

    /// The next `n` reads by level fail; head reads are unaffected.
    pub fn fail_next_level_reads(&self, n: usize) {
        self.state.lock().fail_level_reads = n;
    }

    /// The first read of `level` fails.
    pub fn fail_level_read_at(&self, level: u64) {
        self.state.lock().fail_level_at.insert(level);
    }

    /// Replace a contract's storage, as a later call to it would.
    pub fn set_storage(&self, address: &str, storage: Value) {
        self.state
            .lock()
            .storage
            .insert(address.to_string(), storage);
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    /// Levels read by number (head reads are not recorded), in read order.
    pub fn levels_read(&self) -> Vec<u64> {
        self.state.lock().levels_read.clone()
    }

    fn content_for(state: &MockState, id: u64, op: &OperationPayload) -> Value {
        match op {
            OperationPayload::Origination { .. } => json!({
                "kind": "origination",
                "metadata": { "operation_result": {
                    "status": "applied",
                    "originated_contracts": [format!("KT1Mock{:029}", id)]
                } }
            }),
            OperationPayload::EntrypointCall {
                destination,
                entrypoint,
                ..
            } => {
                let status = if state.failing_entrypoints.contains(entrypoint) {
                    "failed"
                } else {
                    "applied"
                };
                json!({
                    "kind": "transaction",
                    "destination": destination,
                    "parameters": { "entrypoint": entrypoint },
                    "metadata": { "operation_result": { "status": status } }
                })
            }
            OperationPayload::Transfer { destination, .. } => json!({
                "kind": "transaction",
                "destination": destination,
                "metadata": { "operation_result": { "status": "applied" } }
            }),
        }
    }

    fn block_at(state: &MockState, level: u64) -> Block {
        let mut manager_ops: Vec<OperationEntry> = state
            .included
            .iter()
            .filter(|(_, l)| **l == level)
            .filter_map(|(hash, _)| state.entries.get(hash).cloned())
            .collect();
        manager_ops.sort_by(|a, b| a.hash.cmp(&b.hash));
        Block {
            level,
            hash: format!("BLMock{}", level),
            operations: vec![vec![], vec![], vec![], manager_ops],
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn submit_batch(
        &self,
        signer: &SignerIdentity,
        ops: &[OperationPayload],
    ) -> Result<OperationHandle> {
        let mut state = self.state.lock();
        if ops.is_empty() {
            bail!("refusing to submit an empty operation group");
        }
        if let Some(rejected) = ops.iter().find_map(|op| match op {
            OperationPayload::EntrypointCall { entrypoint, .. }
                if state.rejected_entrypoints.contains(entrypoint) =>
            {
                Some(entrypoint.clone())
            }
            _ => None,
        }) {
            bail!("script_rejected: {}", rejected);
        }

        state.next_id += 1;
        let id = state.next_id;
        let hash = format!("ooMock{:03}", id);
        let contents = ops
            .iter()
            .map(|op| Self::content_for(&state, id, op))
            .collect();
        for op in ops {
            if let OperationPayload::Origination { storage, .. } = op {
                state.storage.insert(format!("KT1Mock{:029}", id), storage.clone());
            }
        }
        state.entries.insert(
            hash.clone(),
            OperationEntry {
                hash: hash.clone(),
                contents,
            },
        );
        if state.auto_include {
            let head = state.head;
            state.included.insert(hash.clone(), head);
        }
        state.submissions.push(Submission {
            signer: signer.clone(),
            hash: hash.clone(),
            ops: ops.to_vec(),
        });
        Ok(OperationHandle::new(hash))
    }

    async fn get_block(&self, id: BlockId) -> Result<Block> {
        let mut state = self.state.lock();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            bail!("connection reset by peer");
        }
        match id {
            BlockId::Head => {
                let block = Self::block_at(&state, state.head);
                if state.advance_on_head_read {
                    state.head += 1;
                }
                Ok(block)
            }
            BlockId::Level(level) => {
                if level > state.head {
                    return Err(anyhow!("block {} not found", level));
                }
                if state.fail_level_reads > 0 {
                    state.fail_level_reads -= 1;
                    bail!("connection reset by peer");
                }
                if state.fail_level_at.remove(&level) {
                    bail!("timed out reading block {}", level);
                }
                state.levels_read.push(level);
                Ok(Self::block_at(&state, level))
            }
        }
    }

    async fn get_contract_storage(&self, address: &str) -> Result<Value> {
        self.state
            .lock()
            .storage
            .get(address)
            .cloned()
            .ok_or_else(|| anyhow!("contract {} not found", address))
    }
}
