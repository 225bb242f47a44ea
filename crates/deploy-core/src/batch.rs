//! Batch submitter: split an ordered operation list into bounded groups and
//! submit each group as one atomic operation.

use tracing::{info, warn};

use lambda_deploy_transport::{Ledger, SignerIdentity};
use lambda_deploy_types::{InclusionRecord, OperationHandle, OperationPayload};

use crate::confirmation::{confirm, ConfirmOptions};
use crate::error::{BatchError, DeployError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Group N+1 is submitted only after group N is confirmed.
    #[default]
    Sequential,
    /// Submit every group, then confirm them in order.
    Independent,
}

/// Split `items` into consecutive groups of at most `max_per_batch`.
///
/// A group closes when the running count is a multiple of `max_per_batch` or
/// the list ends, so the last partial group is closed too.
pub fn chunk<T: Clone>(items: &[T], max_per_batch: usize) -> Result<Vec<Vec<T>>, DeployError> {
    if max_per_batch == 0 {
        return Err(DeployError::configuration("max operations per batch must be at least 1"));
    }
    let mut groups = Vec::with_capacity(items.len().div_ceil(max_per_batch));
    let mut current = Vec::with_capacity(max_per_batch);
    for (i, item) in items.iter().enumerate() {
        current.push(item.clone());
        let count = i + 1;
        if count % max_per_batch == 0 || count == items.len() {
            groups.push(std::mem::take(&mut current));
        }
    }
    Ok(groups)
}

/// Check an inclusion for a failed application.
pub fn ensure_applied(
    handle: &OperationHandle,
    record: &InclusionRecord,
) -> Result<(), DeployError> {
    match record.failure() {
        Some(reason) => Err(DeployError::rejection(Some(handle), reason)),
        None => Ok(()),
    }
}

pub struct BatchSubmitter<'a> {
    ledger: &'a dyn Ledger,
    signer: &'a SignerIdentity,
    confirm: ConfirmOptions,
    mode: BatchMode,
}

impl<'a> BatchSubmitter<'a> {
    pub fn new(ledger: &'a dyn Ledger, signer: &'a SignerIdentity, confirm: ConfirmOptions) -> Self {
        Self {
            ledger,
            signer,
            confirm,
            mode: BatchMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    async fn confirm_group(&self, handle: &OperationHandle) -> Result<(), DeployError> {
        let record = confirm(self.ledger, handle, &self.confirm).await?;
        ensure_applied(handle, &record)
    }

    /// Submit `ops` in groups of at most `max_per_batch`, one handle per group.
    ///
    /// Stops at the first failing group. Groups already confirmed are
    /// returned in the error and are not rolled back.
    pub async fn submit(
        &self,
        label: &str,
        ops: &[OperationPayload],
        max_per_batch: usize,
    ) -> Result<Vec<OperationHandle>, BatchError> {
        let groups = chunk(ops, max_per_batch).map_err(|error| BatchError {
            confirmed: Vec::new(),
            failed_group: 0,
            error,
        })?;
        match self.mode {
            BatchMode::Sequential => self.submit_sequential(label, ops.len(), groups).await,
            BatchMode::Independent => self.submit_independent(label, ops.len(), groups).await,
        }
    }

    async fn submit_sequential(
        &self,
        label: &str,
        total: usize,
        groups: Vec<Vec<OperationPayload>>,
    ) -> Result<Vec<OperationHandle>, BatchError> {
        let mut confirmed = Vec::with_capacity(groups.len());
        let mut sent = 0;
        for (group_index, group) in groups.iter().enumerate() {
            let outcome = async {
                let handle = self
                    .ledger
                    .submit_batch(self.signer, group)
                    .await
                    .map_err(|e| DeployError::rejection(None, format!("{:#}", e)))?;
                self.confirm_group(&handle).await?;
                Ok::<_, DeployError>(handle)
            }
            .await;
            match outcome {
                Ok(handle) => {
                    sent += group.len();
                    info!(batch = label, op_hash = %handle.hash, progress = %format!("{}/{}", sent, total), "batch confirmed");
                    confirmed.push(handle);
                }
                Err(error) => {
                    warn!(batch = label, group = group_index, error = %error, "batch failed");
                    return Err(BatchError {
                        confirmed,
                        failed_group: group_index,
                        error,
                    });
                }
            }
        }
        Ok(confirmed)
    }

    async fn submit_independent(
        &self,
        label: &str,
        total: usize,
        groups: Vec<Vec<OperationPayload>>,
    ) -> Result<Vec<OperationHandle>, BatchError> {
        let mut submitted = Vec::with_capacity(groups.len());
        let mut submit_error = None;
        for (group_index, group) in groups.iter().enumerate() {
            match self.ledger.submit_batch(self.signer, group).await {
                Ok(handle) => submitted.push((handle, group.len())),
                Err(e) => {
                    submit_error = Some((
                        group_index,
                        DeployError::rejection(None, format!("{:#}", e)),
                    ));
                    break;
                }
            }
        }

        // Confirm what made it out, even when a later group was refused.
        let mut confirmed = Vec::with_capacity(submitted.len());
        let mut sent = 0;
        for (group_index, (handle, len)) in submitted.into_iter().enumerate() {
            if let Err(error) = self.confirm_group(&handle).await {
                warn!(batch = label, group = group_index, error = %error, "batch failed");
                return Err(BatchError {
                    confirmed,
                    failed_group: group_index,
                    error,
                });
            }
            sent += len;
            info!(batch = label, op_hash = %handle.hash, progress = %format!("{}/{}", sent, total), "batch confirmed");
            confirmed.push(handle);
        }

        match submit_error {
            Some((failed_group, error)) => {
                warn!(batch = label, group = failed_group, error = %error, "batch refused");
                Err(BatchError {
                    confirmed,
                    failed_group,
                    error,
                })
            }
            None => Ok(confirmed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLedger;
    use std::time::Duration;

    fn signer() -> SignerIdentity {
        SignerIdentity::new("deployer", "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb")
    }

    fn call(entrypoint: &str, index: u32) -> OperationPayload {
        OperationPayload::EntrypointCall {
            destination: "KT1PWx2mnDueood7fEmfbBDKx1D9BAnnXitn".to_string(),
            entrypoint: entrypoint.to_string(),
            arg: lambda_deploy_types::micheline::pair_bytes_index(&[0x05], index),
            amount_mutez: 0,
        }
    }

    fn options() -> ConfirmOptions {
        ConfirmOptions::new(Duration::from_secs(10))
    }

    #[test]
    fn test_chunk_sizes_and_concatenation() {
        for len in 0..20usize {
            for max in 1..7usize {
                let items: Vec<usize> = (0..len).collect();
                let groups = chunk(&items, max).unwrap();
                assert_eq!(groups.len(), len.div_ceil(max), "len={} max={}", len, max);
                assert!(groups.iter().all(|g| !g.is_empty() && g.len() <= max));
                let flat: Vec<usize> = groups.into_iter().flatten().collect();
                assert_eq!(flat, items);
            }
        }
    }

    #[test]
    fn test_chunk_rejects_zero() {
        assert_eq!(chunk(&[1, 2], 0).unwrap_err().category(), "configuration");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_handle_per_group_in_order() {
        let ledger = MockLedger::new(10).advancing_every_head_read().auto_include();
        let signer = signer();
        let ops: Vec<_> = (0..5).map(|i| call("set_token_function", i)).collect();

        let handles = BatchSubmitter::new(&ledger, &signer, options())
            .submit("Token", &ops, 2)
            .await
            .unwrap();
        assert_eq!(handles.len(), 3);

        let submissions = ledger.submissions();
        let sizes: Vec<usize> = submissions.iter().map(|s| s.ops.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let flat: Vec<OperationPayload> = submissions.into_iter().flat_map(|s| s.ops).collect();
        assert_eq!(flat, ops);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_stops_at_rejected_group() {
        let ledger = MockLedger::new(10).advancing_every_head_read().auto_include();
        ledger.reject_entrypoint("set_dex_function");
        let signer = signer();
        let ops = vec![
            call("set_admin_function", 0),
            call("set_admin_function", 1),
            call("set_dex_function", 0),
            call("set_admin_function", 2),
        ];

        let err = BatchSubmitter::new(&ledger, &signer, options())
            .submit("mixed", &ops, 2)
            .await
            .unwrap_err();
        assert_eq!(err.confirmed.len(), 1);
        assert_eq!(err.failed_group, 1);
        assert_eq!(err.error.category(), "ledger_rejection");
        // Nothing after the failing group was sent.
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_application_is_a_rejection() {
        let ledger = MockLedger::new(10).auto_include();
        ledger.fail_entrypoint_on_chain("set_dex_function");
        let signer = signer();
        let err = BatchSubmitter::new(&ledger, &signer, options())
            .submit("Dex", &[call("set_dex_function", 0)], 8)
            .await
            .unwrap_err();
        assert!(err.confirmed.is_empty());
        assert_eq!(err.error.category(), "ledger_rejection");
        assert!(err.error.to_string().contains("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_submits_before_confirming() {
        let ledger = MockLedger::new(10).auto_include();
        let signer = signer();
        let ops: Vec<_> = (0..4).map(|i| call("set_dex_function", i)).collect();
        let handles = BatchSubmitter::new(&ledger, &signer, options())
            .with_mode(BatchMode::Independent)
            .submit("Dex", &ops, 1)
            .await
            .unwrap();
        assert_eq!(handles.len(), 4);
        // All four land in the same block because nothing waited in between.
        assert_eq!(ledger.head(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_as_unknown_outcome() {
        let ledger = MockLedger::new(10).advancing_every_head_read();
        let signer = signer();
        let err = BatchSubmitter::new(&ledger, &signer, ConfirmOptions::new(Duration::from_secs(2)))
            .submit("Admin", &[call("set_admin_function", 0)], 8)
            .await
            .unwrap_err();
        assert_eq!(err.error.category(), "timeout");
        assert!(err.error.is_indeterminate());
    }
}
