//! Confirmation tracking: find the block that included a submitted operation.
//!
//! Each cycle reads the head, scans `[from, head]` oldest first, and on a miss
//! moves `from` to `head + 1` so no block is scanned twice. A failed block
//! read pins `from` at that block, so it is retried rather than skipped. The first window
//! starts a few blocks behind head to cover propagation delay and short reorgs.
//! Cycles are at least `sync_interval` apart, and the deadline is measured from
//! the first cycle.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use lambda_deploy_transport::Ledger;
use lambda_deploy_types::{BlockId, InclusionRecord, OperationHandle};

use crate::error::DeployError;

#[derive(Debug, Clone)]
pub struct ConfirmOptions {
    /// Start of the first window. Defaults to `head - lookback`.
    pub from_block_level: Option<u64>,
    pub timeout: Duration,
    pub sync_interval: Duration,
    pub lookback: u64,
    /// Raising this (sending `true`) abandons the wait.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl ConfirmOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            from_block_level: None,
            timeout,
            sync_interval: Duration::from_millis(500),
            lookback: 3,
            cancel: None,
        }
    }

    pub fn from_level(mut self, level: u64) -> Self {
        self.from_block_level = Some(level);
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_lookback(mut self, blocks: u64) -> Self {
        self.lookback = blocks;
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self::new(Duration::from_millis(150_000))
    }
}

/// Block heights scanned in one cycle, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationWindow {
    pub from: u64,
    pub to: u64,
}

enum ScanOutcome {
    Found(InclusionRecord),
    NotFound { window: ConfirmationWindow },
    /// Reading `level` failed; every level before it in `window` was scanned.
    ReadFailed {
        window: ConfirmationWindow,
        level: u64,
        error: anyhow::Error,
    },
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

async fn scan(
    ledger: &dyn Ledger,
    op_hash: &str,
    from: Option<u64>,
    lookback: u64,
) -> anyhow::Result<ScanOutcome> {
    let head = ledger.get_block(BlockId::Head).await?;
    let window = ConfirmationWindow {
        from: from.unwrap_or_else(|| head.level.saturating_sub(lookback)),
        to: head.level,
    };

    for level in window.from..=window.to {
        let block = if level == head.level {
            head.clone()
        } else {
            match ledger.get_block(BlockId::Level(level)).await {
                Ok(block) => block,
                Err(error) => return Ok(ScanOutcome::ReadFailed { window, level, error }),
            }
        };
        if let Some(entry) = block.find_operation(op_hash) {
            return Ok(ScanOutcome::Found(InclusionRecord {
                block_level: block.level,
                block_hash: block.hash.clone(),
                operation: entry.clone(),
            }));
        }
    }
    Ok(ScanOutcome::NotFound { window })
}

/// Wait until `handle` is included in a block.
///
/// Chain read failures count as "not found yet". Fails with
/// [`DeployError::Timeout`] once `options.timeout` has elapsed, or with
/// [`DeployError::Cancelled`] when the cancel signal is raised.
pub async fn confirm(
    ledger: &dyn Ledger,
    handle: &OperationHandle,
    options: &ConfirmOptions,
) -> Result<InclusionRecord, DeployError> {
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut from = options.from_block_level;
    let mut last_level = None;
    let mut cancel = options.cancel.clone();

    loop {
        if is_cancelled(&cancel) {
            return Err(DeployError::Cancelled {
                operation: handle.hash.clone(),
            });
        }
        if Instant::now() >= deadline {
            return Err(DeployError::Timeout {
                operation: handle.hash.clone(),
                waited_ms: started.elapsed().as_millis() as u64,
                last_level,
            });
        }

        let cycle_started = Instant::now();
        match scan(ledger, &handle.hash, from, options.lookback).await {
            Ok(ScanOutcome::Found(record)) => {
                info!(
                    op_hash = %handle.hash,
                    level = record.block_level,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "operation included"
                );
                return Ok(record);
            }
            Ok(ScanOutcome::NotFound { window }) => {
                debug!(op_hash = %handle.hash, from = window.from, to = window.to, "not found yet");
                last_level = Some(window.to);
                from = Some(window.to.saturating_add(1).max(window.from));
            }
            Ok(ScanOutcome::ReadFailed { window, level, error }) => {
                debug!(op_hash = %handle.hash, level, error = %error, "transient block read failure");
                last_level = Some(window.to);
                from = Some(level);
            }
            Err(err) => {
                debug!(op_hash = %handle.hash, error = %err, "transient head read failure");
            }
        }

        let wake_at = (cycle_started + options.sync_interval).min(deadline);
        let mut sender_dropped = false;
        match cancel.as_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(wake_at) => {}
                    changed = rx.changed() => sender_dropped = changed.is_err(),
                }
            }
            None => tokio::time::sleep_until(wake_at).await,
        }
        if sender_dropped {
            // A dropped sender can no longer cancel.
            cancel = None;
            tokio::time::sleep_until(wake_at).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLedger;
    use lambda_deploy_transport::SignerIdentity;
    use lambda_deploy_types::OperationPayload;

    fn signer() -> SignerIdentity {
        SignerIdentity::new("deployer", "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb")
    }

    fn transfer() -> Vec<OperationPayload> {
        vec![OperationPayload::Transfer {
            destination: "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb".to_string(),
            amount_mutez: 1,
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_in_recent_block_returns_within_one_cycle() {
        let ledger = MockLedger::new(100);
        let handle = ledger.submit_batch(&signer(), &transfer()).await.unwrap();
        // Included one block behind the current head.
        ledger.include_at(&handle.hash, 99);

        let started = Instant::now();
        let record = confirm(&ledger, &handle, &ConfirmOptions::default()).await.unwrap();
        assert_eq!(record.block_level, 99);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_included_at_head_found_on_first_pass() {
        let ledger = MockLedger::new(40);
        let handle = ledger.submit_batch(&signer(), &transfer()).await.unwrap();
        ledger.include_at(&handle.hash, 40);

        let started = Instant::now();
        let record = confirm(&ledger, &handle, &ConfirmOptions::default()).await.unwrap();
        assert_eq!(record.block_level, 40);
        assert!(started.elapsed() <= Duration::from_millis(500));
        // Window [37, 40]: head plus three earlier blocks.
        assert_eq!(ledger.levels_read(), vec![37, 38, 39]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_included_times_out_after_deadline() {
        let ledger = MockLedger::new(10).advancing_every_head_read();
        let handle = OperationHandle::new("ooNeverIncluded");
        let options = ConfirmOptions::new(Duration::from_secs(5));

        let started = Instant::now();
        let err = confirm(&ledger, &handle, &options).await.unwrap_err();
        let waited = started.elapsed();
        assert_eq!(err.category(), "timeout");
        assert!(waited >= Duration::from_secs(5));
        assert!(waited < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_inclusion_found_without_rescanning() {
        let ledger = MockLedger::new(10).advancing_every_head_read();
        let handle = ledger.submit_batch(&signer(), &transfer()).await.unwrap();
        ledger.include_at(&handle.hash, 13);

        let record = confirm(&ledger, &handle, &ConfirmOptions::default()).await.unwrap();
        assert_eq!(record.block_level, 13);
        let mut levels = ledger.levels_read();
        let total = levels.len();
        levels.dedup();
        assert_eq!(levels.len(), total, "a level was read twice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_errors_are_swallowed() {
        let ledger = MockLedger::new(20).advancing_every_head_read();
        ledger.fail_next_reads(3);
        let handle = ledger.submit_batch(&signer(), &transfer()).await.unwrap();
        ledger.include_at(&handle.hash, 21);

        let record = confirm(&ledger, &handle, &ConfirmOptions::default()).await.unwrap();
        assert_eq!(record.block_level, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_block_read_is_retried_not_skipped() {
        let ledger = MockLedger::new(100).advancing_every_head_read();
        ledger.fail_next_level_reads(1);
        let handle = ledger.submit_batch(&signer(), &transfer()).await.unwrap();
        // First window is [97, 100]; the read of 97 fails.
        ledger.include_at(&handle.hash, 97);

        let options = ConfirmOptions::new(Duration::from_secs(5)).with_lookback(3);
        let record = confirm(&ledger, &handle, &options).await.unwrap();
        assert_eq!(record.block_level, 97);
        assert_eq!(ledger.levels_read(), vec![97]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_mid_window_resumes_at_failed_level() {
        let ledger = MockLedger::new(100).advancing_every_head_read();
        let handle = OperationHandle::new("ooNeverIncluded");
        let options = ConfirmOptions::new(Duration::from_millis(1200))
            .from_level(98)
            .with_lookback(3);
        ledger.fail_level_read_at(99);

        let err = confirm(&ledger, &handle, &options).await.unwrap_err();
        assert_eq!(err.category(), "timeout");
        // 98 ok, 99 fails; next cycle resumes at 99 with head 101.
        let levels = ledger.levels_read();
        assert_eq!(&levels[..3], &[98, 99, 100]);
        let mut deduped = levels.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), levels.len(), "a level was read twice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_distinct_from_timeout() {
        let ledger = MockLedger::new(10).advancing_every_head_read();
        let handle = OperationHandle::new("ooNeverIncluded");
        let (tx, rx) = watch::channel(false);
        let options = ConfirmOptions::new(Duration::from_secs(60)).with_cancel(rx);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            let _ = tx.send(true);
        });
        let started = Instant::now();
        let err = confirm(&ledger, &handle, &options).await.unwrap_err();
        canceller.await.unwrap();
        assert_eq!(err.category(), "cancelled");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_start_level() {
        let ledger = MockLedger::new(50);
        let handle = ledger.submit_batch(&signer(), &transfer()).await.unwrap();
        ledger.include_at(&handle.hash, 45);

        let record = confirm(&ledger, &handle, &ConfirmOptions::default().from_level(44))
            .await
            .unwrap();
        assert_eq!(record.block_level, 45);
        assert_eq!(ledger.levels_read(), vec![44, 45]);
    }
}
