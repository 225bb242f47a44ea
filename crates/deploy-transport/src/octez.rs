//! `octez-client` wrapper used to sign and inject operations.
//!
//! Every command runs with `--wait none`: the client returns as soon as the
//! operation is injected, and inclusion is tracked separately by polling blocks.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use lambda_deploy_types::micheline::to_michelson;
use lambda_deploy_types::OperationPayload;

use crate::ledger::SignerIdentity;

const ORIGINATION_ALIAS: &str = "lambda_deploy_origination";

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct OctezClient {
    binary: PathBuf,
    endpoint: String,
    base_dir: Option<PathBuf>,
    burn_cap: String,
    timeout: Duration,
}

impl OctezClient {
    pub fn new(binary: impl Into<PathBuf>, endpoint: &str) -> Self {
        Self {
            binary: binary.into(),
            endpoint: endpoint.to_string(),
            base_dir: None,
            burn_cap: "20".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Use a dedicated client directory instead of `~/.tezos-client`.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_burn_cap(mut self, burn_cap: impl Into<String>) -> Self {
        self.burn_cap = burn_cap.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--endpoint".to_string(), self.endpoint.clone()];
        if let Some(dir) = &self.base_dir {
            args.push("--base-dir".to_string());
            args.push(dir.display().to_string());
        }
        args.push("--wait".to_string());
        args.push("none".to_string());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<CommandOutput> {
        let mut full_args = self.global_args();
        full_args.extend(args);
        debug!(binary = %self.binary.display(), command = %redact(&full_args), "octez-client");

        let mut command = TokioCommand::new(&self.binary);
        command
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;

        let mut stdout_reader = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture octez-client stdout"))?;
        let mut stderr_reader = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("failed to capture octez-client stderr"))?;
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_reader.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_reader.read_to_end(&mut buf).await;
            buf
        });

        let exit_code = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.context("failed while waiting for octez-client")?.code(),
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                bail!(
                    "octez-client timed out after {}s",
                    self.timeout.as_secs()
                );
            }
        };

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_bytes).trim().to_string(),
            stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
        })
    }

    async fn run_checked(&self, args: Vec<String>) -> Result<CommandOutput> {
        let output = self.run(args).await?;
        if !output.success() {
            bail!(
                "octez-client exited with {:?}: {}",
                output.exit_code,
                if output.stderr.is_empty() {
                    &output.stdout
                } else {
                    &output.stderr
                }
            );
        }
        Ok(output)
    }

    pub async fn version(&self) -> Result<String> {
        let output = self.run_checked(vec!["--version".to_string()]).await?;
        Ok(output.stdout)
    }

    /// Import an unencrypted secret key under `alias` and resolve its address.
    pub async fn import_secret_key(&self, alias: &str, secret_key: &str) -> Result<SignerIdentity> {
        self.run_checked(vec![
            "import".to_string(),
            "secret".to_string(),
            "key".to_string(),
            alias.to_string(),
            format!("unencrypted:{}", secret_key.trim()),
            "--force".to_string(),
        ])
        .await
        .with_context(|| format!("import key for '{}'", alias))?;
        self.show_address(alias).await
    }

    pub async fn show_address(&self, alias: &str) -> Result<SignerIdentity> {
        let output = self
            .run_checked(vec![
                "show".to_string(),
                "address".to_string(),
                alias.to_string(),
            ])
            .await?;
        let address = parse_address(&output.stdout)
            .ok_or_else(|| anyhow!("no address in `show address {}` output", alias))?;
        Ok(SignerIdentity::new(alias, address))
    }

    /// Inject an origination. Code and storage are Micheline JSON.
    pub async fn originate(
        &self,
        signer: &SignerIdentity,
        code: &Value,
        storage: &Value,
        balance_mutez: u64,
    ) -> Result<String> {
        let output = self
            .run_checked(vec![
                "originate".to_string(),
                "contract".to_string(),
                ORIGINATION_ALIAS.to_string(),
                "transferring".to_string(),
                mutez_to_tez(balance_mutez),
                "from".to_string(),
                signer.alias.clone(),
                "running".to_string(),
                to_michelson(code),
                "--init".to_string(),
                to_michelson(storage),
                "--burn-cap".to_string(),
                self.burn_cap.clone(),
                "--force".to_string(),
            ])
            .await?;
        parse_operation_hash(&output.stdout)
            .ok_or_else(|| anyhow!("no operation hash in origination output: {}", output.stdout))
    }

    /// Inject transfers and entrypoint calls as one operation group.
    pub async fn multiple_transfers(
        &self,
        signer: &SignerIdentity,
        ops: &[OperationPayload],
    ) -> Result<String> {
        let transfers = transfers_json(ops)?;
        let output = self
            .run_checked(vec![
                "multiple".to_string(),
                "transfers".to_string(),
                "from".to_string(),
                signer.alias.clone(),
                "using".to_string(),
                transfers.to_string(),
                "--burn-cap".to_string(),
                self.burn_cap.clone(),
            ])
            .await?;
        parse_operation_hash(&output.stdout)
            .ok_or_else(|| anyhow!("no operation hash in transfer output: {}", output.stdout))
    }
}

/// JSON accepted by `multiple transfers ... using`.
pub fn transfers_json(ops: &[OperationPayload]) -> Result<Value> {
    let mut transfers = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            OperationPayload::EntrypointCall {
                destination,
                entrypoint,
                arg,
                amount_mutez,
            } => transfers.push(json!({
                "destination": destination,
                "amount": mutez_to_tez(*amount_mutez),
                "entrypoint": entrypoint,
                "arg": to_michelson(arg),
            })),
            OperationPayload::Transfer {
                destination,
                amount_mutez,
            } => transfers.push(json!({
                "destination": destination,
                "amount": mutez_to_tez(*amount_mutez),
            })),
            OperationPayload::Origination { .. } => {
                bail!("originations cannot be part of a transfer group")
            }
        }
    }
    Ok(Value::Array(transfers))
}

pub fn mutez_to_tez(mutez: u64) -> String {
    let whole = mutez / 1_000_000;
    let fraction = mutez % 1_000_000;
    if fraction == 0 {
        whole.to_string()
    } else {
        format!("{}.{:06}", whole, fraction)
            .trim_end_matches('0')
            .to_string()
    }
}

/// Extract `oo...` from `Operation hash is 'oo...'`.
pub fn parse_operation_hash(stdout: &str) -> Option<String> {
    let marker = "Operation hash is '";
    let start = stdout.find(marker)? + marker.len();
    let rest = &stdout[start..];
    let end = rest.find('\'')?;
    let hash = &rest[..end];
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_string())
    }
}

fn parse_address(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Hash:"))
        .map(|addr| addr.trim().to_string())
}

fn redact(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.starts_with("unencrypted:") {
                "unencrypted:<redacted>"
            } else {
                a.as_str()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
