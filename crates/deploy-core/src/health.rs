use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as TokioCommand;

use lambda_deploy_transport::RpcClient;

use crate::config::DeployConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    Pass,
    /// Failed, but something else covers for it.
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorCheck {
    pub id: String,
    pub name: String,
    pub status: DoctorStatus,
    pub passed: bool,
    pub detail: String,
    pub remediation: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub ok: bool,
    pub passed: usize,
    pub failed: usize,
    pub network: String,
    pub rpc_endpoint: String,
    pub ligo_version: String,
    pub checks: Vec<DoctorCheck>,
}

#[derive(Debug, Clone)]
pub struct DoctorConfig {
    pub timeout_secs: u64,
    pub network: String,
    pub rpc_endpoint: String,
    pub ligo_local_path: String,
    pub docker_path: String,
    pub ligo_version: String,
    pub octez_client_path: String,
    pub output_directory: PathBuf,
}

impl DoctorConfig {
    pub fn from_config(config: &DeployConfig, rpc_endpoint: impl Into<String>) -> Self {
        Self {
            timeout_secs: 10,
            network: config.deploy_network.clone(),
            rpc_endpoint: rpc_endpoint.into(),
            ligo_local_path: config.ligo_local_path.clone(),
            docker_path: config.docker_path.clone(),
            ligo_version: config.ligo_version.clone(),
            octez_client_path: config.octez_client_path.clone(),
            output_directory: config.output_directory.clone(),
        }
    }
}

fn pass_check(id: &str, name: &str, detail: String, start: Instant) -> DoctorCheck {
    DoctorCheck {
        id: id.to_string(),
        name: name.to_string(),
        status: DoctorStatus::Pass,
        passed: true,
        detail,
        remediation: None,
        duration_ms: start.elapsed().as_millis(),
    }
}

fn fail_check(
    id: &str,
    name: &str,
    detail: String,
    remediation: &str,
    start: Instant,
) -> DoctorCheck {
    DoctorCheck {
        id: id.to_string(),
        name: name.to_string(),
        status: DoctorStatus::Fail,
        passed: false,
        detail,
        remediation: Some(remediation.to_string()),
        duration_ms: start.elapsed().as_millis(),
    }
}

async fn run_version_command(binary: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let rendered = format!("{} {}", binary, args.join(" "));
    let output = tokio::time::timeout(
        timeout,
        TokioCommand::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| anyhow!("`{rendered}` timed out after {}s", timeout.as_secs()))?
    .with_context(|| format!("failed to execute `{rendered}`"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(anyhow!(
            "`{rendered}` exited with status {}: {}",
            output.status,
            stderr
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}

fn check_output_dir(dir: &Path) -> Result<String> {
    std::fs::create_dir_all(dir).with_context(|| format!("create output directory {}", dir.display()))?;
    let probe = dir.join(".lambda-deploy-doctor");
    std::fs::write(&probe, b"ok").with_context(|| format!("write to {}", dir.display()))?;
    let _ = std::fs::remove_file(&probe);
    Ok(format!("output directory is writable: {}", dir.display()))
}

async fn check_rpc(endpoint: &str, timeout: Duration) -> Result<String> {
    let client = RpcClient::with_timeouts(endpoint, timeout, timeout.min(Duration::from_secs(5)));
    let level = tokio::task::spawn_blocking(move || client.head_level())
        .await
        .context("RPC check task failed")??;
    Ok(format!("connected (head level={})", level))
}

/// Run every environment check. Never fails; failures are reported per check.
pub async fn run_doctor(config: &DoctorConfig) -> DoctorReport {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut checks = Vec::new();

    let local_start = Instant::now();
    let local = match run_version_command(&config.ligo_local_path, &["--version"], timeout).await {
        Ok(version) => pass_check("ligo_local", "Local LIGO", version, local_start),
        Err(err) => fail_check(
            "ligo_local",
            "Local LIGO",
            err.to_string(),
            "Install LIGO and set `ligo_local_path`, or use the dockerized compiler.",
            local_start,
        ),
    };

    let docker_start = Instant::now();
    let image = format!("ligolang/ligo:{}", config.ligo_version);
    let docker = match run_version_command(&config.docker_path, &["--version"], timeout).await {
        Ok(version) => {
            let cached = run_version_command(&config.docker_path, &["image", "inspect", "--format", "{{.Id}}", &image], timeout)
                .await
                .is_ok();
            let detail = if cached {
                format!("{} ({} cached)", version, image)
            } else {
                format!("{} ({} will be pulled on first use)", version, image)
            };
            pass_check("ligo_docker", "Dockerized LIGO", detail, docker_start)
        }
        Err(err) => fail_check(
            "ligo_docker",
            "Dockerized LIGO",
            err.to_string(),
            "Install Docker and make sure the daemon is running, or install LIGO locally.",
            docker_start,
        ),
    };

    // One working compiler strategy is enough.
    let any_compiler = local.passed || docker.passed;
    for mut check in [local, docker] {
        if !check.passed && any_compiler {
            check.status = DoctorStatus::Warn;
        }
        checks.push(check);
    }

    let octez_start = Instant::now();
    checks.push(
        match run_version_command(&config.octez_client_path, &["--version"], timeout).await {
            Ok(version) => pass_check("octez_client", "octez-client", version, octez_start),
            Err(err) => fail_check(
                "octez_client",
                "octez-client",
                err.to_string(),
                "Install octez-client and set `octez_client_path`.",
                octez_start,
            ),
        },
    );

    let rpc_start = Instant::now();
    checks.push(match check_rpc(&config.rpc_endpoint, timeout).await {
        Ok(detail) => pass_check("rpc_reachability", "Node RPC Reachability", detail, rpc_start),
        Err(err) => fail_check(
            "rpc_reachability",
            "Node RPC Reachability",
            err.to_string(),
            "Start the node or set `LAMBDA_DEPLOY_RPC_<NETWORK>` to a reachable endpoint.",
            rpc_start,
        ),
    });

    let out_start = Instant::now();
    checks.push(match check_output_dir(&config.output_directory) {
        Ok(detail) => pass_check("output_directory", "Output Directory", detail, out_start),
        Err(err) => fail_check(
            "output_directory",
            "Output Directory",
            err.to_string(),
            "Use `--output` with a writable path and verify directory permissions.",
            out_start,
        ),
    });

    let failed = checks
        .iter()
        .filter(|c| c.status == DoctorStatus::Fail)
        .count();
    let passed = checks.iter().filter(|c| c.passed).count();
    DoctorReport {
        ok: failed == 0,
        passed,
        failed,
        network: config.network.clone(),
        rpc_endpoint: config.rpc_endpoint.clone(),
        ligo_version: config.ligo_version.clone(),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> DoctorConfig {
        DoctorConfig {
            timeout_secs: 2,
            network: "sandbox".to_string(),
            rpc_endpoint: "http://127.0.0.1:1".to_string(),
            ligo_local_path: "/nonexistent/ligo".to_string(),
            docker_path: "/nonexistent/docker".to_string(),
            ligo_version: "0.31.0".to_string(),
            octez_client_path: "/nonexistent/octez-client".to_string(),
            output_directory: dir.join("build"),
        }
    }

    #[tokio::test]
    async fn test_doctor_reports_each_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = run_doctor(&config(dir.path())).await;
        assert!(!report.ok);

        let status = |id: &str| {
            report
                .checks
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.status)
                .unwrap()
        };
        assert_eq!(status("ligo_local"), DoctorStatus::Fail);
        assert_eq!(status("ligo_docker"), DoctorStatus::Fail);
        assert_eq!(status("octez_client"), DoctorStatus::Fail);
        assert_eq!(status("rpc_reachability"), DoctorStatus::Fail);
        assert_eq!(status("output_directory"), DoctorStatus::Pass);
        assert_eq!(report.passed, 1);
        assert!(report
            .checks
            .iter()
            .filter(|c| !c.passed)
            .all(|c| c.remediation.is_some()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_one_compiler_strategy_is_enough() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let ligo = dir.path().join("ligo");
        std::fs::write(&ligo, "#!/bin/sh\necho 0.31.0\n").unwrap();
        std::fs::set_permissions(&ligo, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut cfg = config(dir.path());
        cfg.ligo_local_path = ligo.display().to_string();
        let report = run_doctor(&cfg).await;

        let docker = report.checks.iter().find(|c| c.id == "ligo_docker").unwrap();
        assert_eq!(docker.status, DoctorStatus::Warn);
        let local = report.checks.iter().find(|c| c.id == "ligo_local").unwrap();
        assert_eq!(local.detail, "0.31.0");
    }
}
