use anyhow::{anyhow, Result};
use clap::Parser;

use lambda_deploy_core::health::DoctorStatus;
use lambda_deploy_core::{run_doctor, DoctorConfig, DoctorReport};
use lambda_deploy_transport::resolve_endpoint;

use super::{output, CliContext};

#[derive(Parser, Debug)]
#[command(about = "Validate the compiler, octez-client and node setup")]
pub struct DoctorCmd {
    /// Timeout per check, in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Network whose RPC endpoint is checked
    #[arg(long, short = 'n')]
    network: Option<String>,
}

fn print_report(report: &DoctorReport) {
    println!("lambda-deploy doctor");
    println!("  network: {}", report.network);
    println!("  rpc:     {}", report.rpc_endpoint);
    println!("  ligo:    {}", report.ligo_version);
    println!();

    for check in &report.checks {
        let status = match check.status {
            DoctorStatus::Pass => "PASS",
            DoctorStatus::Warn => "WARN",
            DoctorStatus::Fail => "FAIL",
        };
        println!("[{}] {}: {}", status, check.name, check.detail);
        if let Some(remediation) = &check.remediation {
            println!("      fix: {}", remediation);
        }
    }

    println!();
    println!(
        "Summary: {} passed, {} failed",
        report.passed, report.failed
    );
}

impl DoctorCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let mut config = ctx.config.clone();
        if let Some(network) = &self.network {
            config.deploy_network = network.to_ascii_lowercase();
        }
        config.output_directory = ctx.working_dir.join(&config.output_directory);
        let endpoint = resolve_endpoint(&config.deploy_network, &config.networks)?;

        let mut doctor = DoctorConfig::from_config(&config, endpoint);
        doctor.timeout_secs = self.timeout_secs;
        let report = run_doctor(&doctor).await;

        if ctx.json_output {
            output::print_json(&report)?;
        } else {
            print_report(&report);
        }

        if report.ok {
            Ok(())
        } else {
            Err(anyhow!("doctor found {} failing checks", report.failed))
        }
    }
}
