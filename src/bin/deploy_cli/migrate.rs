use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;

use lambda_deploy::migrations::{run_migrations, select, MigrationContext, MIGRATIONS};
use lambda_deploy_core::{ArtifactStore, DeployContext};
use lambda_deploy_transport::{resolve_endpoint, NodeLedger, OctezClient, RpcClient};

use super::{output, CliContext};

#[derive(Parser, Debug)]
#[command(about = "Run the numbered deployment steps against a network")]
pub struct MigrateCmd {
    /// Network name (sandbox, testnet, mainnet or a configured one)
    #[arg(long, short = 'n')]
    network: Option<String>,

    /// First step to run (index into the step list)
    #[arg(long = "from", short = 's')]
    from: Option<usize>,

    /// Last step to run, inclusive
    #[arg(long = "to", short = 'e')]
    to: Option<usize>,

    /// Deployer secret key; falls back to DEPLOYER_SK
    #[arg(long, short = 'k')]
    key: Option<String>,

    /// Key alias registered with octez-client
    #[arg(long, default_value = "lambda-deployer")]
    alias: String,

    /// Originate again even if an address is recorded for the network
    #[arg(long)]
    redeploy: bool,

    /// List the steps and exit
    #[arg(long)]
    list: bool,
}

impl MigrateCmd {
    fn list(&self, ctx: &CliContext) -> Result<()> {
        if ctx.json_output {
            let steps: Vec<_> = MIGRATIONS
                .iter()
                .enumerate()
                .map(|(i, m)| json!({ "index": i, "id": m.id, "description": m.description }))
                .collect();
            return output::print_json(&steps);
        }
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            println!("{:>2}  {:<12} {}", i, migration.id, migration.description);
        }
        Ok(())
    }

    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        if self.list {
            return self.list(ctx);
        }
        // Validate the range before touching the network.
        let steps = select(MIGRATIONS, self.from, self.to)?;

        let config = &ctx.config;
        let network = self
            .network
            .clone()
            .unwrap_or_else(|| config.deploy_network.clone())
            .to_ascii_lowercase();
        let endpoint = resolve_endpoint(&network, &config.networks)?;
        let key = self
            .key
            .clone()
            .or_else(|| config.deployer_sk.clone())
            .ok_or_else(|| anyhow!("no deployer key: pass --key or set DEPLOYER_SK"))?;

        let mut octez = OctezClient::new(&config.octez_client_path, &endpoint)
            .with_burn_cap(config.burn_cap.clone());
        if let Some(base_dir) = &config.octez_base_dir {
            octez = octez.with_base_dir(base_dir);
        }
        let signer = octez
            .import_secret_key(&self.alias, &key)
            .await
            .context("register deployer key")?;
        tracing::info!(network = %network, endpoint = %endpoint, deployer = %signer.address, "deploying");

        let ledger = Arc::new(NodeLedger::new(RpcClient::new(&endpoint), octez));
        let store = Arc::new(ArtifactStore::new(ctx.working_dir.join(&config.output_directory)));
        let deploy = DeployContext::new(ledger, signer, network, store)
            .with_confirm(config.confirmation.to_options())
            .with_redeploy(self.redeploy);

        let mut step_config = config.clone();
        step_config.output_directory = ctx.working_dir.join(&config.output_directory);
        step_config.storage_directory = ctx.working_dir.join(&config.storage_directory);
        let migration_ctx = MigrationContext {
            deploy,
            config: step_config,
            env: Arc::new(|key: &str| std::env::var(key).ok()),
        };

        let outcomes = run_migrations(&migration_ctx, steps).await?;
        if ctx.json_output {
            output::print_json(&outcomes)?;
        } else {
            for outcome in &outcomes {
                let deployment = &outcome.report.deployment;
                println!(
                    "{:<12} {} at {} (level {})",
                    outcome.id, deployment.contract_name, deployment.address, deployment.block_level
                );
                for table in &outcome.report.tables {
                    println!(
                        "             {} lambdas: {} in {} operation(s)",
                        table.lambda_type,
                        table.fragments,
                        table.operations.len()
                    );
                }
            }
        }
        Ok(())
    }
}
