//! Numbered deployment steps.
//!
//! The registry is a static, ordered list; `migrate --from/--to` selects an
//! inclusive slice of it. Each step loads the function tables it needs up
//! front, renders its initial storage, then hands off to the orchestrator.

use futures::future::BoxFuture;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use lambda_deploy_core::packer::read_table;
use lambda_deploy_core::{DeployConfig, DeployContext, DeployError, DeployReport};
use lambda_deploy_types::{FunctionTable, FunctionTables, LambdaType};

use crate::storage::{load_template, render, StorageVars};

pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// What every step gets: a deploy context with its signer, the loaded
/// configuration and the environment used by storage templates.
pub struct MigrationContext {
    pub deploy: DeployContext,
    pub config: DeployConfig,
    pub env: EnvLookup,
}

pub type MigrationFn =
    for<'a> fn(&'a MigrationContext) -> BoxFuture<'a, Result<DeployReport, DeployError>>;

#[derive(Debug)]
pub struct Migration {
    pub id: &'static str,
    pub description: &'static str,
    pub run: MigrationFn,
}

pub static MIGRATIONS: &[Migration] = &[
    Migration {
        id: "00_dex",
        description: "standalone dex with Admin, Token and Dex tables",
        run: dex,
    },
    Migration {
        id: "01_factory",
        description: "pool factory with Admin, Token and Dex tables",
        run: factory,
    },
];

const UPLOADED: [LambdaType; 3] = [LambdaType::Admin, LambdaType::Token, LambdaType::Dex];

#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    pub id: String,
    pub report: DeployReport,
}

/// Inclusive `[from, to]` slice of `migrations`. Both bounds default to the
/// ends of the list.
pub fn select(
    migrations: &[Migration],
    from: Option<usize>,
    to: Option<usize>,
) -> Result<&[Migration], DeployError> {
    if migrations.is_empty() {
        return Ok(migrations);
    }
    let last = migrations.len() - 1;
    let from = from.unwrap_or(0);
    let to = to.unwrap_or(last);
    if to > last {
        return Err(DeployError::configuration(format!(
            "--to {} is out of range (last migration is {})",
            to, last
        )));
    }
    if from > to {
        return Err(DeployError::configuration(format!(
            "--from {} is after --to {}",
            from, to
        )));
    }
    Ok(&migrations[from..=to])
}

/// Run `migrations` in order, stopping at the first failure. Steps that
/// finished keep their recorded addresses, so a fixed run can resume with
/// `--from`.
pub async fn run_migrations(
    ctx: &MigrationContext,
    migrations: &[Migration],
) -> Result<Vec<MigrationOutcome>, DeployError> {
    let mut outcomes = Vec::with_capacity(migrations.len());
    for migration in migrations {
        info!(migration = migration.id, network = %ctx.deploy.network, "running migration");
        let report = (migration.run)(ctx).await?;
        info!(
            migration = migration.id,
            address = %report.deployment.address,
            tables = report.tables.len(),
            "migration finished"
        );
        outcomes.push(MigrationOutcome {
            id: migration.id.to_string(),
            report,
        });
    }
    Ok(outcomes)
}

fn dex(ctx: &MigrationContext) -> BoxFuture<'_, Result<DeployReport, DeployError>> {
    Box::pin(deploy_with_tables(ctx, "dex", ""))
}

fn factory(ctx: &MigrationContext) -> BoxFuture<'_, Result<DeployReport, DeployError>> {
    Box::pin(deploy_with_tables(ctx, "factory", "factory"))
}

/// Originate `contract_name` with the Dev table embedded in storage, then
/// upload the tables found under `lambdas/<table_subdir>`.
async fn deploy_with_tables(
    ctx: &MigrationContext,
    contract_name: &str,
    table_subdir: &str,
) -> Result<DeployReport, DeployError> {
    let config = &ctx.config;
    let lambdas = config.lambdas_directory();
    let contract = config
        .contracts_directory
        .join(format!("{}.ligo", contract_name))
        .display()
        .to_string();

    // Everything is read before the first submission.
    let dev = load_table(&lambdas, LambdaType::Dev, &contract)?;
    let mut tables = FunctionTables::new();
    for lambda_type in UPLOADED {
        tables.insert(load_table(&lambdas.join(table_subdir), lambda_type, &contract)?);
    }

    let template = load_template(&config.storage_directory, contract_name)?;
    let env = ctx.env.as_ref();
    let storage = render(
        &template,
        &StorageVars {
            deployer: &ctx.deploy.signer.address,
            dev_lambdas: Some(&dev),
            env,
        },
    )?;

    ctx.deploy
        .deploy(contract_name, storage, &tables, |t| config.batch_size(t))
        .await
}

fn load_table(
    dir: &Path,
    lambda_type: LambdaType,
    contract: &str,
) -> Result<FunctionTable, DeployError> {
    read_table(&dir.join(lambda_type.table_file_name()), lambda_type, contract)
}
