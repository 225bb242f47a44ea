//! CLI subcommand implementations for lambda-deploy

pub mod compile;
pub mod compile_factory_lambda;
pub mod compile_lambda;
pub mod doctor;
pub mod migrate;
pub mod output;

use std::path::PathBuf;

use lambda_deploy_core::{CompilerSettings, DeployConfig, LigoCompiler};

/// Settings shared by every subcommand, after config file, environment and
/// global flags have been applied.
pub struct CliContext {
    pub config: DeployConfig,
    pub working_dir: PathBuf,
    pub json_output: bool,
}

impl CliContext {
    /// Find a working compiler, preferring the configured strategy.
    pub async fn compiler(&self) -> anyhow::Result<LigoCompiler> {
        let settings = CompilerSettings::from_config(&self.config, &self.working_dir);
        Ok(LigoCompiler::probe(settings).await?)
    }
}
