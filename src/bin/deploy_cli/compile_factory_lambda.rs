use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use lambda_deploy_core::paths::{atomic_write, factory_lambda_path};

use super::{output, CliContext};

#[derive(Parser, Debug)]
#[command(about = "Pack one lambda against the factory contract")]
pub struct CompileFactoryLambdaCmd {
    /// Lambda symbol to pack
    #[arg(long, short = 'n')]
    name: String,

    /// Factory source; `<contracts>/factory.ligo` by default
    #[arg(long, short = 'c')]
    contract: Option<PathBuf>,
}

impl CompileFactoryLambdaCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let contract = self
            .contract
            .clone()
            .unwrap_or_else(|| ctx.config.contracts_directory.join("factory.ligo"));
        let compiler = ctx.compiler().await?;
        let bytes = compiler.compile_factory_lambda(&self.name, &contract).await?;

        let path = factory_lambda_path(
            &ctx.working_dir.join(&ctx.config.output_directory),
            &self.name,
        );
        atomic_write(&path, hex::encode(&bytes).as_bytes())?;

        if ctx.json_output {
            output::print_json(&json!({
                "name": self.name,
                "size": bytes.len(),
                "path": path.display().to_string(),
            }))?;
        } else {
            println!("{} ({} bytes) -> {}", self.name, bytes.len(), path.display());
        }
        Ok(())
    }
}
