use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use lambda_deploy_core::packer::{read_descriptors, write_table};
use lambda_deploy_core::paths::lambdas_dir_for;
use lambda_deploy_types::LambdaType;

use super::{output, CliContext};

#[derive(Parser, Debug)]
#[command(about = "Compile one function table")]
pub struct CompileLambdaCmd {
    /// Lambda type (Admin, Token, Dex, Dev, Strategy, Permit)
    #[arg(long = "type", short = 't')]
    lambda_type: LambdaType,

    /// Descriptor file: `[{ "index": 0, "name": "..." }, ...]`
    #[arg(long, short = 'j')]
    json: PathBuf,

    /// Contract the fragments are compiled against
    #[arg(long, short = 'c', default_value = "contracts/main/dex.ligo")]
    contract: PathBuf,
}

impl CompileLambdaCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let descriptors = read_descriptors(&ctx.working_dir.join(&self.json))?;
        let file_name = self
            .json
            .file_name()
            .with_context(|| format!("{} has no file name", self.json.display()))?;

        let compiler = ctx.compiler().await?;
        let table = compiler
            .compile_table(self.lambda_type, &descriptors, &self.contract)
            .await?;

        let dir = lambdas_dir_for(
            &ctx.working_dir.join(&ctx.config.output_directory),
            &self.contract.display().to_string(),
        );
        let path = dir.join(file_name);
        write_table(&path, &table)?;

        if ctx.json_output {
            output::print_json(&json!({
                "lambda_type": self.lambda_type,
                "fragments": table.len(),
                "skipped": descriptors.len() - table.len(),
                "path": path.display().to_string(),
            }))?;
        } else {
            println!(
                "{} {} lambdas -> {}",
                table.len(),
                self.lambda_type,
                path.display()
            );
        }
        Ok(())
    }
}
