use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};

use lambda_deploy_core::paths::{atomic_write, contract_name_of, michelson_text_path};
use lambda_deploy_core::{ArtifactStore, ContractBuild};

use super::{output, CliContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContractFormat {
    /// Build artifact with Micheline JSON (`build/<name>.json`)
    Json,
    /// Michelson text next to the contracts directory (`compiled/<name>.tz`)
    Tz,
}

#[derive(Parser, Debug)]
#[command(about = "Compile contracts into build artifacts")]
pub struct CompileCmd {
    /// Contract source; every `*.ligo` in the contracts directory when omitted
    #[arg(long, short = 'c')]
    contract: Option<PathBuf>,

    #[arg(long, short = 'f', value_enum, default_value_t = ContractFormat::Json)]
    format: ContractFormat,

    /// Recompile even when the artifact is up to date
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct CompileResult {
    contract: String,
    status: &'static str,
    path: String,
}

fn list_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "ligo") {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

impl CompileCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let sources = match &self.contract {
            Some(source) => vec![source.clone()],
            None => list_sources(&ctx.working_dir.join(&ctx.config.contracts_directory))?,
        };
        if sources.is_empty() {
            anyhow::bail!(
                "no .ligo sources in {}",
                ctx.config.contracts_directory.display()
            );
        }

        let compiler = ctx.compiler().await?;
        let store = ArtifactStore::new(ctx.working_dir.join(&ctx.config.output_directory));
        let mut results = Vec::with_capacity(sources.len());

        for source in &sources {
            let result = match self.format {
                ContractFormat::Json => match compiler.compile_contract(source, &store, self.force).await? {
                    ContractBuild::Compiled(artifact) => CompileResult {
                        path: store.path_for(&artifact.contract_name).display().to_string(),
                        contract: artifact.contract_name,
                        status: "compiled",
                    },
                    ContractBuild::UpToDate(artifact) => CompileResult {
                        path: store.path_for(&artifact.contract_name).display().to_string(),
                        contract: artifact.contract_name,
                        status: "up_to_date",
                    },
                },
                ContractFormat::Tz => {
                    let name = contract_name_of(source)
                        .with_context(|| format!("cannot name contract from {}", source.display()))?;
                    let text = compiler.compile_contract_text(source).await?;
                    let path = michelson_text_path(
                        &ctx.working_dir.join(&ctx.config.contracts_directory),
                        &name,
                    );
                    atomic_write(&path, text.as_bytes())?;
                    CompileResult {
                        contract: name,
                        status: "compiled",
                        path: path.display().to_string(),
                    }
                }
            };
            if !ctx.json_output {
                println!("{:<12} {} -> {}", result.status, result.contract, result.path);
            }
            results.push(result);
        }

        if ctx.json_output {
            output::print_json(&results)?;
        }
        Ok(())
    }
}
