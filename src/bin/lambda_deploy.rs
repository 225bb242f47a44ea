//! lambda-deploy: build and deploy lambda-dispatched Tezos contracts
//!
//! ## Commands
//!
//! - **compile**: compile contracts into build artifacts (or `.tz` text)
//! - **compile-lambda**: compile one function table from a descriptor file
//! - **compile-factory-lambda**: pack one lambda against the factory contract
//! - **migrate**: originate contracts and upload their function tables
//! - **doctor**: check the compiler, octez-client and node setup
//!
//! ## Example Usage
//!
//! ```bash
//! lambda-deploy compile --contract contracts/main/dex.ligo
//! lambda-deploy compile-lambda --type Dex --json contracts/compiled/lambdas/Dex_lambdas.json
//! lambda-deploy migrate --network testnet --from 0 --to 0
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lambda_deploy::logging::{self, LogConfig, LogFormat};
use lambda_deploy_core::DeployConfig;

mod deploy_cli;

use deploy_cli::{
    compile::CompileCmd, compile_factory_lambda::CompileFactoryLambdaCmd,
    compile_lambda::CompileLambdaCmd, doctor::DoctorCmd, migrate::MigrateCmd, CliContext,
};

#[derive(Parser)]
#[command(
    name = "lambda-deploy",
    author,
    version,
    about = "Build and deploy lambda-dispatched Tezos contracts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./deploy.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Build output directory
    #[arg(long, short = 'o', global = true)]
    output: Option<PathBuf>,

    /// LIGO version to compile with
    #[arg(long, global = true, env = "LIGO_VERSION")]
    ligo_version: Option<String>,

    /// Use a locally installed ligo instead of the docker image
    #[arg(long, global = true)]
    local_ligo: bool,

    /// Output as JSON instead of human-readable format
    #[arg(long = "json-output", global = true)]
    json_output: bool,

    /// Emit structured debug diagnostics JSON for failures
    #[arg(long, global = true)]
    debug_json: bool,

    /// Log format on stderr: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile contracts into build artifacts
    Compile(CompileCmd),

    /// Compile one function table
    CompileLambda(CompileLambdaCmd),

    /// Pack one lambda against the factory contract
    CompileFactoryLambda(CompileFactoryLambdaCmd),

    /// Originate contracts and upload their function tables
    Migrate(MigrateCmd),

    /// Validate local environment and network endpoints
    Doctor(DoctorCmd),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Compile(_) => "compile",
            Commands::CompileLambda(_) => "compile-lambda",
            Commands::CompileFactoryLambda(_) => "compile-factory-lambda",
            Commands::Migrate(_) => "migrate",
            Commands::Doctor(_) => "doctor",
        }
    }
}

/// Global flags that override the config file.
struct Overrides {
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    ligo_version: Option<String>,
    local_ligo: bool,
}

async fn run(command: Commands, overrides: Overrides, json_output: bool) -> Result<()> {
    let mut config = DeployConfig::load(overrides.config.as_deref())?;
    if let Some(output) = overrides.output {
        config.output_directory = output;
    }
    if let Some(version) = overrides.ligo_version {
        config.ligo_version = version;
    }
    if overrides.local_ligo {
        config.dockerized_ligo = false;
    }
    let ctx = CliContext {
        config,
        working_dir: std::env::current_dir()?,
        json_output,
    };

    match command {
        Commands::Compile(cmd) => cmd.execute(&ctx).await,
        Commands::CompileLambda(cmd) => cmd.execute(&ctx).await,
        Commands::CompileFactoryLambda(cmd) => cmd.execute(&ctx).await,
        Commands::Migrate(cmd) => cmd.execute(&ctx).await,
        Commands::Doctor(cmd) => cmd.execute(&ctx).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let Cli {
        command,
        config,
        output,
        ligo_version,
        local_ligo,
        json_output,
        debug_json,
        log_format,
        verbose,
    } = Cli::parse();
    let command_name = command.name();

    logging::init(&LogConfig::default().with_format(log_format).verbose(verbose))?;

    let overrides = Overrides {
        config,
        output,
        ligo_version,
        local_ligo,
    };
    let result = run(command, overrides, json_output).await;

    if debug_json {
        if let Err(err) = &result {
            eprintln!(
                "{}",
                deploy_cli::output::format_debug_diagnostic_json(
                    command_name,
                    err,
                    deploy_cli::output::default_diagnostic_hints(command_name, err),
                )
            );
        }
    }

    result
}
