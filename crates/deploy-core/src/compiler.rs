//! LIGO fragment and contract compiler.
//!
//! The compiler runs either as a local binary or inside the `ligolang/ligo`
//! image with the working tree mounted at the same path, so relative source
//! references resolve the same way under both strategies. Which one is used
//! is decided once by [`LigoCompiler::probe`].

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use lambda_deploy_types::micheline::{as_bytes, find_packed_fragment};
use lambda_deploy_types::{
    BuildArtifact, CompiledFragment, CompilerInfo, FragmentDescriptor, FunctionTable, LambdaType,
};

use crate::artifacts::ArtifactStore;
use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::packer;
use crate::paths::{contract_name_of, relative_display};

const LIGO_IMAGE: &str = "ligolang/ligo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerStrategy {
    Local,
    Docker,
}

impl CompilerStrategy {
    fn other(self) -> Self {
        match self {
            CompilerStrategy::Local => CompilerStrategy::Docker,
            CompilerStrategy::Docker => CompilerStrategy::Local,
        }
    }
}

impl std::fmt::Display for CompilerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompilerStrategy::Local => write!(f, "local"),
            CompilerStrategy::Docker => write!(f, "docker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MichelsonFormat {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub ligo_version: String,
    pub flavor: String,
    pub local_path: PathBuf,
    pub docker_path: PathBuf,
    pub protocol: String,
    pub preferred: CompilerStrategy,
    /// Mounted into the container and used to resolve relative sources.
    pub working_dir: PathBuf,
    pub timeout: Duration,
    /// Max fragment compiles in flight.
    pub concurrency: usize,
    /// Fragments left out of tables compiled against a factory contract.
    pub factory_excluded: Vec<String>,
}

impl CompilerSettings {
    pub fn from_config(config: &DeployConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            ligo_version: config.ligo_version.clone(),
            flavor: config.preferred_ligo_flavor.clone(),
            local_path: PathBuf::from(&config.ligo_local_path),
            docker_path: PathBuf::from(&config.docker_path),
            protocol: config.protocol.clone(),
            preferred: if config.dockerized_ligo {
                CompilerStrategy::Docker
            } else {
                CompilerStrategy::Local
            },
            working_dir: working_dir.into(),
            timeout: config.compile_timeout(),
            concurrency: config.compile_concurrency.max(1),
            factory_excluded: config.factory_excluded_lambdas.clone(),
        }
    }
}

/// Whether `version` predates the `compile <kind>` subcommand layout (0.25).
pub fn uses_legacy_cli(version: &str) -> bool {
    let mut parts = version.trim().trim_start_matches('v').split('.');
    let major = parts.next().and_then(|p| p.parse::<u32>().ok());
    let minor = parts.next().and_then(|p| p.parse::<u32>().ok());
    matches!((major, minor), (Some(0), Some(minor)) if minor < 25)
}

/// Fragments compiled against a factory are packed bare; the factory pairs
/// them with their index itself.
pub fn is_factory_target(contract_path: &Path) -> bool {
    contract_path
        .to_string_lossy()
        .to_lowercase()
        .contains("factory")
}

/// Source expression compiled for one fragment.
pub fn fragment_expression(
    lambda_type: LambdaType,
    descriptor: &FragmentDescriptor,
    factory: bool,
) -> String {
    if factory {
        format!("Bytes.pack({})", descriptor.name)
    } else {
        format!(
            "{}(record [index={}n; func=Bytes.pack({})])",
            lambda_type.setter_constructor(),
            descriptor.index,
            descriptor.name
        )
    }
}

/// SHA-256 of a source text, hex encoded.
pub fn source_hash(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Result of a contract build request.
#[derive(Debug, Clone)]
pub enum ContractBuild {
    Compiled(BuildArtifact),
    /// Same source, compiler and hash as the stored artifact; the compiler
    /// did not run and only `updatedAt` changed.
    UpToDate(BuildArtifact),
}

impl ContractBuild {
    pub fn artifact(&self) -> &BuildArtifact {
        match self {
            ContractBuild::Compiled(a) | ContractBuild::UpToDate(a) => a,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LigoCompiler {
    settings: CompilerSettings,
    strategy: CompilerStrategy,
}

impl LigoCompiler {
    /// Use `strategy` without checking that it works.
    pub fn with_strategy(settings: CompilerSettings, strategy: CompilerStrategy) -> Self {
        Self { settings, strategy }
    }

    /// Health-check the preferred strategy, falling back to the other one once.
    pub async fn probe(settings: CompilerSettings) -> Result<Self, DeployError> {
        let preferred = settings.preferred;
        let mut compiler = Self::with_strategy(settings, preferred);
        let first = match compiler.health_check().await {
            Ok(()) => {
                info!(strategy = %preferred, version = %compiler.settings.ligo_version, "ligo ready");
                return Ok(compiler);
            }
            Err(e) => e,
        };
        warn!(strategy = %preferred, error = %first, "ligo unavailable, trying fallback");

        compiler.strategy = preferred.other();
        match compiler.health_check().await {
            Ok(()) => {
                info!(strategy = %compiler.strategy, version = %compiler.settings.ligo_version, "ligo ready");
                Ok(compiler)
            }
            Err(second) => Err(DeployError::configuration(format!(
                "no working ligo: {} ({}); {} ({})",
                preferred, first, compiler.strategy, second
            ))),
        }
    }

    pub fn strategy(&self) -> CompilerStrategy {
        self.strategy
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn version(&self) -> &str {
        &self.settings.ligo_version
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        let mut command = self.command(vec!["--help".to_string()]);
        let output = tokio::time::timeout(self.settings.timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {}s", self.settings.timeout.as_secs()))??;
        if !output.status.success() {
            anyhow::bail!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn command(&self, ligo_args: Vec<String>) -> TokioCommand {
        let mut command = match self.strategy {
            CompilerStrategy::Local => TokioCommand::new(&self.settings.local_path),
            CompilerStrategy::Docker => {
                let cwd = self.settings.working_dir.display().to_string();
                let mut c = TokioCommand::new(&self.settings.docker_path);
                c.args(["run", "--rm", "-i", "-v"])
                    .arg(format!("{}:{}", cwd, cwd))
                    .arg("-w")
                    .arg(&cwd)
                    .arg(format!("{}:{}", LIGO_IMAGE, self.settings.ligo_version));
                c
            }
        };
        command
            .args(ligo_args)
            .current_dir(&self.settings.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run one compiler command and return its stdout.
    ///
    /// Any stderr containing "err" (any case) fails the command even on a
    /// zero exit; other stderr output is logged.
    async fn run(&self, target: &str, ligo_args: Vec<String>) -> Result<String, DeployError> {
        debug!(what = target, strategy = %self.strategy, args = ?ligo_args, "ligo");
        let mut command = self.command(ligo_args);
        let output = tokio::time::timeout(self.settings.timeout, command.output())
            .await
            .map_err(|_| DeployError::Compilation {
                target: target.to_string(),
                diagnostics: format!(
                    "compiler timed out after {}s",
                    self.settings.timeout.as_secs()
                ),
            })?
            .map_err(|e| DeployError::Compilation {
                target: target.to_string(),
                diagnostics: format!("failed to start compiler: {}", e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.to_lowercase().contains("err") || !output.status.success() {
            return Err(DeployError::Compilation {
                target: target.to_string(),
                diagnostics: if stderr.is_empty() {
                    format!("compiler exited with {}", output.status)
                } else {
                    stderr
                },
            });
        }
        if !stderr.is_empty() {
            warn!(what = target, stderr = %stderr, "compiler warning");
        }
        Ok(stdout)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.working_dir.join(path)
        }
    }

    fn expression_args(&self, expression: &str, init_file: &Path) -> Vec<String> {
        let init_file = self.resolve(init_file).display().to_string();
        if uses_legacy_cli(&self.settings.ligo_version) {
            vec![
                "compile-expression".to_string(),
                self.settings.flavor.clone(),
                expression.to_string(),
                "--michelson-format=json".to_string(),
                format!("--init-file={}", init_file),
                format!("--protocol={}", self.settings.protocol),
            ]
        } else {
            vec![
                "compile".to_string(),
                "expression".to_string(),
                self.settings.flavor.clone(),
                expression.to_string(),
                "--michelson-format".to_string(),
                "json".to_string(),
                "--init-file".to_string(),
                init_file,
                "--protocol".to_string(),
                self.settings.protocol.clone(),
            ]
        }
    }

    fn contract_args(&self, source: &Path, format: MichelsonFormat) -> Vec<String> {
        let source = source.display().to_string();
        let mut args = if uses_legacy_cli(&self.settings.ligo_version) {
            vec![
                "compile-contract".to_string(),
                source,
                "main".to_string(),
                format!("--protocol={}", self.settings.protocol),
            ]
        } else {
            vec![
                "compile".to_string(),
                "contract".to_string(),
                source,
                "-e".to_string(),
                "main".to_string(),
                "--protocol".to_string(),
                self.settings.protocol.clone(),
            ]
        };
        if format == MichelsonFormat::Json {
            if uses_legacy_cli(&self.settings.ligo_version) {
                args.push("--michelson-format=json".to_string());
            } else {
                args.push("--michelson-format".to_string());
                args.push("json".to_string());
            }
        }
        args
    }

    /// Compile one expression in the context of `init_file`, as Micheline JSON.
    pub async fn compile_expression(
        &self,
        target: &str,
        expression: &str,
        init_file: &Path,
    ) -> Result<Value, DeployError> {
        let stdout = self
            .run(target, self.expression_args(expression, init_file))
            .await?;
        serde_json::from_str(&stdout).map_err(|e| DeployError::Compilation {
            target: target.to_string(),
            diagnostics: format!("compiler output is not JSON ({}): {}", e, stdout),
        })
    }

    pub async fn compile_fragment(
        &self,
        lambda_type: LambdaType,
        descriptor: &FragmentDescriptor,
        contract_path: &Path,
    ) -> Result<CompiledFragment, DeployError> {
        let factory = is_factory_target(contract_path);
        let target = format!("{} lambda '{}'", lambda_type, descriptor.name);
        let expression = fragment_expression(lambda_type, descriptor, factory);
        let value = self
            .compile_expression(&target, &expression, contract_path)
            .await?;

        let packed = if factory {
            as_bytes(&value)
        } else {
            find_packed_fragment(&value, descriptor.index)
        };
        let bytes = packed.ok_or_else(|| DeployError::Compilation {
            target: target.clone(),
            diagnostics: format!("no packed lambda for index {} in {}", descriptor.index, value),
        })?;

        debug!(lambda_type = %lambda_type, index = descriptor.index, name = %descriptor.name, size = bytes.len(), "fragment compiled");
        Ok(CompiledFragment {
            index: descriptor.index,
            name: descriptor.name.clone(),
            bytes,
        })
    }

    /// Compile every descriptor of one type against `contract_path` and pack
    /// the results. The first failure aborts the whole table.
    pub async fn compile_table(
        &self,
        lambda_type: LambdaType,
        descriptors: &[FragmentDescriptor],
        contract_path: &Path,
    ) -> Result<FunctionTable, DeployError> {
        packer::check_unique_indices(lambda_type, descriptors)?;
        let selected = if is_factory_target(contract_path) {
            packer::select(descriptors, |d| {
                !self.settings.factory_excluded.contains(&d.name)
            })
        } else {
            descriptors.to_vec()
        };

        info!(
            lambda_type = %lambda_type,
            count = selected.len(),
            skipped = descriptors.len() - selected.len(),
            contract = %contract_path.display(),
            "compiling function table"
        );
        let compiled: Vec<CompiledFragment> = stream::iter(selected.iter())
            .map(|d| self.compile_fragment(lambda_type, d, contract_path))
            .buffered(self.settings.concurrency)
            .try_collect()
            .await?;

        let contract = relative_display(&self.resolve(contract_path), &self.settings.working_dir);
        packer::pack(lambda_type, &contract, &selected, compiled)
    }

    /// Compile one bare `Bytes.pack(<name>)` against a factory contract.
    pub async fn compile_factory_lambda(
        &self,
        name: &str,
        factory_path: &Path,
    ) -> Result<Vec<u8>, DeployError> {
        let target = format!("factory lambda '{}'", name);
        let value = self
            .compile_expression(&target, &format!("Bytes.pack({})", name), factory_path)
            .await?;
        as_bytes(&value).ok_or_else(|| DeployError::Compilation {
            target,
            diagnostics: format!("expected a bytes literal, got {}", value),
        })
    }

    fn read_source(&self, source: &Path) -> Result<String, DeployError> {
        let full = self.resolve(source);
        let text = std::fs::read_to_string(&full).map_err(|e| DeployError::io(&full, e))?;
        if text.trim().is_empty() {
            return Err(DeployError::EmptySource { path: full });
        }
        Ok(text)
    }

    /// Compile a contract to Michelson text.
    pub async fn compile_contract_text(&self, source: &Path) -> Result<String, DeployError> {
        self.read_source(source)?;
        self.run(
            &format!("contract {}", source.display()),
            self.contract_args(source, MichelsonFormat::Text),
        )
        .await
    }

    /// Compile a contract into its build artifact.
    ///
    /// The compiler run is skipped when the stored artifact has the same
    /// source path, compiler version and source hash, unless `force`. The
    /// artifact is rewritten either way, so `updatedAt` always advances.
    pub async fn compile_contract(
        &self,
        source: &Path,
        store: &ArtifactStore,
        force: bool,
    ) -> Result<ContractBuild, DeployError> {
        let contract_name = contract_name_of(source).ok_or_else(|| {
            DeployError::configuration(format!("cannot name contract from {}", source.display()))
        })?;
        let text = self.read_source(source)?;
        let source_path = relative_display(&self.resolve(source), &self.settings.working_dir);
        let hash = source_hash(&text);

        if let Some(existing) = store.check_source(&contract_name, &source_path)? {
            if !force && existing.is_up_to_date(&source_path, self.version(), &hash) {
                info!(contract = %contract_name, "up to date, skipping compiler");
                let mut artifact = existing;
                artifact.touch();
                return Ok(ContractBuild::UpToDate(store.write(artifact)?));
            }
        }

        let target = format!("contract {}", source_path);
        let stdout = self
            .run(&target, self.contract_args(source, MichelsonFormat::Json))
            .await?;
        let michelson: Value = serde_json::from_str(&stdout).map_err(|e| DeployError::Compilation {
            target: target.clone(),
            diagnostics: format!("compiler output is not JSON: {}", e),
        })?;

        let mut artifact = BuildArtifact::new(
            &contract_name,
            &source_path,
            CompilerInfo::ligo(self.version()),
            michelson,
        );
        artifact.source_hash = Some(hash);
        let artifact = store.write(artifact)?;
        Ok(ContractBuild::Compiled(artifact))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stand-in for `ligo`. Setter expressions answer with a Right-wrapped
    /// `Pair 0x05<index> <index>`; bare packs answer `0x05aa`; contracts
    /// answer a one-instruction script. `fail_on` makes a name print an
    /// error to stderr.
    const FAKE_LIGO: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then echo "ligo help"; exit 0; fi
echo "$@" >> "$(dirname "$0")/calls.log"
case "$*" in
  *FAIL_NAME*) echo "Error: unbound variable" >&2; exit 0 ;;
esac
if [ "$1" = "compile-expression" ]; then expr="$3"; else expr="$4"; fi
case "$1 $2" in
  "compile expression"|"compile-expression "*)
    case "$expr" in
      *record*)
        idx=$(echo "$expr" | sed -n 's/.*index=\([0-9]*\)n.*/\1/p')
        printf '{"prim":"Right","args":[{"prim":"Pair","args":[{"bytes":"05%02x"},{"int":"%s"}]}]}\n' "$idx" "$idx"
        ;;
      *) echo '{"bytes":"05aa"}' ;;
    esac
    ;;
  "compile contract"|"compile-contract "*)
    echo "Warning: unused variable" >&2
    case "$*" in
      *json*) echo '[{"prim":"parameter","args":[{"prim":"unit"}]}]' ;;
      *) echo 'parameter unit;' ;;
    esac
    ;;
  *) echo "unknown command" >&2; exit 3 ;;
esac
"#;

    /// Stand-in for `docker run`: logs its argv, drops the eight arguments
    /// before the image's command and hands the rest to the fake `ligo`.
    const FAKE_DOCKER: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/docker.log"
shift 8
exec "$(dirname "$0")/ligo" "$@"
"#;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let ligo = dir.path().join("ligo");
            std::fs::write(&ligo, FAKE_LIGO).unwrap();
            std::fs::set_permissions(&ligo, std::fs::Permissions::from_mode(0o755)).unwrap();
            std::fs::create_dir_all(dir.path().join("contracts/main")).unwrap();
            std::fs::write(dir.path().join("contracts/main/dex.ligo"), "function main() is ...").unwrap();
            std::fs::write(dir.path().join("contracts/main/factory.ligo"), "function main() is ...").unwrap();
            Self { dir }
        }

        fn settings(&self, preferred: CompilerStrategy) -> CompilerSettings {
            CompilerSettings {
                ligo_version: "0.31.0".to_string(),
                flavor: "pascaligo".to_string(),
                local_path: self.dir.path().join("ligo"),
                docker_path: self.dir.path().join("no-docker-here"),
                protocol: "hangzhou".to_string(),
                preferred,
                working_dir: self.dir.path().to_path_buf(),
                timeout: Duration::from_secs(20),
                concurrency: 2,
                factory_excluded: vec!["add_pool".to_string()],
            }
        }

        fn compiler(&self) -> LigoCompiler {
            LigoCompiler::with_strategy(self.settings(CompilerStrategy::Local), CompilerStrategy::Local)
        }

        fn install_docker(&self) -> PathBuf {
            let docker = self.dir.path().join("docker");
            std::fs::write(&docker, FAKE_DOCKER).unwrap();
            std::fs::set_permissions(&docker, std::fs::Permissions::from_mode(0o755)).unwrap();
            docker
        }

        fn calls(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("calls.log")).unwrap_or_default()
        }
    }

    #[test]
    fn test_legacy_cli_detection() {
        assert!(uses_legacy_cli("0.24.0"));
        assert!(uses_legacy_cli("0.9.1"));
        assert!(!uses_legacy_cli("0.25.0"));
        assert!(!uses_legacy_cli("0.31.0"));
        assert!(!uses_legacy_cli("1.0.0"));
        assert!(!uses_legacy_cli("next"));
    }

    #[test]
    fn test_fragment_expressions() {
        let d = FragmentDescriptor::new(3, "swap");
        assert_eq!(
            fragment_expression(LambdaType::Dex, &d, false),
            "Set_dex_function(record [index=3n; func=Bytes.pack(swap)])"
        );
        assert_eq!(fragment_expression(LambdaType::Dex, &d, true), "Bytes.pack(swap)");
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_local() {
        let fx = Fixture::new();
        let compiler = LigoCompiler::probe(fx.settings(CompilerStrategy::Docker)).await.unwrap();
        assert_eq!(compiler.strategy(), CompilerStrategy::Local);
    }

    #[tokio::test]
    async fn test_probe_fails_when_both_strategies_fail() {
        let fx = Fixture::new();
        let mut settings = fx.settings(CompilerStrategy::Local);
        settings.local_path = fx.dir.path().join("missing-ligo");
        let err = LigoCompiler::probe(settings).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test]
    async fn test_docker_mounts_working_tree_at_same_path() {
        let fx = Fixture::new();
        let mut settings = fx.settings(CompilerStrategy::Docker);
        settings.docker_path = fx.install_docker();
        let compiler = LigoCompiler::probe(settings).await.unwrap();
        assert_eq!(compiler.strategy(), CompilerStrategy::Docker);

        let table = compiler
            .compile_table(
                LambdaType::Admin,
                &[FragmentDescriptor::new(0, "set_admin")],
                Path::new("contracts/main/dex.ligo"),
            )
            .await
            .unwrap();
        assert_eq!(table.len(), 1);

        let cwd = fx.dir.path().display().to_string();
        let docker_log = std::fs::read_to_string(fx.dir.path().join("docker.log")).unwrap();
        let prefix = format!("run --rm -i -v {cwd}:{cwd} -w {cwd} ligolang/ligo:0.31.0 ");
        let lines: Vec<&str> = docker_log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with(&prefix)), "{}", docker_log);
        assert_eq!(lines[0], format!("{prefix}--help"));
        assert!(lines[1].contains("compile expression pascaligo"));
    }

    #[tokio::test]
    async fn test_legacy_cli_argument_layout() {
        let fx = Fixture::new();
        let mut settings = fx.settings(CompilerStrategy::Local);
        settings.ligo_version = "0.24.0".to_string();
        let compiler = LigoCompiler::with_strategy(settings, CompilerStrategy::Local);

        let table = compiler
            .compile_table(
                LambdaType::Dex,
                &[FragmentDescriptor::new(4, "swap")],
                Path::new("contracts/main/dex.ligo"),
            )
            .await
            .unwrap();
        assert_eq!(table.fragments[0].bytes, vec![0x05, 0x04]);
        let text = compiler
            .compile_contract_text(Path::new("contracts/main/dex.ligo"))
            .await
            .unwrap();
        assert_eq!(text, "parameter unit;");

        let init_file = fx.dir.path().join("contracts/main/dex.ligo");
        let calls = fx.calls();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(
            lines[0],
            format!(
                "compile-expression pascaligo Set_dex_function(record [index=4n; func=Bytes.pack(swap)]) \
                 --michelson-format=json --init-file={} --protocol=hangzhou",
                init_file.display()
            )
        );
        assert_eq!(lines[1], "compile-contract contracts/main/dex.ligo main --protocol=hangzhou");
        assert!(!calls.contains("compile expression"));
    }

    #[tokio::test]
    async fn test_compile_table_orders_by_index() {
        let fx = Fixture::new();
        let descriptors = vec![
            FragmentDescriptor::new(1, "swap"),
            FragmentDescriptor::new(0, "set_admin"),
            FragmentDescriptor::new(2, "invest"),
        ];
        let table = fx
            .compiler()
            .compile_table(LambdaType::Dex, &descriptors, Path::new("contracts/main/dex.ligo"))
            .await
            .unwrap();
        let indices: Vec<u32> = table.fragments.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(table.fragments[2].bytes, vec![0x05, 0x02]);
        assert_eq!(table.contract, "contracts/main/dex.ligo");
        assert!(fx.calls().contains("--init-file"));
    }

    #[tokio::test]
    async fn test_factory_table_excludes_deployer_only_lambdas() {
        let fx = Fixture::new();
        let descriptors = vec![
            FragmentDescriptor::new(0, "add_pool"),
            FragmentDescriptor::new(1, "swap"),
        ];
        let table = fx
            .compiler()
            .compile_table(LambdaType::Dex, &descriptors, Path::new("contracts/main/factory.ligo"))
            .await
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.fragments[0].index, 1);
        assert_eq!(table.fragments[0].bytes, vec![0x05, 0xaa]);
        assert!(!fx.calls().contains("add_pool"));
    }

    #[tokio::test]
    async fn test_stderr_error_aborts_whole_table() {
        let fx = Fixture::new();
        let descriptors = vec![
            FragmentDescriptor::new(0, "set_admin"),
            FragmentDescriptor::new(1, "FAIL_NAME"),
        ];
        let err = fx
            .compiler()
            .compile_table(LambdaType::Admin, &descriptors, Path::new("contracts/main/dex.ligo"))
            .await
            .unwrap_err();
        match err {
            DeployError::Compilation { diagnostics, .. } => {
                assert!(diagnostics.contains("unbound variable"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_index_detected_before_compiling() {
        let fx = Fixture::new();
        let descriptors = vec![
            FragmentDescriptor::new(0, "transfer"),
            FragmentDescriptor::new(0, "update_operators"),
        ];
        let err = fx
            .compiler()
            .compile_table(LambdaType::Token, &descriptors, Path::new("contracts/main/dex.ligo"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "duplicate_index");
        assert!(fx.calls().is_empty());
    }

    #[tokio::test]
    async fn test_compile_contract_then_skip_then_force() {
        let fx = Fixture::new();
        let compiler = fx.compiler();
        let store = ArtifactStore::new(fx.dir.path().join("build"));
        let source = Path::new("contracts/main/dex.ligo");

        let first = compiler.compile_contract(source, &store, false).await.unwrap();
        assert!(matches!(first, ContractBuild::Compiled(_)));
        assert_eq!(first.artifact().source_path, "contracts/main/dex.ligo");
        assert!(first.artifact().source_hash.is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = compiler.compile_contract(source, &store, false).await.unwrap();
        assert!(matches!(second, ContractBuild::UpToDate(_)));
        let on_disk = store.require("dex").unwrap();
        assert!(on_disk.updated_at > first.artifact().updated_at);
        assert_eq!(on_disk.updated_at, second.artifact().updated_at);
        assert_eq!(on_disk.michelson, first.artifact().michelson);

        let third = compiler.compile_contract(source, &store, true).await.unwrap();
        assert!(matches!(third, ContractBuild::Compiled(_)));
        assert_eq!(fx.calls().matches("compile contract").count(), 2);
    }

    #[tokio::test]
    async fn test_empty_source_is_an_error() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("contracts/main/empty.ligo"), "  \n").unwrap();
        let store = ArtifactStore::new(fx.dir.path().join("build"));
        let err = fx
            .compiler()
            .compile_contract(Path::new("contracts/main/empty.ligo"), &store, false)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "empty_source");
        assert!(store.read("empty").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contract_text_and_factory_lambda() {
        let fx = Fixture::new();
        let compiler = fx.compiler();
        let text = compiler
            .compile_contract_text(Path::new("contracts/main/dex.ligo"))
            .await
            .unwrap();
        assert_eq!(text, "parameter unit;");

        let bytes = compiler
            .compile_factory_lambda("swap", Path::new("contracts/main/factory.ligo"))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0x05, 0xaa]);
    }
}
