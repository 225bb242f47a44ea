//! Compile, pack, submit and confirm pipeline for lambda-dispatched contracts.
//!
//! Leaf first:
//! - [`compiler`]: LIGO invocation (local or dockerized) for fragments and contracts
//! - [`packer`]: descriptors + compiled fragments -> ordered function tables
//! - [`artifacts`]: per-contract build artifacts on disk
//! - [`orchestrator`]: originate a contract and wire its tables in
//! - [`batch`]: bounded operation groups, submitted and confirmed in order
//! - [`confirmation`]: find the block that included an operation
//!
//! Errors from every stage are [`DeployError`]s.

pub mod artifacts;
pub mod batch;
pub mod compiler;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod packer;
pub mod paths;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use artifacts::ArtifactStore;
pub use batch::{chunk, BatchMode, BatchSubmitter};
pub use compiler::{CompilerSettings, CompilerStrategy, ContractBuild, LigoCompiler, MichelsonFormat};
pub use config::DeployConfig;
pub use confirmation::{confirm, ConfirmOptions, ConfirmationWindow};
pub use error::{BatchError, DeployError};
pub use health::{run_doctor, DoctorConfig, DoctorReport};
pub use orchestrator::{DeployContext, DeployReport, Deployment, TableUpload};
