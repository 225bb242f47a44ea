//! Lambda contract deployment tooling.
//!
//! The pipeline itself lives in [`lambda_deploy_core`]; this crate adds what
//! the `lambda-deploy` binary needs on top of it:
//!
//! - [`migrations`]: the ordered registry of deployment steps
//! - [`storage`]: initial storage templates with variable substitution
//! - [`logging`]: tracing subscriber setup

#![allow(clippy::result_large_err)]

pub mod logging;
pub mod migrations;
pub mod storage;

pub use migrations::{run_migrations, select, Migration, MigrationContext, MIGRATIONS};
