//! Shared types for the lambda-deploy workspace.
//!
//! - [`lambda`]: fragment descriptors, compiled fragments and function tables
//! - [`artifact`]: the on-disk build artifact and its per-network deployment records
//! - [`operation`]: ledger operation payloads, handles, blocks and inclusion records
//! - [`micheline`]: helpers for the Micheline JSON values the pipeline passes around
//! - [`address`]: account/contract address validation

pub mod address;
pub mod artifact;
pub mod lambda;
pub mod micheline;
pub mod operation;

pub use address::{validate_address, validate_contract_address, AddressError};
pub use artifact::{BuildArtifact, CompilerInfo};
pub use lambda::{CompiledFragment, FragmentDescriptor, FunctionTable, FunctionTables, LambdaType};
pub use operation::{
    Block, BlockId, InclusionRecord, OperationEntry, OperationHandle, OperationPayload,
};
