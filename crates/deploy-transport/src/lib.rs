//! Ledger Transport Layer
//!
//! Everything the deployment pipeline needs from a Tezos node, behind the
//! [`Ledger`] trait:
//! - [`rpc`]: blocking HTTP client for block and storage reads
//! - [`octez`]: `octez-client` wrapper for signing and injecting operations
//! - [`network`]: endpoint resolution for named networks
//!
//! # Example
//!
//! ```ignore
//! use lambda_deploy_transport::{Ledger, NodeLedger, OctezClient, RpcClient};
//!
//! let rpc = RpcClient::new("http://localhost:20000");
//! let octez = OctezClient::new("octez-client", "http://localhost:20000");
//! let signer = octez.import_secret_key("deployer", &secret_key).await?;
//! let ledger = NodeLedger::new(rpc, octez);
//! let head = ledger.get_block(BlockId::Head).await?;
//! ```

pub mod ledger;
pub mod network;
pub mod octez;
pub mod rpc;

pub use ledger::{Ledger, NodeLedger, SignerIdentity};
pub use network::resolve_endpoint;
pub use octez::OctezClient;
pub use rpc::RpcClient;
