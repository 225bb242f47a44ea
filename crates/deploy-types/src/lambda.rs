//! Lambda fragments and the function tables they are grouped into.
//!
//! A contract in this family keeps its entrypoint logic in storage as packed
//! lambdas, one big_map per subsystem ([`LambdaType`]). Each slot is addressed by
//! a caller-assigned index, and the pipeline only ever moves the packed bytes
//! around without looking inside them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::micheline;
use crate::operation::OperationPayload;

/// Logical subsystem a lambda belongs to.
///
/// The declaration order is the upload order: some subsystems dispatch through
/// others, so Admin is wired before Token, and Token before Dex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LambdaType {
    Admin,
    Token,
    Dex,
    Dev,
    Strategy,
    Permit,
}

impl LambdaType {
    pub const ALL: [LambdaType; 6] = [
        LambdaType::Admin,
        LambdaType::Token,
        LambdaType::Dex,
        LambdaType::Dev,
        LambdaType::Strategy,
        LambdaType::Permit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LambdaType::Admin => "Admin",
            LambdaType::Token => "Token",
            LambdaType::Dex => "Dex",
            LambdaType::Dev => "Dev",
            LambdaType::Strategy => "Strategy",
            LambdaType::Permit => "Permit",
        }
    }

    /// Entrypoint that stores one lambda of this type, e.g. `set_dex_function`.
    pub fn entrypoint(&self) -> String {
        format!("set_{}_function", self.as_str().to_lowercase())
    }

    /// Constructor used in the source language to build the setter parameter,
    /// e.g. `Set_dex_function`.
    pub fn setter_constructor(&self) -> String {
        format!("Set_{}_function", self.as_str().to_lowercase())
    }

    /// Conventional name of the descriptor/table file for this type.
    pub fn table_file_name(&self) -> String {
        format!("{}_lambdas.json", self.as_str())
    }
}

impl fmt::Display for LambdaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LambdaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LambdaType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown lambda type '{}', expected one of: {}",
                    s,
                    LambdaType::ALL
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// One lambda declared by the caller: its storage slot and its source symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    pub index: u32,
    pub name: String,
}

impl FragmentDescriptor {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// Packed bytes produced by the compiler for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFragment {
    pub index: u32,
    pub name: String,
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

impl CompiledFragment {
    /// Setter argument expected by the contract: `Pair <bytes> <index>`.
    pub fn setter_arg(&self) -> Value {
        micheline::pair_bytes_index(&self.bytes, self.index)
    }
}

/// Ordered fragments of one subsystem, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionTable {
    pub lambda_type: LambdaType,
    /// Source the fragments were compiled against (relative path).
    pub contract: String,
    pub fragments: Vec<CompiledFragment>,
}

impl FunctionTable {
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// One `set_<type>_function` call per fragment, in table order.
    pub fn setter_calls(&self, destination: &str) -> Vec<OperationPayload> {
        let entrypoint = self.lambda_type.entrypoint();
        self.fragments
            .iter()
            .map(|fragment| OperationPayload::EntrypointCall {
                destination: destination.to_string(),
                entrypoint: entrypoint.clone(),
                arg: fragment.setter_arg(),
                amount_mutez: 0,
            })
            .collect()
    }

    /// The table as a `big_map nat bytes` literal, for tables embedded in
    /// initial storage instead of uploaded after origination.
    pub fn to_storage_map(&self) -> Value {
        micheline::big_map_literal(
            self.fragments
                .iter()
                .map(|f| (f.index, f.bytes.as_slice())),
        )
    }
}

/// All tables of one build, keyed (and therefore iterated) in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTables {
    tables: BTreeMap<LambdaType, FunctionTable>,
}

impl FunctionTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table, returning the one it replaced.
    pub fn insert(&mut self, table: FunctionTable) -> Option<FunctionTable> {
        self.tables.insert(table.lambda_type, table)
    }

    pub fn get(&self, lambda_type: LambdaType) -> Option<&FunctionTable> {
        self.tables.get(&lambda_type)
    }

    pub fn remove(&mut self, lambda_type: LambdaType) -> Option<FunctionTable> {
        self.tables.remove(&lambda_type)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables in upload order: Admin, Token, Dex, then the rest.
    pub fn in_upload_order(&self) -> impl Iterator<Item = &FunctionTable> {
        self.tables.values()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
