//! Base58check validation for implicit (`tz1`/`tz2`/`tz3`) and originated
//! (`KT1`) account addresses.

use std::fmt;

const ADDRESS_LENGTH: usize = 36;
const HASH_LENGTH: usize = 20;

const PREFIXES: &[(&str, [u8; 3])] = &[
    ("tz1", [6, 161, 159]),
    ("tz2", [6, 161, 161]),
    ("tz3", [6, 161, 164]),
    ("KT1", [2, 90, 121]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    NoPrefixMatched,
    InvalidChecksum,
    InvalidLength,
    NotAContract,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            AddressError::NoPrefixMatched => "NO_PREFIX_MATCHED",
            AddressError::InvalidChecksum => "INVALID_CHECKSUM",
            AddressError::InvalidLength => "INVALID_LENGTH",
            AddressError::NotAContract => "NOT_A_CONTRACT",
        };
        f.write_str(code)
    }
}

impl std::error::Error for AddressError {}

/// Validate any account address.
pub fn validate_address(address: &str) -> Result<(), AddressError> {
    let (_, prefix_bytes) = PREFIXES
        .iter()
        .find(|(prefix, _)| address.starts_with(prefix))
        .ok_or(AddressError::NoPrefixMatched)?;

    if address.len() != ADDRESS_LENGTH {
        return Err(AddressError::InvalidLength);
    }

    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| AddressError::InvalidChecksum)?;

    if decoded.len() != prefix_bytes.len() + HASH_LENGTH || decoded[..3] != prefix_bytes[..] {
        return Err(AddressError::InvalidLength);
    }
    Ok(())
}

/// Validate an originated contract address (`KT1...`).
pub fn validate_contract_address(address: &str) -> Result<(), AddressError> {
    validate_address(address)?;
    if address.starts_with("KT1") {
        Ok(())
    } else {
        Err(AddressError::NotAContract)
    }
}
