//! Preimage keys used to address values served by the host.

use crate::errors::PreimageOracleError;
use alloy_primitives::{Keccak256, B256, U256};

/// The type byte of a [PreimageKey].
///
/// <https://specs.optimism.io/fault-proof/index.html#pre-image-key-types>
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum PreimageKeyType {
    /// Boot parameters of a single program instance, addressed by a `u64` identifier.
    Local = 1,
    /// Global values addressed by the low 31 bytes of their `keccak256` digest.
    #[default]
    Keccak256 = 2,
    /// Reserved.
    GlobalGeneric = 3,
    /// Global values addressed by the low 31 bytes of their `sha256` digest.
    Sha256 = 4,
    /// Blob field elements, addressed by `keccak256(commitment ++ z)`.
    Blob = 5,
    /// Precompile results, addressed by `keccak256(precompile_addr ++ input)`.
    Precompile = 6,
}

impl TryFrom<u8> for PreimageKeyType {
    type Error = PreimageOracleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Local,
            2 => Self::Keccak256,
            3 => Self::GlobalGeneric,
            4 => Self::Sha256,
            5 => Self::Blob,
            6 => Self::Precompile,
            _ => return Err(PreimageOracleError::InvalidPreimageKey),
        })
    }
}

/// A 32-byte preimage key: one type byte followed by the 31 low-order bytes of the digest (or the
/// local identifier).
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PreimageKey {
    key_type: PreimageKeyType,
    data: [u8; 31],
}

impl PreimageKey {
    /// Builds a key of the given type from a 32-byte digest. The high-order byte of the digest is
    /// dropped.
    pub fn new(digest: [u8; 32], key_type: PreimageKeyType) -> Self {
        let mut data = [0u8; 31];
        data.copy_from_slice(&digest[1..]);
        Self { key_type, data }
    }

    /// Builds a [PreimageKeyType::Local] key. The identifier occupies the low 8 bytes.
    pub fn new_local(ident: u64) -> Self {
        let mut data = [0u8; 31];
        data[23..].copy_from_slice(&ident.to_be_bytes());
        Self { key_type: PreimageKeyType::Local, data }
    }

    /// Builds a [PreimageKeyType::Keccak256] key from a `keccak256` digest.
    pub fn new_keccak256(digest: [u8; 32]) -> Self {
        Self::new(digest, PreimageKeyType::Keccak256)
    }

    /// Builds a [PreimageKeyType::Precompile] key for a precompile call.
    pub fn new_precompile(address: [u8; 20], input: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(address);
        hasher.update(input);
        Self::new(hasher.finalize().0, PreimageKeyType::Precompile)
    }

    /// Returns the type of the key.
    pub const fn key_type(&self) -> PreimageKeyType {
        self.key_type
    }

    /// Returns the 31-byte payload of the key as an integer.
    pub const fn key_value(&self) -> U256 {
        U256::from_be_slice(self.data.as_slice())
    }
}

impl From<PreimageKey> for [u8; 32] {
    fn from(key: PreimageKey) -> Self {
        let mut raw = [0u8; 32];
        raw[0] = key.key_type as u8;
        raw[1..].copy_from_slice(&key.data);
        raw
    }
}

impl From<PreimageKey> for B256 {
    fn from(key: PreimageKey) -> Self {
        Self::new(key.into())
    }
}

impl TryFrom<[u8; 32]> for PreimageKey {
    type Error = PreimageOracleError;

    fn try_from(raw: [u8; 32]) -> Result<Self, Self::Error> {
        let key_type = PreimageKeyType::try_from(raw[0])?;
        Ok(Self::new(raw, key_type))
    }
}

impl core::fmt::Display for PreimageKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", B256::from(*self))
    }
}
