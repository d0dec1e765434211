//! This module contains the [HintType] enum.

use crate::errors::HintParsingError;
use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use alloy_primitives::{hex, Bytes};
use core::{fmt::Display, str::FromStr};

/// The [HintType] enum is used to specify the type of hint that was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HintType {
    /// A hint that specifies the block header of a layer 1 block.
    L1BlockHeader,
    /// A hint that specifies the block header of a layer 2 block.
    L2BlockHeader,
    /// A hint that specifies the transactions of a layer 2 block.
    L2Transactions,
    /// A hint that specifies the receipts of a layer 2 block.
    L2Receipts,
    /// A hint that specifies the code of a contract on layer 2.
    L2Code,
    /// A hint that specifies the state node in the L2 state trie.
    L2StateNode,
    /// A hint that specifies the preimage of an L2 output root.
    L2Output,
    /// A hint that specifies the preimage of the agreed upon pre-state claim.
    AgreedPreState,
    /// A hint that specifies the proof on the path to an account in the L2 state trie.
    L2AccountProof,
    /// A hint that specifies the execution witness of a payload built on top of a parent block.
    L2PayloadWitness,
    /// A hint that specifies loading the payload witness for an optimistic block.
    L2BlockData,
    /// A hint that specifies the state needed to read a block hash from the history contract.
    L2BlockHashLookup,
}

impl HintType {
    /// Encodes the hint type as a string.
    pub fn encode_with(&self, data: &[&[u8]]) -> String {
        let concatenated = hex::encode(data.iter().copied().flatten().copied().collect::<Vec<_>>());
        alloc::format!("{} {}", self, concatenated)
    }

    /// Splits an encoded hint into its type and payload.
    pub fn parse(hint: &str) -> Result<(Self, Bytes), HintParsingError> {
        let (ty, data) =
            hint.split_once(' ').ok_or_else(|| HintParsingError(hint.to_string()))?;
        let data = hex::decode(data).map_err(|e| HintParsingError(e.to_string()))?;
        Ok((ty.parse()?, data.into()))
    }
}

impl FromStr for HintType {
    type Err = HintParsingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "l1-block-header" => Ok(Self::L1BlockHeader),
            "l2-block-header" => Ok(Self::L2BlockHeader),
            "l2-transactions" => Ok(Self::L2Transactions),
            "l2-receipts" => Ok(Self::L2Receipts),
            "l2-code" => Ok(Self::L2Code),
            "l2-state-node" => Ok(Self::L2StateNode),
            "l2-output" => Ok(Self::L2Output),
            "agreed-pre-state" => Ok(Self::AgreedPreState),
            "l2-account-proof" => Ok(Self::L2AccountProof),
            "l2-payload-witness" => Ok(Self::L2PayloadWitness),
            "l2-block-data" => Ok(Self::L2BlockData),
            "l2-block-hash-lookup" => Ok(Self::L2BlockHashLookup),
            _ => Err(HintParsingError(value.to_string())),
        }
    }
}

impl From<HintType> for &str {
    fn from(value: HintType) -> Self {
        match value {
            HintType::L1BlockHeader => "l1-block-header",
            HintType::L2BlockHeader => "l2-block-header",
            HintType::L2Transactions => "l2-transactions",
            HintType::L2Receipts => "l2-receipts",
            HintType::L2Code => "l2-code",
            HintType::L2StateNode => "l2-state-node",
            HintType::L2Output => "l2-output",
            HintType::AgreedPreState => "agreed-pre-state",
            HintType::L2AccountProof => "l2-account-proof",
            HintType::L2PayloadWitness => "l2-payload-witness",
            HintType::L2BlockData => "l2-block-data",
            HintType::L2BlockHashLookup => "l2-block-hash-lookup",
        }
    }
}

impl Display for HintType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s: &str = (*self).into();
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn test_encode_with_chain_id() {
        let hash = B256::repeat_byte(0xab);
        let hint = HintType::L2BlockHeader.encode_with(&[hash.as_slice(), &10u64.to_be_bytes()]);
        assert_eq!(
            hint,
            "l2-block-header abababababababababababababababababababababababababababababababab000000000000000a"
        );

        let (ty, data) = HintType::parse(&hint).unwrap();
        assert_eq!(ty, HintType::L2BlockHeader);
        assert_eq!(&data[..32], hash.as_slice());
        assert_eq!(&data[32..], &10u64.to_be_bytes());
    }

    #[test]
    fn test_hint_type_names_roundtrip() {
        let all = [
            HintType::L1BlockHeader,
            HintType::L2BlockHeader,
            HintType::L2Transactions,
            HintType::L2Receipts,
            HintType::L2Code,
            HintType::L2StateNode,
            HintType::L2Output,
            HintType::AgreedPreState,
            HintType::L2AccountProof,
            HintType::L2PayloadWitness,
            HintType::L2BlockData,
            HintType::L2BlockHashLookup,
        ];
        for ty in all {
            assert_eq!(ty.to_string().parse::<HintType>().unwrap(), ty);
        }
        assert!("l2-output-root".parse::<HintType>().is_err());
        assert!(HintType::parse("l2-code").is_err());
    }
}
