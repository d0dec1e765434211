//! The version 0 L2 output and its commitment.

use crate::errors::OutputError;
use alloy_primitives::{keccak256, B256};

/// The encoded length of an [OutputV0].
pub const OUTPUT_V0_LENGTH: usize = 128;

/// A version 0 L2 output: the state of an L2 block, committed to by its output root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OutputV0 {
    /// The state root of the block.
    pub state_root: B256,
    /// The storage root of the `L2ToL1MessagePasser` account, or the withdrawals root of the
    /// header once Isthmus is active.
    pub message_passer_storage_root: B256,
    /// The hash of the block.
    pub block_hash: B256,
}

impl OutputV0 {
    /// Creates a new [OutputV0].
    pub const fn new(state_root: B256, message_passer_storage_root: B256, block_hash: B256) -> Self {
        Self { state_root, message_passer_storage_root, block_hash }
    }

    /// Encodes the output as `version ++ state_root ++ message_passer_storage_root ++ block_hash`.
    pub fn marshal(&self) -> [u8; OUTPUT_V0_LENGTH] {
        let mut out = [0u8; OUTPUT_V0_LENGTH];
        out[32..64].copy_from_slice(self.state_root.as_slice());
        out[64..96].copy_from_slice(self.message_passer_storage_root.as_slice());
        out[96..].copy_from_slice(self.block_hash.as_slice());
        out
    }

    /// Decodes an output preimage.
    pub fn unmarshal(data: &[u8]) -> Result<Self, OutputError> {
        if data.len() != OUTPUT_V0_LENGTH {
            return Err(OutputError::InvalidLength(data.len()));
        }
        let version = B256::from_slice(&data[..32]);
        if !version.is_zero() {
            return Err(OutputError::UnsupportedVersion(version));
        }
        Ok(Self {
            state_root: B256::from_slice(&data[32..64]),
            message_passer_storage_root: B256::from_slice(&data[64..96]),
            block_hash: B256::from_slice(&data[96..]),
        })
    }

    /// Returns the output root, the `keccak256` hash of the encoded output.
    pub fn root(&self) -> B256 {
        keccak256(self.marshal())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_output_root() {
        let output = OutputV0::new(B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3));
        let encoded = output.marshal();
        assert_eq!(&encoded[..32], &[0u8; 32]);
        assert_eq!(OutputV0::unmarshal(&encoded).unwrap(), output);
        assert_eq!(
            output.root(),
            b256!("fa846ba062c4f02c422636c114d4c22c219e0d7f9db2db9621eb6f655ac8a51f")
        );
    }

    #[test]
    fn test_unmarshal_errors() {
        assert_eq!(OutputV0::unmarshal(&[0u8; 127]), Err(OutputError::InvalidLength(127)));

        let mut encoded = OutputV0::default().marshal();
        encoded[31] = 1;
        let mut version = B256::ZERO;
        version.0[31] = 1;
        assert_eq!(OutputV0::unmarshal(&encoded), Err(OutputError::UnsupportedVersion(version)));
    }
}
