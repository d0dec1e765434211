//! This module contains the prologue phase of the client program, pulling in the boot information
//! through the `PreimageOracle` ABI as local keys.

use crate::{errors::OracleProviderError, RollupConfig};
use alloc::vec::Vec;
use alloy_primitives::{B256, U256};
use interlock_preimage::{PreimageKey, PreimageOracleClient};
use serde::{Deserialize, Serialize};

/// The local key ident for the L1 head hash.
pub const L1_HEAD_KEY: U256 = U256::from_be_slice(&[1]);

/// The local key ident for the agreed pre-state: an output root for a single chain, a super root
/// or transition state for interop.
pub const AGREED_L2_PRE_STATE_KEY: U256 = U256::from_be_slice(&[2]);

/// The local key ident for the claimed post-state.
pub const CLAIMED_L2_POST_STATE_KEY: U256 = U256::from_be_slice(&[3]);

/// The local key ident for the claimed L2 block number, or the game timestamp for interop.
pub const L2_CLAIM_BLOCK_NUMBER_KEY: U256 = U256::from_be_slice(&[4]);

/// The local key ident for the L2 chain ID.
pub const L2_CHAIN_ID_KEY: U256 = U256::from_be_slice(&[5]);

/// The local key ident for the L2 rollup config.
pub const L2_ROLLUP_CONFIG_KEY: U256 = U256::from_be_slice(&[6]);

/// Reads a 32-byte local value.
pub fn load_b256<O: PreimageOracleClient + ?Sized>(
    oracle: &O,
    ident: U256,
) -> Result<B256, OracleProviderError> {
    let mut value = B256::ZERO;
    oracle
        .get_exact(PreimageKey::new_local(ident.to()), value.as_mut())
        .map_err(OracleProviderError::Preimage)?;
    Ok(value)
}

/// Reads a big-endian `u64` local value.
pub fn load_u64<O: PreimageOracleClient + ?Sized>(
    oracle: &O,
    ident: U256,
) -> Result<u64, OracleProviderError> {
    let raw = load_bytes(oracle, ident)?;
    Ok(u64::from_be_bytes(raw.as_slice().try_into().map_err(OracleProviderError::SliceConversion)?))
}

/// Reads a local value of any length.
pub fn load_bytes<O: PreimageOracleClient + ?Sized>(
    oracle: &O,
    ident: U256,
) -> Result<Vec<u8>, OracleProviderError> {
    oracle.get(PreimageKey::new_local(ident.to())).map_err(OracleProviderError::Preimage)
}

/// The boot information for the single-chain client program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootInfo {
    /// The L1 head hash containing the safe L2 chain data that may reproduce the claim.
    pub l1_head: B256,
    /// The agreed upon output root.
    pub agreed_l2_output_root: B256,
    /// The claimed (disputed) output root.
    pub claimed_l2_output_root: B256,
    /// The number of the L2 block the claim is made at.
    pub claimed_l2_block_number: u64,
    /// The L2 chain ID.
    pub chain_id: u64,
    /// The rollup config for the L2 chain.
    pub rollup_config: RollupConfig,
}

impl BootInfo {
    /// Load the boot information from the preimage oracle.
    pub fn load<O: PreimageOracleClient + ?Sized>(oracle: &O) -> Result<Self, OracleProviderError> {
        let l1_head = load_b256(oracle, L1_HEAD_KEY)?;
        let agreed_l2_output_root = load_b256(oracle, AGREED_L2_PRE_STATE_KEY)?;
        let claimed_l2_output_root = load_b256(oracle, CLAIMED_L2_POST_STATE_KEY)?;
        let claimed_l2_block_number = load_u64(oracle, L2_CLAIM_BLOCK_NUMBER_KEY)?;
        let chain_id = load_u64(oracle, L2_CHAIN_ID_KEY)?;

        let ser_cfg = load_bytes(oracle, L2_ROLLUP_CONFIG_KEY)?;
        let rollup_config: RollupConfig =
            serde_json::from_slice(&ser_cfg).map_err(OracleProviderError::Serde)?;
        if rollup_config.l2_chain_id != chain_id {
            warn!(
                target: "boot_loader",
                "Rollup config is for chain {}, expected {}",
                rollup_config.l2_chain_id,
                chain_id
            );
            return Err(OracleProviderError::UnknownChainId(chain_id));
        }

        Ok(Self {
            l1_head,
            agreed_l2_output_root,
            claimed_l2_output_root,
            claimed_l2_block_number,
            chain_id,
            rollup_config,
        })
    }
}
