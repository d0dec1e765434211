//! This module contains the prologue phase of the interop client program, pulling in the boot
//! information through the `PreimageOracle` ABI as local keys.

use alloc::{collections::BTreeMap, vec::Vec};
use alloy_primitives::{B256, U256};
use interlock_interop::DependencySet;
use interlock_preimage::PreimageOracleClient;
use interlock_proof::{
    boot::{
        load_b256, load_bytes, load_u64, AGREED_L2_PRE_STATE_KEY, CLAIMED_L2_POST_STATE_KEY,
        L1_HEAD_KEY, L2_CLAIM_BLOCK_NUMBER_KEY, L2_ROLLUP_CONFIG_KEY,
    },
    errors::OracleProviderError,
    RollupConfig,
};
use serde::{Deserialize, Serialize};

/// The local key ident for the game timestamp. Shares its slot with the single-chain claimed block
/// number.
pub const L2_GAME_TIMESTAMP_KEY: U256 = L2_CLAIM_BLOCK_NUMBER_KEY;

/// The local key ident for the rollup configs of every chain: a JSON array.
pub const L2_ROLLUP_CONFIGS_KEY: U256 = L2_ROLLUP_CONFIG_KEY;

/// The local key ident for the dependency set.
pub const DEPENDENCY_SET_KEY: U256 = U256::from_be_slice(&[7]);

/// The boot information for the interop client program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootInfo {
    /// The L1 head hash containing the safe L2 chain data that may reproduce the claim.
    pub l1_head: B256,
    /// The agreed upon super root or transition state commitment.
    pub agreed_pre_state: B256,
    /// The claimed (disputed) post-state commitment.
    pub claimed_post_state: B256,
    /// The timestamp of the super root the game is played over.
    pub game_timestamp: u64,
    /// The rollup configs, keyed by chain ID.
    pub rollup_configs: BTreeMap<u64, RollupConfig>,
    /// The chains that may exchange messages.
    pub dependency_set: DependencySet,
}

impl BootInfo {
    /// Load the boot information from the preimage oracle.
    pub fn load<O: PreimageOracleClient + ?Sized>(oracle: &O) -> Result<Self, OracleProviderError> {
        let l1_head = load_b256(oracle, L1_HEAD_KEY)?;
        let agreed_pre_state = load_b256(oracle, AGREED_L2_PRE_STATE_KEY)?;
        let claimed_post_state = load_b256(oracle, CLAIMED_L2_POST_STATE_KEY)?;
        let game_timestamp = load_u64(oracle, L2_GAME_TIMESTAMP_KEY)?;

        let ser_cfgs = load_bytes(oracle, L2_ROLLUP_CONFIGS_KEY)?;
        let configs: Vec<RollupConfig> =
            serde_json::from_slice(&ser_cfgs).map_err(OracleProviderError::Serde)?;
        let mut rollup_configs = BTreeMap::new();
        for config in configs {
            if rollup_configs.insert(config.l2_chain_id, config).is_some() {
                warn!(
                    target: "boot_loader",
                    "Duplicate rollup config for chain {}, keeping the last",
                    config.l2_chain_id
                );
            }
        }

        let ser_deps = load_bytes(oracle, DEPENDENCY_SET_KEY)?;
        let dependency_set: DependencySet =
            serde_json::from_slice(&ser_deps).map_err(OracleProviderError::Serde)?;

        Ok(Self {
            l1_head,
            agreed_pre_state,
            claimed_post_state,
            game_timestamp,
            rollup_configs,
            dependency_set,
        })
    }

    /// Returns the rollup config of `chain_id`.
    pub fn rollup_config(&self, chain_id: u64) -> Result<&RollupConfig, OracleProviderError> {
        self.rollup_configs.get(&chain_id).ok_or(OracleProviderError::UnknownChainId(chain_id))
    }
}
