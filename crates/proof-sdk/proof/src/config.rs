//! This module contains the [RollupConfig] type.

use crate::errors::ConfigError;
use alloy_eips::BlockNumHash;
use serde::{Deserialize, Serialize};

/// The genesis anchor of an L2 chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainGenesis {
    /// The L1 block that the rollup starts *after*.
    pub l1: BlockNumHash,
    /// The L2 block the rollup starts from.
    pub l2: BlockNumHash,
    /// Timestamp of the L2 genesis block.
    pub l2_time: u64,
}

/// The EIP-1559 parameters of an OP Stack chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOpConfig {
    /// The elasticity multiplier.
    pub eip1559_elasticity: u64,
    /// The base fee max change denominator.
    pub eip1559_denominator: u64,
    /// The base fee max change denominator after Canyon.
    pub eip1559_denominator_canyon: u64,
}

/// The Rollup configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupConfig {
    /// The genesis anchor.
    pub genesis: ChainGenesis,
    /// The block time of the L2, in seconds.
    pub block_time: u64,
    /// The L2 chain ID.
    pub l2_chain_id: u64,
    /// `holocene_time` sets the activation time of the Holocene network upgrade.
    /// Active if `holocene_time` != None && L2 block timestamp >= Some(holocene_time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holocene_time: Option<u64>,
    /// `isthmus_time` sets the activation time of the Isthmus network upgrade.
    /// Active if `isthmus_time` != None && L2 block timestamp >= Some(isthmus_time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isthmus_time: Option<u64>,
    /// `interop_time` sets the activation time of interop message validation.
    /// Active if `interop_time` != None && L2 block timestamp >= Some(interop_time).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interop_time: Option<u64>,
    /// The EIP-1559 parameters of the chain.
    #[serde(default)]
    pub chain_op_config: ChainOpConfig,
}

impl RollupConfig {
    /// Returns the number of the L2 block at `timestamp`, rounding down.
    pub const fn target_block_number(&self, timestamp: u64) -> Result<u64, ConfigError> {
        if timestamp < self.genesis.l2_time {
            return Err(ConfigError::BeforeGenesis { timestamp, genesis: self.genesis.l2_time });
        }
        if self.block_time == 0 {
            return Err(ConfigError::ZeroBlockTime);
        }
        Ok(self.genesis.l2.number + (timestamp - self.genesis.l2_time) / self.block_time)
    }

    /// Returns true if Holocene is active at the given timestamp.
    pub fn is_holocene_active(&self, timestamp: u64) -> bool {
        self.holocene_time.is_some_and(|t| timestamp >= t)
    }

    /// Returns true if Isthmus is active at the given timestamp.
    pub fn is_isthmus_active(&self, timestamp: u64) -> bool {
        self.isthmus_time.is_some_and(|t| timestamp >= t)
    }

    /// Returns true if interop is active at the given timestamp.
    pub fn is_interop_active(&self, timestamp: u64) -> bool {
        self.interop_time.is_some_and(|t| timestamp >= t)
    }
}
