//! The typed L2 data source used by the proof program, and its implementations.

use crate::{errors::OracleProviderError, HintType, L2Block, OutputV0};
use alloc::vec::Vec;
use alloy_primitives::{Address, Bytes, B256};
use interlock_interop::TransitionState;
use op_alloy_consensus::OpReceiptEnvelope;
use op_alloy_rpc_types_engine::OpPayloadAttributes;
use serde::Serialize;

mod preimage;
pub use preimage::PreimageL2Oracle;

mod caching;
pub use caching::{
    CachingL2Oracle, BLOCK_CACHE_SIZE, CODE_CACHE_SIZE, NODE_CACHE_SIZE, OUTPUT_CACHE_SIZE,
    RECEIPTS_CACHE_SIZE,
};

/// The address of the `L2ToL1MessagePasser` predeploy.
pub const L2_TO_L1_MESSAGE_PASSER_ADDRESS: Address =
    alloy_primitives::address!("4200000000000000000000000000000000000016");

/// Typed access to L2 preimages. Every value returned is the preimage of the requested hash.
pub trait L2Oracle {
    /// Returns the block with the given hash.
    fn block_by_hash(&self, block_hash: B256, chain_id: u64) -> Result<L2Block, OracleProviderError>;

    /// Returns the receipts of the block with the given hash.
    fn receipts_by_block_hash(
        &self,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<Vec<OpReceiptEnvelope>, OracleProviderError>;

    /// Returns the RLP encoded trie node with the given hash. The node may belong to the state
    /// trie or to any storage trie.
    fn node_by_hash(&self, node_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError>;

    /// Returns the contract code with the given hash.
    fn code_by_hash(&self, code_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError>;

    /// Returns the output committed to by `output_root`.
    fn output_by_root(&self, output_root: B256, chain_id: u64)
        -> Result<OutputV0, OracleProviderError>;

    /// Returns an optimistic block, asking the host to also prepare all data needed to rebuild
    /// it on top of `agreed_block_hash`.
    fn block_data_by_hash(
        &self,
        agreed_block_hash: B256,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<L2Block, OracleProviderError>;

    /// Returns the transition state committed to by `root`. A super root decodes as the
    /// transition state at step zero.
    fn transition_state_by_root(&self, root: B256) -> Result<TransitionState, OracleProviderError>;

    /// Sends an advisory hint. Failures are logged and otherwise ignored.
    fn hint(&self, hint: &str);

    /// Hints that a block will be built on top of `parent_block_hash`.
    fn hint_block_execution(
        &self,
        parent_block_hash: B256,
        attributes: &OpPayloadAttributes,
        chain_id: u64,
    ) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct PayloadWitness<'a> {
            parent_block_hash: B256,
            payload_attributes: &'a OpPayloadAttributes,
            #[serde(rename = "chainID")]
            chain_id: u64,
        }

        let witness = PayloadWitness { parent_block_hash, payload_attributes: attributes, chain_id };
        match serde_json::to_vec(&witness) {
            Ok(encoded) => self.hint(&HintType::L2PayloadWitness.encode_with(&[&encoded])),
            Err(err) => warn!(target: "l2_oracle", "Failed to encode payload witness hint: {err}"),
        }
    }

    /// Hints that the storage root of the `L2ToL1MessagePasser` at `block_hash` will be read.
    fn hint_withdrawals_root(&self, block_hash: B256, chain_id: u64) {
        self.hint(&HintType::L2AccountProof.encode_with(&[
            block_hash.as_slice(),
            L2_TO_L1_MESSAGE_PASSER_ADDRESS.as_slice(),
            &chain_id.to_be_bytes(),
        ]));
    }

    /// Hints that the hash of block `block_number` will be read from the history contract in
    /// the state of `head_block_hash`.
    fn hint_block_hash_lookup(&self, block_number: u64, head_block_hash: B256, chain_id: u64) {
        self.hint(&HintType::L2BlockHashLookup.encode_with(&[
            &block_number.to_be_bytes(),
            head_block_hash.as_slice(),
            &chain_id.to_be_bytes(),
        ]));
    }
}
