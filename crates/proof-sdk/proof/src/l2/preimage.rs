//! [L2Oracle] implementation over a raw [CommsClient].

use super::L2Oracle;
use crate::{errors::OracleProviderError, HintType, L2Block, OutputV0};
use alloc::{sync::Arc, vec::Vec};
use alloy_consensus::{Header, Sealed};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Decodable;
use interlock_interop::{PreState, TransitionState};
use interlock_mpt::{OrderedListWalker, TrieNode, TrieProvider};
use interlock_preimage::{CommsClient, PreimageKey};
use op_alloy_consensus::OpReceiptEnvelope;

/// An [L2Oracle] that fetches every value from the host and decodes it.
///
/// When `hint_chain_ids` is set, hints carry the chain ID as a trailing 8-byte big-endian
/// integer. Single-chain programs leave it unset.
#[derive(Debug)]
pub struct PreimageL2Oracle<C> {
    oracle: Arc<C>,
    hint_chain_ids: bool,
}

impl<C> Clone for PreimageL2Oracle<C> {
    fn clone(&self) -> Self {
        Self { oracle: self.oracle.clone(), hint_chain_ids: self.hint_chain_ids }
    }
}

impl<C: CommsClient> PreimageL2Oracle<C> {
    /// Creates a new [PreimageL2Oracle].
    pub const fn new(oracle: Arc<C>, hint_chain_ids: bool) -> Self {
        Self { oracle, hint_chain_ids }
    }

    fn hint_for_chain(&self, ty: HintType, hash: B256, chain_id: u64) {
        if self.hint_chain_ids {
            self.hint(&ty.encode_with(&[hash.as_slice(), &chain_id.to_be_bytes()]));
        } else {
            self.hint(&ty.encode_with(&[hash.as_slice()]));
        }
    }

    fn get(&self, hash: B256) -> Result<Vec<u8>, OracleProviderError> {
        self.oracle.get(PreimageKey::new_keccak256(*hash)).map_err(OracleProviderError::Preimage)
    }

    fn header_by_hash(
        &self,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<Sealed<Header>, OracleProviderError> {
        self.hint_for_chain(HintType::L2BlockHeader, block_hash, chain_id);
        let header_rlp = self.get(block_hash)?;
        let header = Header::decode(&mut header_rlp.as_slice()).map_err(OracleProviderError::Rlp)?;
        Ok(Sealed::new_unchecked(header, block_hash))
    }

    fn load_transactions(
        &self,
        block_hash: B256,
        transactions_root: B256,
        chain_id: u64,
    ) -> Result<Vec<Bytes>, OracleProviderError> {
        self.hint_for_chain(HintType::L2Transactions, block_hash, chain_id);
        let walker = OrderedListWalker::try_new_hydrated(transactions_root, self)
            .map_err(OracleProviderError::TrieWalker)?;
        Ok(walker.map(|(_, tx)| tx).collect())
    }
}

impl<C: CommsClient> L2Oracle for PreimageL2Oracle<C> {
    fn block_by_hash(&self, block_hash: B256, chain_id: u64) -> Result<L2Block, OracleProviderError> {
        let header = self.header_by_hash(block_hash, chain_id)?;
        let transactions = self.load_transactions(block_hash, header.transactions_root, chain_id)?;
        Ok(L2Block::new(header, transactions))
    }

    fn receipts_by_block_hash(
        &self,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<Vec<OpReceiptEnvelope>, OracleProviderError> {
        let header = self.header_by_hash(block_hash, chain_id)?;
        self.hint(
            &HintType::L2Receipts.encode_with(&[block_hash.as_slice(), &chain_id.to_be_bytes()]),
        );

        let walker = OrderedListWalker::try_new_hydrated(header.receipts_root, self)
            .map_err(OracleProviderError::TrieWalker)?;
        walker
            .map(|(_, rlp)| {
                let envelope = OpReceiptEnvelope::decode_2718(&mut rlp.as_ref())?;
                Ok(envelope)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(OracleProviderError::Rlp)
    }

    fn node_by_hash(&self, node_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError> {
        self.hint_for_chain(HintType::L2StateNode, node_hash, chain_id);
        self.get(node_hash).map(Into::into)
    }

    fn code_by_hash(&self, code_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError> {
        self.hint_for_chain(HintType::L2Code, code_hash, chain_id);
        self.get(code_hash).map(Into::into)
    }

    fn output_by_root(
        &self,
        output_root: B256,
        chain_id: u64,
    ) -> Result<OutputV0, OracleProviderError> {
        self.hint_for_chain(HintType::L2Output, output_root, chain_id);
        Ok(OutputV0::unmarshal(&self.get(output_root)?)?)
    }

    fn block_data_by_hash(
        &self,
        agreed_block_hash: B256,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<L2Block, OracleProviderError> {
        self.hint(&HintType::L2BlockData.encode_with(&[
            agreed_block_hash.as_slice(),
            block_hash.as_slice(),
            &chain_id.to_be_bytes(),
        ]));
        self.block_by_hash(block_hash, chain_id)
    }

    fn transition_state_by_root(&self, root: B256) -> Result<TransitionState, OracleProviderError> {
        self.hint(&HintType::AgreedPreState.encode_with(&[root.as_slice()]));
        let encoded = self.get(root)?;
        Ok(PreState::decode(&encoded)?.into_transition_state())
    }

    fn hint(&self, hint: &str) {
        if let Err(err) = self.oracle.write(hint) {
            warn!(target: "l2_oracle", "Failed to send hint `{hint}`: {err}");
        }
    }
}

impl<C: CommsClient> TrieProvider for PreimageL2Oracle<C> {
    type Error = OracleProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        let trie_node_rlp = self.get(key)?;
        TrieNode::decode(&mut trie_node_rlp.as_slice()).map_err(OracleProviderError::Rlp)
    }
}
