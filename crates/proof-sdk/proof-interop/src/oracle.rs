//! An [L2Oracle] overlay serving the blocks built during consolidation.

use alloc::vec::Vec;
use alloy_consensus::{Header, Sealed};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Decodable;
use interlock_interop::TransitionState;
use interlock_mpt::{OrderedListWalker, TrieNode, TrieProvider};
use interlock_proof::{
    errors::OracleProviderError, kv::KeyValueStore, l2::L2Oracle, L2Block, MemoryKv, OutputV0,
};
use op_alloy_consensus::OpReceiptEnvelope;

/// Serves headers, transactions, receipts, trie nodes, code and outputs written to a local
/// [MemoryKv] before falling back to the wrapped [L2Oracle]. Clones share the same store.
///
/// Deposits-only replacement blocks are never known to the host, so every lookup of them must hit
/// the store.
#[derive(Debug, Clone)]
pub struct ConsolidateOracle<O> {
    inner: O,
    kv: MemoryKv,
    transition_state: TransitionState,
}

impl<O: L2Oracle> ConsolidateOracle<O> {
    /// Wraps `inner` with an empty store, holding the transition state being consolidated.
    pub fn new(inner: O, transition_state: TransitionState) -> Self {
        Self { inner, kv: MemoryKv::default(), transition_state }
    }

    /// Returns the local store.
    pub const fn kv(&self) -> &MemoryKv {
        &self.kv
    }

    /// Returns the wrapped oracle.
    pub const fn inner(&self) -> &O {
        &self.inner
    }

    fn local_header(&self, block_hash: B256) -> Result<Option<Sealed<Header>>, OracleProviderError> {
        let Some(header_rlp) = self.kv.get(block_hash) else {
            return Ok(None);
        };
        let header = Header::decode(&mut header_rlp.as_ref()).map_err(OracleProviderError::Rlp)?;
        Ok(Some(Sealed::new_unchecked(header, block_hash)))
    }

    fn local_list(&self, root: B256) -> Result<Vec<Bytes>, OracleProviderError> {
        let walker = OrderedListWalker::try_new_hydrated(root, &LocalTrie(&self.kv))
            .map_err(OracleProviderError::TrieWalker)?;
        Ok(walker.map(|(_, value)| value).collect())
    }
}

impl<O: L2Oracle> L2Oracle for ConsolidateOracle<O> {
    fn block_by_hash(&self, block_hash: B256, chain_id: u64) -> Result<L2Block, OracleProviderError> {
        match self.local_header(block_hash)? {
            Some(header) => {
                let transactions = self.local_list(header.transactions_root)?;
                Ok(L2Block::new(header, transactions))
            }
            None => self.inner.block_by_hash(block_hash, chain_id),
        }
    }

    fn receipts_by_block_hash(
        &self,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<Vec<OpReceiptEnvelope>, OracleProviderError> {
        let Some(header) = self.local_header(block_hash)? else {
            return self.inner.receipts_by_block_hash(block_hash, chain_id);
        };
        self.local_list(header.receipts_root)?
            .iter()
            .map(|rlp| OpReceiptEnvelope::decode_2718(&mut rlp.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| OracleProviderError::Rlp(e.into()))
    }

    fn node_by_hash(&self, node_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError> {
        match self.kv.get(node_hash) {
            Some(node) => Ok(node),
            None => self.inner.node_by_hash(node_hash, chain_id),
        }
    }

    fn code_by_hash(&self, code_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError> {
        match self.kv.get(code_hash) {
            Some(code) => Ok(code),
            None => self.inner.code_by_hash(code_hash, chain_id),
        }
    }

    fn output_by_root(
        &self,
        output_root: B256,
        chain_id: u64,
    ) -> Result<OutputV0, OracleProviderError> {
        match self.kv.get(output_root) {
            Some(raw) => Ok(OutputV0::unmarshal(&raw)?),
            None => self.inner.output_by_root(output_root, chain_id),
        }
    }

    fn block_data_by_hash(
        &self,
        agreed_block_hash: B256,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<L2Block, OracleProviderError> {
        if self.local_header(block_hash)?.is_some() {
            return self.block_by_hash(block_hash, chain_id);
        }
        self.inner.block_data_by_hash(agreed_block_hash, block_hash, chain_id)
    }

    fn transition_state_by_root(&self, root: B256) -> Result<TransitionState, OracleProviderError> {
        if root == self.transition_state.hash() {
            return Ok(self.transition_state.clone());
        }
        self.inner.transition_state_by_root(root)
    }

    fn hint(&self, hint: &str) {
        self.inner.hint(hint);
    }
}

/// Trie nodes from the local store only.
struct LocalTrie<'a>(&'a MemoryKv);

impl TrieProvider for LocalTrie<'_> {
    type Error = OracleProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        let raw = self.0.get(key).ok_or(OracleProviderError::NotFound(key))?;
        TrieNode::decode(&mut raw.as_ref()).map_err(OracleProviderError::Rlp)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use interlock_interop::{OutputRootWithChain, SuperRoot};
    use interlock_proof::{
        derivation::store_block_data,
        test_utils::{StubL2Oracle, TestChain},
    };

    fn transition_state() -> TransitionState {
        let pre = SuperRoot::new(1_000, alloc::vec![OutputRootWithChain::new(900, B256::ZERO)]);
        TransitionState::new(pre, Vec::new(), 0)
    }

    #[test]
    fn test_falls_back_to_inner() {
        let chain = TestChain::new(900, 3);
        let stub = StubL2Oracle::default();
        chain.register(&stub);
        let oracle = ConsolidateOracle::new(stub.clone(), transition_state());

        let block = chain.block(2);
        assert_eq!(oracle.block_by_hash(block.hash(), 900).unwrap(), block);
        assert_eq!(oracle.receipts_by_block_hash(block.hash(), 900).unwrap(), chain.receipts(2));
        assert_eq!(oracle.output_by_root(chain.output(2).root(), 900).unwrap(), chain.output(2));
        assert_eq!(
            oracle.block_data_by_hash(chain.block(1).hash(), block.hash(), 900).unwrap(),
            block
        );
        assert_eq!(stub.calls().block_by_hash, 1);
        assert_eq!(stub.calls().block_data_by_hash, 1);
    }

    #[test]
    fn test_serves_local_blocks() {
        let chain = TestChain::new(900, 3);
        let stub = StubL2Oracle::default();
        let oracle = ConsolidateOracle::new(stub.clone(), transition_state());

        let block = chain.block(3);
        store_block_data(oracle.kv(), &block, &chain.receipts(3));
        let output = chain.output(3);
        let root = oracle.kv().insert_preimage(Bytes::copy_from_slice(&output.marshal()));
        assert_eq!(root, output.root());

        assert_eq!(oracle.block_by_hash(block.hash(), 900).unwrap(), block);
        assert_eq!(oracle.receipts_by_block_hash(block.hash(), 900).unwrap(), chain.receipts(3));
        assert_eq!(oracle.block_data_by_hash(B256::ZERO, block.hash(), 900).unwrap(), block);
        assert_eq!(oracle.output_by_root(root, 900).unwrap(), output);

        let calls = stub.calls();
        assert_eq!(calls.block_by_hash, 0);
        assert_eq!(calls.receipts_by_block_hash, 0);
        assert_eq!(calls.block_data_by_hash, 0);
        assert_eq!(calls.output_by_root, 0);
    }

    #[test]
    fn test_nodes_and_code_prefer_local() {
        let stub = StubL2Oracle::default();
        let remote = stub.insert_node(Bytes::from_static(&[0xc2, 0x01, 0x02]));
        let oracle = ConsolidateOracle::new(stub.clone(), transition_state());
        let local = oracle.kv().insert_preimage(Bytes::from_static(&[0xc1, 0x80]));

        assert_eq!(oracle.node_by_hash(local, 900).unwrap(), Bytes::from_static(&[0xc1, 0x80]));
        assert_eq!(stub.calls().node_by_hash, 0);
        assert_eq!(
            oracle.node_by_hash(remote, 900).unwrap(),
            Bytes::from_static(&[0xc2, 0x01, 0x02])
        );
        assert_eq!(stub.calls().node_by_hash, 1);

        let code = oracle.kv().insert_preimage(Bytes::from_static(b"code"));
        assert_eq!(oracle.code_by_hash(code, 900).unwrap(), Bytes::from_static(b"code"));
        assert!(oracle.code_by_hash(B256::repeat_byte(1), 900).is_err());
    }

    #[test]
    fn test_holds_transition_state() {
        let stub = StubL2Oracle::default();
        let state = transition_state();
        let oracle = ConsolidateOracle::new(stub.clone(), state.clone());
        assert_eq!(oracle.transition_state_by_root(state.hash()).unwrap(), state);
        assert_eq!(stub.calls().transition_state_by_root, 0);
        assert!(oracle.transition_state_by_root(B256::ZERO).is_err());
        assert_eq!(stub.calls().transition_state_by_root, 1);
    }

    #[test]
    fn test_hints_forwarded() {
        let stub = StubL2Oracle::default();
        let oracle = ConsolidateOracle::new(stub.clone(), transition_state());
        oracle.hint("l2-output 00");
        assert_eq!(stub.hints(), alloc::vec!["l2-output 00".to_string()]);
    }
}
