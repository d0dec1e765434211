//! An [L2Oracle] decorator that keeps a bounded LRU cache per kind of data.

use super::L2Oracle;
use crate::{errors::OracleProviderError, L2Block, OutputV0};
use alloc::{sync::Arc, vec::Vec};
use alloy_primitives::{Bytes, B256};
use core::num::NonZeroUsize;
use interlock_interop::TransitionState;
use lru::LruCache;
use op_alloy_consensus::OpReceiptEnvelope;
use spin::Mutex;

/// Number of blocks cached.
pub const BLOCK_CACHE_SIZE: usize = 3_000;

/// Number of trie nodes cached.
pub const NODE_CACHE_SIZE: usize = 100_000;

/// Number of contract codes cached.
pub const CODE_CACHE_SIZE: usize = 10_000;

/// Number of receipt lists cached.
pub const RECEIPTS_CACHE_SIZE: usize = 100;

/// Number of outputs cached.
pub const OUTPUT_CACHE_SIZE: usize = 10_000;

type SharedCache<V> = Arc<Mutex<LruCache<B256, V>>>;

fn shared_cache<V>(size: usize) -> SharedCache<V> {
    Arc::new(Mutex::new(LruCache::new(
        NonZeroUsize::new(size).expect("cache sizes are non-zero constants"),
    )))
}

/// Caches the values returned by the wrapped [L2Oracle]. Clones share the same caches.
#[derive(Debug)]
pub struct CachingL2Oracle<O> {
    inner: O,
    blocks: SharedCache<L2Block>,
    nodes: SharedCache<Bytes>,
    codes: SharedCache<Bytes>,
    receipts: SharedCache<Vec<OpReceiptEnvelope>>,
    outputs: SharedCache<OutputV0>,
}

impl<O: Clone> Clone for CachingL2Oracle<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            blocks: self.blocks.clone(),
            nodes: self.nodes.clone(),
            codes: self.codes.clone(),
            receipts: self.receipts.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

impl<O: L2Oracle> CachingL2Oracle<O> {
    /// Wraps `inner` with empty caches.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            blocks: shared_cache(BLOCK_CACHE_SIZE),
            nodes: shared_cache(NODE_CACHE_SIZE),
            codes: shared_cache(CODE_CACHE_SIZE),
            receipts: shared_cache(RECEIPTS_CACHE_SIZE),
            outputs: shared_cache(OUTPUT_CACHE_SIZE),
        }
    }

    /// Returns the wrapped oracle.
    pub const fn inner(&self) -> &O {
        &self.inner
    }
}

fn cached<V: Clone>(
    cache: &SharedCache<V>,
    key: B256,
    fetch: impl FnOnce() -> Result<V, OracleProviderError>,
) -> Result<V, OracleProviderError> {
    if let Some(value) = cache.lock().get(&key) {
        return Ok(value.clone());
    }
    let value = fetch()?;
    cache.lock().put(key, value.clone());
    Ok(value)
}

impl<O: L2Oracle> L2Oracle for CachingL2Oracle<O> {
    fn block_by_hash(&self, block_hash: B256, chain_id: u64) -> Result<L2Block, OracleProviderError> {
        cached(&self.blocks, block_hash, || self.inner.block_by_hash(block_hash, chain_id))
    }

    fn receipts_by_block_hash(
        &self,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<Vec<OpReceiptEnvelope>, OracleProviderError> {
        cached(&self.receipts, block_hash, || {
            self.inner.receipts_by_block_hash(block_hash, chain_id)
        })
    }

    fn node_by_hash(&self, node_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError> {
        cached(&self.nodes, node_hash, || self.inner.node_by_hash(node_hash, chain_id))
    }

    fn code_by_hash(&self, code_hash: B256, chain_id: u64) -> Result<Bytes, OracleProviderError> {
        cached(&self.codes, code_hash, || self.inner.code_by_hash(code_hash, chain_id))
    }

    fn output_by_root(
        &self,
        output_root: B256,
        chain_id: u64,
    ) -> Result<OutputV0, OracleProviderError> {
        cached(&self.outputs, output_root, || self.inner.output_by_root(output_root, chain_id))
    }

    fn block_data_by_hash(
        &self,
        agreed_block_hash: B256,
        block_hash: B256,
        chain_id: u64,
    ) -> Result<L2Block, OracleProviderError> {
        // Always ask the host, so that it prepares the execution witness of the block.
        let block = self.inner.block_data_by_hash(agreed_block_hash, block_hash, chain_id)?;
        self.blocks.lock().put(block_hash, block.clone());
        Ok(block)
    }

    fn transition_state_by_root(&self, root: B256) -> Result<TransitionState, OracleProviderError> {
        self.inner.transition_state_by_root(root)
    }

    fn hint(&self, hint: &str) {
        self.inner.hint(hint);
    }
}
