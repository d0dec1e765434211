//! Canonical ancestor lookups by block number.
//!
//! [CanonicalBlockIndex] walks parent hashes back from the head and remembers every hop.
//! [FastCanonicalBlockIndex] reads block hashes from the EIP-2935 history contract in the state of
//! a later block, jumping a whole window at a time, and falls back to the walk when the contract
//! is not available.

use crate::{errors::OracleProviderError, RollupConfig};
use alloc::collections::BTreeMap;
use alloy_consensus::{Header, Sealed};
use alloy_primitives::{address, Address, B256, U256};
use core::num::NonZeroUsize;
use interlock_mpt::{account_at, storage_at, TrieProvider};
use lru::LruCache;

/// The address of the EIP-2935 block hash history contract.
pub const HISTORY_STORAGE_ADDRESS: Address = address!("0000F90827F1C53a10cb7A02335B175320002935");

/// The number of block hashes held by the history contract.
pub const HISTORY_SERVE_WINDOW: u64 = 8191;

/// The number of window anchor headers cached by a [FastCanonicalBlockIndex].
pub const ANCHOR_CACHE_SIZE: usize = 1_000;

/// The data a canonical index reads: headers by hash, and the state trie of the chain.
pub trait CanonicalSource: TrieProvider<Error = OracleProviderError> {
    /// Returns the header with the given hash.
    fn header_by_hash(&self, hash: B256) -> Result<Sealed<Header>, OracleProviderError>;

    /// Hints that the hash of `block_number` will be read from the state of `head_hash`.
    fn hint_block_hash_lookup(&self, block_number: u64, head_hash: B256);
}

/// Maps block numbers to the canonical chain ending at a head by walking parent hashes.
#[derive(Debug, Clone)]
pub struct CanonicalBlockIndex {
    head: Sealed<Header>,
    hash_by_number: BTreeMap<u64, B256>,
    /// The oldest header such that every canonical block between it and the head is indexed.
    earliest_indexed: Sealed<Header>,
}

impl CanonicalBlockIndex {
    /// Creates an index over the chain ending at `head`.
    pub fn new(head: Sealed<Header>) -> Self {
        let hash_by_number = BTreeMap::from([(head.number, head.seal())]);
        Self { earliest_indexed: head.clone(), head, hash_by_number }
    }

    /// Returns the head of the canonical chain.
    pub const fn head(&self) -> &Sealed<Header> {
        &self.head
    }

    /// Returns the canonical header at `number`, or [None] above the head.
    pub fn header_by_number<S: CanonicalSource + ?Sized>(
        &mut self,
        number: u64,
        source: &S,
    ) -> Result<Option<Sealed<Header>>, OracleProviderError> {
        if number > self.head.number {
            return Ok(None);
        }
        if number == self.head.number {
            return Ok(Some(self.head.clone()));
        }
        if let Some(hash) = self.hash_by_number.get(&number) {
            return source.header_by_hash(*hash).map(Some);
        }

        let mut header = self.earliest_indexed.clone();
        while header.number > number {
            header = source.header_by_hash(header.parent_hash)?;
            self.hash_by_number.insert(header.number, header.seal());
        }
        trace!(target: "canonical_index", "Indexed back to block {}", header.number);
        self.earliest_indexed = header.clone();
        Ok(Some(header))
    }

    /// Makes `head` the canonical head. Returns its hash.
    pub fn set_canonical<S: CanonicalSource + ?Sized>(
        &mut self,
        head: Sealed<Header>,
        source: &S,
    ) -> Result<B256, OracleProviderError> {
        let head_hash = head.seal();
        self.hash_by_number.retain(|number, _| *number <= head.number);

        let mut header = head.clone();
        loop {
            if self.hash_by_number.get(&header.number) == Some(&header.seal()) {
                break;
            }
            self.hash_by_number.insert(header.number, header.seal());
            if header.number == 0 {
                break;
            }
            header = source.header_by_hash(header.parent_hash)?;
        }
        debug!(
            target: "canonical_index",
            "Set canonical head to #{} ({}), reconnected at #{}",
            head.number,
            head_hash,
            header.number
        );

        self.earliest_indexed = header;
        self.head = head;
        Ok(head_hash)
    }
}

/// Maps block numbers to the canonical chain ending at a head using the EIP-2935 history
/// contract, falling back to a [CanonicalBlockIndex].
#[derive(Debug)]
pub struct FastCanonicalBlockIndex {
    head: Sealed<Header>,
    config: RollupConfig,
    window: u64,
    anchors: LruCache<u64, Sealed<Header>>,
    fallback: CanonicalBlockIndex,
}

impl FastCanonicalBlockIndex {
    /// Creates an index over the chain ending at `head`.
    pub fn new(head: Sealed<Header>, config: RollupConfig) -> Self {
        Self {
            fallback: CanonicalBlockIndex::new(head.clone()),
            head,
            config,
            window: HISTORY_SERVE_WINDOW,
            anchors: LruCache::new(
                NonZeroUsize::new(ANCHOR_CACHE_SIZE).expect("cache sizes are non-zero constants"),
            ),
        }
    }

    /// Overrides the number of block hashes held by the history contract.
    pub const fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    /// Returns the head of the canonical chain.
    pub const fn head(&self) -> &Sealed<Header> {
        &self.head
    }

    /// Returns the canonical header at `number`, or [None] above the head.
    pub fn header_by_number<S: CanonicalSource + ?Sized>(
        &mut self,
        number: u64,
        source: &S,
    ) -> Result<Option<Sealed<Header>>, OracleProviderError> {
        if number > self.head.number {
            return Ok(None);
        }
        if number == self.head.number {
            return Ok(Some(self.head.clone()));
        }

        let mut anchor = self.head.clone();
        loop {
            if !self.config.is_isthmus_active(anchor.timestamp) {
                return self.fallback.header_by_number(number, source);
            }

            let oldest = anchor.number.saturating_sub(self.window);
            let target = number.max(oldest);
            if target == oldest {
                if let Some(cached) = self.anchors.get(&oldest) {
                    anchor = cached.clone();
                    if oldest == number {
                        return Ok(Some(anchor));
                    }
                    continue;
                }
            }

            let Some(hash) = self.read_history(&anchor, target, source)? else {
                debug!(
                    target: "canonical_index",
                    "No history for block {} in state of #{}, walking back",
                    target,
                    anchor.number
                );
                return self.fallback.header_by_number(number, source);
            };
            let header = source.header_by_hash(hash)?;
            if target == number {
                return Ok(Some(header));
            }

            trace!(target: "canonical_index", "Jumping to window anchor #{}", header.number);
            self.anchors.put(oldest, header.clone());
            anchor = header;
        }
    }

    /// Makes `head` the canonical head. Returns its hash.
    pub fn set_canonical<S: CanonicalSource + ?Sized>(
        &mut self,
        head: Sealed<Header>,
        source: &S,
    ) -> Result<B256, OracleProviderError> {
        self.anchors.clear();
        self.head = head.clone();
        self.fallback.set_canonical(head, source)
    }

    /// Reads the hash of block `number` from the history contract in the state of `anchor`.
    /// Returns [None] if the contract is absent or the slot is empty.
    fn read_history<S: CanonicalSource + ?Sized>(
        &self,
        anchor: &Sealed<Header>,
        number: u64,
        source: &S,
    ) -> Result<Option<B256>, OracleProviderError> {
        source.hint_block_hash_lookup(number, anchor.seal());

        let Some(account) = account_at(anchor.state_root, HISTORY_STORAGE_ADDRESS, &source)
            .map_err(OracleProviderError::TrieNode)?
        else {
            return Ok(None);
        };
        let slot = U256::from(number % self.window);
        let value =
            storage_at(account.storage_root, slot, &source).map_err(OracleProviderError::TrieNode)?;
        Ok((!value.is_zero()).then(|| B256::from(value.to_be_bytes::<32>())))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::HistoryChain;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn generic_lookup(chain: &HistoryChain, head: &Sealed<Header>, number: u64) -> Option<B256> {
        let mut index = CanonicalBlockIndex::new(head.clone());
        index.header_by_number(number, chain).unwrap().map(|h| h.seal())
    }

    #[test]
    fn test_generic_walks_back_and_caches() {
        let chain = HistoryChain::builder().length(20).build();
        let head = chain.header(20);
        let mut index = CanonicalBlockIndex::new(head.clone());

        assert_eq!(index.header_by_number(21, &chain).unwrap(), None);
        assert_eq!(index.header_by_number(20, &chain).unwrap(), Some(head));
        assert_eq!(chain.lookups(), 0);

        assert_eq!(index.header_by_number(10, &chain).unwrap(), Some(chain.header(10)));
        assert_eq!(chain.lookups(), 10);

        // Everything between 10 and the head is indexed now.
        assert_eq!(index.header_by_number(15, &chain).unwrap(), Some(chain.header(15)));
        assert_eq!(chain.lookups(), 11);
        assert_eq!(index.header_by_number(8, &chain).unwrap(), Some(chain.header(8)));
        assert_eq!(chain.lookups(), 13);
    }

    #[test]
    fn test_generic_set_canonical_reconnects() {
        let chain = HistoryChain::builder().length(20).fork_at(12, 25).build();
        let mut index = CanonicalBlockIndex::new(chain.header(20));
        index.header_by_number(0, &chain).unwrap();

        let fork_head = chain.fork_header(25);
        index.set_canonical(fork_head.clone(), &chain).unwrap();
        assert_eq!(index.head(), &fork_head);
        for number in 0..=25 {
            let expected = if number <= 12 { chain.header(number) } else { chain.fork_header(number) };
            assert_eq!(index.header_by_number(number, &chain).unwrap(), Some(expected));
        }
        assert_eq!(index.header_by_number(26, &chain).unwrap(), None);

        // Rewinding below the fork drops the fork blocks.
        index.set_canonical(chain.header(5), &chain).unwrap();
        assert_eq!(index.header_by_number(6, &chain).unwrap(), None);
        assert_eq!(index.header_by_number(4, &chain).unwrap(), Some(chain.header(4)));
    }

    #[test]
    fn test_fast_lookup_within_window() {
        let chain = HistoryChain::builder().length(50).isthmus_time(0).build();
        let head = chain.header(50);
        let mut index = FastCanonicalBlockIndex::new(head.clone(), chain.config());

        for number in [49, 30, 0] {
            let lookups = chain.lookups();
            assert_eq!(index.header_by_number(number, &chain).unwrap(), Some(chain.header(number)));
            // One header fetch for the block itself, no walk.
            assert_eq!(chain.lookups(), lookups + 1);
        }
        assert_eq!(
            chain.history_hints(),
            [(49, head.seal()), (30, head.seal()), (0, head.seal())]
        );

        // No hint and no read for the head itself.
        assert_eq!(index.header_by_number(50, &chain).unwrap(), Some(head));
        assert_eq!(chain.history_hints().len(), 3);
    }

    #[test]
    fn test_fast_lookup_jumps_windows() {
        let chain =
            HistoryChain::builder().length(16384).isthmus_time(0).state_at(&[16384, 8193, 2]).build();
        let head = chain.header(16384);
        let mut index = FastCanonicalBlockIndex::new(head.clone(), chain.config());

        assert_eq!(index.header_by_number(1, &chain).unwrap(), Some(chain.header(1)));
        let anchors = chain.history_hints().into_iter().map(|(_, anchor)| anchor).collect::<Vec<_>>();
        assert_eq!(
            anchors,
            [chain.header(16384).seal(), chain.header(8193).seal(), chain.header(2).seal()]
        );

        // The anchors are cached: a second lookup in the oldest window reads from block 2 only.
        index.header_by_number(0, &chain).unwrap();
        assert_eq!(chain.history_hints().last(), Some(&(0, chain.header(2).seal())));
        assert_eq!(chain.history_hints().len(), 4);

        assert_eq!(index.header_by_number(8193, &chain).unwrap(), Some(chain.header(8193)));
        assert_eq!(index.header_by_number(8192, &chain).unwrap(), Some(chain.header(8192)));
    }

    #[test]
    fn test_fast_falls_back_before_activation() {
        let chain = HistoryChain::builder().length(20).isthmus_time(u64::MAX).build();
        let mut index = FastCanonicalBlockIndex::new(chain.header(20), chain.config());
        assert_eq!(index.header_by_number(3, &chain).unwrap(), Some(chain.header(3)));
        assert!(chain.history_hints().is_empty());
        assert_eq!(chain.lookups(), 17);
    }

    #[test]
    fn test_fast_falls_back_on_empty_slot() {
        // Activated at block 10: the state of the head only holds hashes from block 9 on.
        let chain = HistoryChain::builder().length(20).isthmus_time(10).build();
        let mut index = FastCanonicalBlockIndex::new(chain.header(20), chain.config());
        assert_eq!(index.header_by_number(12, &chain).unwrap(), Some(chain.header(12)));
        assert_eq!(index.header_by_number(3, &chain).unwrap(), Some(chain.header(3)));
        assert_eq!(chain.history_hints().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_fast_index_matches_generic(
            length in 1u64..64,
            window in 2u64..24,
            activation in 0u64..80,
            fork in proptest::option::of((0u64..64, 0u64..64)),
        ) {
            let mut builder =
                HistoryChain::builder().length(length).isthmus_time(activation).window(window);
            if let Some((at, extra)) = fork {
                builder = builder.fork_at(at.min(length), at.min(length) + 1 + extra);
            }
            let chain = builder.build();

            let head = chain.header(length);
            let mut fast =
                FastCanonicalBlockIndex::new(head.clone(), chain.config()).with_window(window);
            for number in 0..=length + 1 {
                let actual = fast.header_by_number(number, &chain).unwrap().map(|h| h.seal());
                prop_assert_eq!(actual, generic_lookup(&chain, &head, number));
            }

            if let Some(fork_head) = chain.fork_head() {
                fast.set_canonical(fork_head.clone(), &chain).unwrap();
                for number in 0..=fork_head.number + 1 {
                    let actual = fast.header_by_number(number, &chain).unwrap().map(|h| h.seal());
                    prop_assert_eq!(actual, generic_lookup(&chain, &fork_head, number));
                }
            }
        }
    }
}
