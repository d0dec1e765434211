//! Consolidation of the optimistic blocks of a transition state into the next super root.
//!
//! Every pending block is checked against the cross-chain messages it executes. A block with an
//! invalid dependency is replaced by its deposits-only counterpart and the checks restart, so that
//! blocks depending on the replaced one are checked against the replacement. Each chain is
//! replaced at most once, which bounds the number of rounds by the number of chains.

use crate::{
    deposits::build_deposits_only_block, errors::ConsolidationError, BootInfo, ConfigLinker,
    ConsolidateOracle,
};
use alloc::{
    collections::{BTreeMap, BTreeSet},
    string::ToString,
    vec::Vec,
};
use alloy_consensus::{Header, Sealed};
use alloy_primitives::B256;
use interlock_interop::{
    check_hazards, executing_messages_from_receipts, initiating_log_checksum, BlockSeal,
    ContainsQuery, ExecutingMessage, HazardDeps, HazardError, HazardResult, OpenedBlock,
    OptimisticBlock, OutputRootWithChain, SuperRoot, TransitionState,
};
use alloy_rlp::Decodable;
use interlock_mpt::{TrieNode, TrieProvider};
use interlock_proof::{
    canonical::{CanonicalSource, FastCanonicalBlockIndex},
    chain::BlockExecutor,
    errors::OracleProviderError,
    l2::L2Oracle,
    L2Block,
};

/// The executing messages and log count of a block, keyed by block hash.
type MessageCache = BTreeMap<B256, (BTreeMap<u32, ExecutingMessage>, u32)>;

/// Consolidates the pending blocks of a [TransitionState].
///
/// Works on a copy of the transition state. Replacement blocks are written to the store of a
/// [ConsolidateOracle] so that later rounds read them like any other block.
#[derive(Debug)]
pub struct Consolidator<'a, O, E> {
    boot: &'a BootInfo,
    oracle: ConsolidateOracle<O>,
    executor: E,
    state: TransitionState,
    replaced: BTreeSet<u64>,
    messages: MessageCache,
    contains_calls: usize,
}

impl<'a, O, E> Consolidator<'a, O, E>
where
    O: L2Oracle + Clone,
    E: BlockExecutor + Clone,
{
    /// Creates a consolidator for `state`.
    pub fn new(boot: &'a BootInfo, oracle: O, executor: E, state: TransitionState) -> Self {
        Self {
            boot,
            oracle: ConsolidateOracle::new(oracle, state.clone()),
            executor,
            state,
            replaced: BTreeSet::new(),
            messages: BTreeMap::new(),
            contains_calls: 0,
        }
    }

    /// Returns the overlay oracle holding the replacement blocks.
    pub const fn oracle(&self) -> &ConsolidateOracle<O> {
        &self.oracle
    }

    /// Returns the pending blocks, with replacements applied.
    pub fn pending_progress(&self) -> &[OptimisticBlock] {
        &self.state.pending_progress
    }

    /// Returns the chains whose pending block was replaced.
    pub const fn replaced_chains(&self) -> &BTreeSet<u64> {
        &self.replaced
    }

    /// Returns the number of initiating message lookups performed so far.
    pub const fn contains_calls(&self) -> usize {
        self.contains_calls
    }

    /// Runs consolidation rounds until every pending block passes its checks, and returns the
    /// super root one second after the agreed one.
    pub fn consolidate(&mut self) -> Result<SuperRoot, ConsolidationError> {
        let chains = self.state.pre_state.output_roots.len();
        if self.state.pending_progress.len() != chains {
            return Err(ConsolidationError::PendingProgressMismatch {
                chains,
                pending: self.state.pending_progress.len(),
            });
        }
        info!(
            target: "consolidation",
            "Consolidating {} chains at timestamp {}",
            chains,
            self.state.pre_state.timestamp + 1
        );

        for round in 0..=chains {
            match self.consolidate_once() {
                Ok(()) => {
                    let super_root = self.super_root();
                    info!(
                        target: "consolidation",
                        "Consolidated after {} rounds with {} replacements and {} message lookups: {}",
                        round + 1,
                        self.replaced.len(),
                        self.contains_calls,
                        super_root.hash()
                    );
                    return Ok(super_root);
                }
                Err(ConsolidationError::BlockReplaced(chain_id)) => {
                    debug!(target: "consolidation", "Restarting after replacing chain {chain_id}");
                }
                Err(err) => {
                    error!(target: "consolidation", "Consolidation failed: {err}");
                    return Err(err);
                }
            }
        }
        Err(ConsolidationError::ReplacementLimit(self.replaced.len()))
    }

    /// Runs one round of checks. Replaces the first failing block and reports it as
    /// [ConsolidationError::BlockReplaced].
    fn consolidate_once(&mut self) -> Result<(), ConsolidationError> {
        let Some((index, block, reason)) = self.find_invalid_block()? else {
            return Ok(());
        };
        let chain = self.state.pre_state.output_roots[index];
        warn!(
            target: "consolidation",
            "Block #{} ({}) of chain {} has an invalid dependency: {reason}",
            block.number(),
            block.hash(),
            chain.chain_id
        );

        let config = *self.boot.rollup_config(chain.chain_id)?;
        let replacement = build_deposits_only_block(
            self.oracle.clone(),
            self.executor.clone(),
            config,
            chain.output_root,
            &block,
            self.oracle.kv(),
        )?;
        self.state.pending_progress[index] = replacement;
        self.replaced.insert(chain.chain_id);
        Err(ConsolidationError::BlockReplaced(chain.chain_id))
    }

    /// Checks the pending block of every chain not yet replaced, in super root order. Returns the
    /// first block with an invalid dependency.
    fn find_invalid_block(
        &mut self,
    ) -> Result<Option<(usize, L2Block, HazardError)>, ConsolidationError> {
        let linker = ConfigLinker::new(&self.boot.rollup_configs, &self.boot.dependency_set);
        let mut deps = ConsolidationDeps::new(
            &self.oracle,
            self.boot,
            &self.state.pre_state.output_roots,
            &self.state.pending_progress,
            &mut self.messages,
            &mut self.contains_calls,
        )?;

        for (index, (chain, pending)) in
            self.state.pre_state.output_roots.iter().zip(&self.state.pending_progress).enumerate()
        {
            if self.replaced.contains(&chain.chain_id) {
                continue;
            }

            let block = self.oracle.block_by_hash(pending.block_hash, chain.chain_id)?;
            let candidate = BlockSeal::new(block.hash(), block.number(), block.timestamp());
            match check_hazards(&mut deps, &linker, chain.chain_id, candidate) {
                Ok(()) => {
                    trace!(target: "consolidation", "Chain {} {candidate} is valid", chain.chain_id)
                }
                Err(err) if err.is_invalid_dependency() => return Ok(Some((index, block, err))),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    fn super_root(&self) -> SuperRoot {
        let output_roots = self
            .state
            .pre_state
            .output_roots
            .iter()
            .zip(&self.state.pending_progress)
            .map(|(chain, pending)| OutputRootWithChain::new(chain.chain_id, pending.output_root))
            .collect::<Vec<_>>();
        SuperRoot::new(self.state.pre_state.timestamp + 1, output_roots)
    }
}

/// Consolidates `state` and returns the next super root.
pub fn run_consolidation<O, E>(
    boot: &BootInfo,
    oracle: O,
    executor: E,
    state: TransitionState,
) -> Result<SuperRoot, ConsolidationError>
where
    O: L2Oracle + Clone,
    E: BlockExecutor + Clone,
{
    Consolidator::new(boot, oracle, executor, state).consolidate()
}

/// The data a canonical index reads for one chain, served by an [L2Oracle].
struct OracleSource<'a, O> {
    oracle: &'a O,
    chain_id: u64,
}

impl<O: L2Oracle> TrieProvider for OracleSource<'_, O> {
    type Error = OracleProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        let raw = self.oracle.node_by_hash(key, self.chain_id)?;
        TrieNode::decode(&mut raw.as_ref()).map_err(OracleProviderError::Rlp)
    }
}

impl<O: L2Oracle> CanonicalSource for OracleSource<'_, O> {
    fn header_by_hash(&self, hash: B256) -> Result<Sealed<Header>, OracleProviderError> {
        self.oracle.block_by_hash(hash, self.chain_id).map(|block| block.header)
    }

    fn hint_block_hash_lookup(&self, block_number: u64, head_hash: B256) {
        self.oracle.hint_block_hash_lookup(block_number, head_hash, self.chain_id);
    }
}

/// A chain as seen during one round: canonical up to its pending block.
struct CanonicalView<'a, O> {
    index: FastCanonicalBlockIndex,
    source: OracleSource<'a, O>,
}

/// [HazardDeps] over the pending blocks of one consolidation round.
struct ConsolidationDeps<'a, O> {
    oracle: &'a O,
    chains: BTreeMap<u64, CanonicalView<'a, O>>,
    messages: &'a mut MessageCache,
    contains_calls: &'a mut usize,
}

impl<'a, O: L2Oracle> ConsolidationDeps<'a, O> {
    fn new(
        oracle: &'a O,
        boot: &BootInfo,
        output_roots: &[OutputRootWithChain],
        pending: &[OptimisticBlock],
        messages: &'a mut MessageCache,
        contains_calls: &'a mut usize,
    ) -> Result<Self, ConsolidationError> {
        let mut chains = BTreeMap::new();
        for (chain, pending) in output_roots.iter().zip(pending) {
            let config = *boot.rollup_config(chain.chain_id)?;
            let agreed = oracle.output_by_root(chain.output_root, chain.chain_id)?;
            let head =
                oracle.block_data_by_hash(agreed.block_hash, pending.block_hash, chain.chain_id)?;
            chains.insert(
                chain.chain_id,
                CanonicalView {
                    index: FastCanonicalBlockIndex::new(head.header, config),
                    source: OracleSource { oracle, chain_id: chain.chain_id },
                },
            );
        }
        Ok(Self { oracle, chains, messages, contains_calls })
    }

    fn canonical_header(&mut self, chain_id: u64, number: u64) -> HazardResult<Sealed<Header>> {
        let view = self.chains.get_mut(&chain_id).ok_or(HazardError::UnknownChain(chain_id))?;
        view.index
            .header_by_number(number, &view.source)
            .map_err(provider_error)?
            .ok_or(HazardError::MissingBlock { chain: chain_id, number })
    }
}

impl<O: L2Oracle> HazardDeps for ConsolidationDeps<'_, O> {
    fn contains(&mut self, chain_id: u64, query: &ContainsQuery) -> HazardResult<BlockSeal> {
        *self.contains_calls += 1;

        let header = self.canonical_header(chain_id, query.block_number)?;
        if header.timestamp != query.timestamp {
            return Err(HazardError::TimestampMismatch {
                expected: query.timestamp,
                actual: header.timestamp,
            });
        }

        let receipts =
            self.oracle.receipts_by_block_hash(header.seal(), chain_id).map_err(provider_error)?;
        let log = receipts.iter().flat_map(|receipt| receipt.logs()).nth(query.log_index as usize);
        let Some(log) = log else {
            return Err(HazardError::LogNotFound {
                chain: chain_id,
                number: query.block_number,
                log_index: query.log_index,
            });
        };

        let checksum = initiating_log_checksum(
            log,
            chain_id,
            query.block_number,
            query.log_index,
            query.timestamp,
        );
        if checksum != query.checksum {
            return Err(HazardError::ChecksumMismatch { expected: query.checksum, actual: checksum });
        }
        Ok(BlockSeal::new(header.seal(), header.number, header.timestamp))
    }

    fn open_block(&mut self, chain_id: u64, number: u64) -> HazardResult<OpenedBlock> {
        let header = self.canonical_header(chain_id, number)?;
        let hash = header.seal();

        let (messages, log_count) = match self.messages.get(&hash) {
            Some(cached) => cached.clone(),
            None => {
                let receipts =
                    self.oracle.receipts_by_block_hash(hash, chain_id).map_err(provider_error)?;
                let decoded = executing_messages_from_receipts(&receipts)
                    .map_err(|err| HazardError::Provider(err.to_string()))?;
                self.messages.insert(hash, decoded.clone());
                decoded
            }
        };
        Ok(OpenedBlock { hash, number: header.number, log_count, messages })
    }
}

fn provider_error(err: OracleProviderError) -> HazardError {
    HazardError::Provider(err.to_string())
}


#[cfg(test)]
mod test {
    use super::{test_util::*, *};
    use crate::deposits::invalidated_output;
    use alloc::vec;
    use interlock_interop::DependencySet;
    use interlock_proof::KeyValueStore;
    use interlock_proof::test_utils::{FakeExecutor, StubL2Oracle, TestChain};

    fn consolidator(fixture: &Fixture) -> Consolidator<'_, StubL2Oracle, FakeExecutor> {
        Consolidator::new(
            &fixture.boot,
            fixture.stub.clone(),
            FakeExecutor::default(),
            fixture.consolidation_state(),
        )
    }

    #[test]
    fn test_no_messages() {
        let fixture = Fixture::new([vec![], vec![]]);
        let mut consolidator = consolidator(&fixture);
        let super_root = consolidator.consolidate().unwrap();

        assert!(consolidator.replaced_chains().is_empty());
        assert_eq!(consolidator.pending_progress(), fixture.pending().as_slice());
        assert_eq!(super_root.timestamp, TestChain::GENESIS_TIME + PENDING);
        let expected = fixture
            .chains
            .iter()
            .map(|c| OutputRootWithChain::new(c.config().l2_chain_id, c.output(PENDING).root()))
            .collect::<Vec<_>>();
        assert_eq!(super_root, SuperRoot::new(TestChain::GENESIS_TIME + PENDING, expected));
    }

    #[test]
    fn test_invalid_log_index_replaces_executing_chain() {
        let init = init_log(0xa1);
        let fixture =
            Fixture::new([vec![init.clone()], vec![exec_log(CHAINS[0], PENDING, 5, &init)]]);
        let mut consolidator = consolidator(&fixture);
        let super_root = consolidator.consolidate().unwrap();

        assert_eq!(consolidator.replaced_chains().iter().collect::<Vec<_>>(), vec![&CHAINS[1]]);
        let pending = consolidator.pending_progress();
        assert_eq!(pending[0], fixture.pending()[0]);
        assert_ne!(pending[1].block_hash, fixture.chains[1].block(PENDING).hash());

        // The replacement and its output are served locally.
        let kv = consolidator.oracle().kv();
        assert!(kv.get(pending[1].output_root).is_some());
        let replacement =
            consolidator.oracle().block_by_hash(pending[1].block_hash, CHAINS[1]).unwrap();
        assert!(replacement.is_deposits_only());
        assert_eq!(
            invalidated_output(&replacement.transactions).unwrap(),
            fixture.chains[1].output(PENDING)
        );

        let roots = &super_root.output_roots;
        assert_eq!(roots[0].output_root, fixture.chains[0].output(PENDING).root());
        assert_eq!(roots[1].output_root, pending[1].output_root);
    }

    #[test]
    fn test_replacement_is_logged() {
        use tracing_subscriber::layer::SubscriberExt;

        let layer = CollectingLayer::default();
        let subscriber = tracing_subscriber::Registry::default().with(layer.clone());
        let init = init_log(0xa1);
        let fixture = Fixture::new([vec![], vec![exec_log(CHAINS[0], PENDING, 0, &init)]]);
        tracing::subscriber::with_default(subscriber, || {
            consolidator(&fixture).consolidate().unwrap();
        });

        let warnings = layer.at_level(tracing::Level::WARN);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("has an invalid dependency"));
        assert!(layer
            .at_level(tracing::Level::INFO)
            .iter()
            .any(|message| message.contains("deposits-only block")));
    }

    #[test]
    fn test_mutual_same_timestamp_messages() {
        let (init_a, init_b) = (init_log(0xa1), init_log(0xb1));
        let fixture = Fixture::new([
            vec![init_a.clone(), exec_log(CHAINS[1], PENDING, 0, &init_b)],
            vec![init_b.clone(), exec_log(CHAINS[0], PENDING, 0, &init_a)],
        ]);
        let mut consolidator = consolidator(&fixture);
        consolidator.consolidate().unwrap();

        assert!(consolidator.replaced_chains().is_empty());
        assert_eq!(consolidator.pending_progress(), fixture.pending().as_slice());
        assert!(consolidator.contains_calls() > 0);
    }

    #[test]
    fn test_cyclic_messages_are_replaced() {
        let (init_a, init_b) = (init_log(0xa1), init_log(0xb1));
        // Each chain executes the other's log before emitting its own.
        let fixture = Fixture::new([
            vec![exec_log(CHAINS[1], PENDING, 1, &init_b), init_a.clone()],
            vec![exec_log(CHAINS[0], PENDING, 1, &init_a), init_b.clone()],
        ]);
        let mut consolidator = consolidator(&fixture);
        consolidator.consolidate().unwrap();
        assert_eq!(consolidator.replaced_chains().len(), 2);
    }

    #[test]
    fn test_expired_message_skips_lookups() {
        let init = init_log(0xa1);
        let deps = DependencySet {
            override_message_expiry_window: Some(1),
            ..DependencySet::new(CHAINS)
        };
        let fixture = Fixture::with_dependency_set(
            [vec![], vec![exec_log(CHAINS[0], 1, 0, &init)]],
            deps,
        );
        let mut consolidator = consolidator(&fixture);
        consolidator.consolidate().unwrap();

        assert_eq!(consolidator.contains_calls(), 0);
        assert_eq!(consolidator.replaced_chains().iter().collect::<Vec<_>>(), vec![&CHAINS[1]]);
    }

    #[test]
    fn test_message_before_interop_activation_is_replaced() {
        let init = init_log(0xa1);
        let mut fixture =
            Fixture::new([vec![init.clone()], vec![exec_log(CHAINS[0], PENDING, 0, &init)]]);
        // The executed log is valid, but chain A only activates interop after it was emitted.
        if let Some(config) = fixture.boot.rollup_configs.get_mut(&CHAINS[0]) {
            config.interop_time = Some(TestChain::GENESIS_TIME + PENDING + 1);
        }
        let mut consolidator = consolidator(&fixture);
        consolidator.consolidate().unwrap();

        assert_eq!(consolidator.contains_calls(), 0);
        assert_eq!(consolidator.replaced_chains().iter().collect::<Vec<_>>(), vec![&CHAINS[1]]);
        assert_eq!(
            consolidator.pending_progress()[0].block_hash,
            fixture.chains[0].block(PENDING).hash()
        );
    }

    #[test]
    fn test_invalid_dependency_cascades() {
        let (init_b, stray) = (init_log(0xb1), init_log(0xff));
        let fixture = Fixture::new([
            vec![exec_log(CHAINS[1], PENDING, 0, &init_b)],
            vec![init_b.clone(), exec_log(CHAINS[0], PENDING, 7, &stray)],
        ]);
        let mut consolidator = consolidator(&fixture);
        consolidator.consolidate().unwrap();

        // Each chain is replaced exactly once, the first through its dependency on the second.
        assert_eq!(consolidator.replaced_chains().len(), CHAINS.len());
        for (pending, chain) in consolidator.pending_progress().iter().zip(&fixture.chains) {
            assert_ne!(pending.block_hash, chain.block(PENDING).hash());
        }
    }

    #[test]
    fn test_pending_progress_mismatch() {
        let fixture = Fixture::new([vec![], vec![]]);
        let mut state = fixture.consolidation_state();
        state.pending_progress.pop();
        let err =
            run_consolidation(&fixture.boot, fixture.stub.clone(), FakeExecutor::default(), state)
                .unwrap_err();
        assert!(matches!(
            err,
            ConsolidationError::PendingProgressMismatch { chains: 2, pending: 1 }
        ));
    }

    #[test]
    fn test_missing_block_is_fatal() {
        let fixture = Fixture::new([vec![], vec![]]);
        let mut state = fixture.consolidation_state();
        state.pending_progress[1].block_hash = B256::repeat_byte(0x99);
        let err =
            run_consolidation(&fixture.boot, fixture.stub.clone(), FakeExecutor::default(), state)
                .unwrap_err();
        assert!(matches!(err, ConsolidationError::Oracle(OracleProviderError::NotFound(_))));
    }
}
