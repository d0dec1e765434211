//! An L2 chain backed by the preimage oracle that can build and insert new blocks on top of the
//! agreed head.

use crate::{
    canonical::{CanonicalSource, FastCanonicalBlockIndex},
    errors::{ChainError, OracleProviderError},
    l2::{L2Oracle, L2_TO_L1_MESSAGE_PASSER_ADDRESS},
    L2Block, MemoryKv, OracleBackedDb, OutputV0, RollupConfig, StateDatabase,
};
use alloc::{collections::BTreeMap, string::ToString, vec::Vec};
use alloy_consensus::{Header, Sealed};
use alloy_primitives::{Sealable, B256, B64};
use alloy_rpc_types_engine::PayloadAttributes;
use core::fmt::Display;
use interlock_mpt::{account_at, TrieNode, TrieProvider};
use op_alloy_consensus::OpReceiptEnvelope;
use op_alloy_rpc_types_engine::OpPayloadAttributes;

/// The result of executing a payload on top of a parent block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// The header of the built block.
    pub header: Header,
    /// The receipts of the block's transactions, in order.
    pub receipts: Vec<OpReceiptEnvelope>,
}

/// Executes payloads against a [StateDatabase]. Trie nodes and code created by the execution are
/// written back through [StateDatabase::insert_preimage].
pub trait BlockExecutor {
    /// The error returned when a payload fails to execute.
    type Error: Display;

    /// Executes `attributes` on top of `parent` and returns the resulting header and receipts.
    fn execute_payload<S: StateDatabase>(
        &mut self,
        state: &S,
        parent: &Sealed<Header>,
        attributes: &OpPayloadAttributes,
    ) -> Result<ExecutionOutcome, Self::Error>;
}

/// Reconstructs the payload attributes that produce `block` when executed on its parent.
pub fn payload_attributes_from_block(block: &L2Block, config: &RollupConfig) -> OpPayloadAttributes {
    let header = &block.header;
    OpPayloadAttributes {
        payload_attributes: PayloadAttributes {
            timestamp: header.timestamp,
            prev_randao: header.mix_hash,
            suggested_fee_recipient: header.beneficiary,
            withdrawals: header.withdrawals_root.map(|_| Vec::new()),
            parent_beacon_block_root: header.parent_beacon_block_root,
        },
        transactions: Some(block.transactions.clone()),
        no_tx_pool: Some(true),
        gas_limit: Some(header.gas_limit),
        eip_1559_params: config
            .is_holocene_active(header.timestamp)
            .then(|| header.extra_data.get(1..9).map(B64::from_slice))
            .flatten(),
    }
}

/// Blocks created by the program plus the oracle that serves everything older.
#[derive(Debug)]
struct ChainStore<O> {
    oracle: O,
    db: OracleBackedDb<O, MemoryKv>,
    blocks: BTreeMap<B256, L2Block>,
    receipts: BTreeMap<B256, Vec<OpReceiptEnvelope>>,
    chain_id: u64,
}

impl<O: L2Oracle> ChainStore<O> {
    fn block_by_hash(&self, hash: B256) -> Result<L2Block, OracleProviderError> {
        match self.blocks.get(&hash) {
            Some(block) => Ok(block.clone()),
            None => self.oracle.block_by_hash(hash, self.chain_id),
        }
    }
}

impl<O: L2Oracle> TrieProvider for ChainStore<O> {
    type Error = OracleProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        self.db.trie_node_by_hash(key)
    }
}

impl<O: L2Oracle> CanonicalSource for ChainStore<O> {
    fn header_by_hash(&self, hash: B256) -> Result<Sealed<Header>, OracleProviderError> {
        self.block_by_hash(hash).map(|block| block.header)
    }

    fn hint_block_hash_lookup(&self, block_number: u64, head_hash: B256) {
        self.oracle.hint_block_hash_lookup(block_number, head_hash, self.chain_id);
    }
}

/// An L2 chain whose history up to the agreed head comes from an [L2Oracle], extended by blocks
/// built or inserted by the program.
#[derive(Debug)]
pub struct OracleBackedChain<O, E> {
    config: RollupConfig,
    executor: E,
    store: ChainStore<O>,
    /// The newest block known to the oracle.
    oracle_head: Sealed<Header>,
    safe: Sealed<Header>,
    finalized: Sealed<Header>,
    canon: FastCanonicalBlockIndex,
}

impl<O, E> OracleBackedChain<O, E>
where
    O: L2Oracle + Clone,
    E: BlockExecutor,
{
    /// Opens the chain at the block committed to by `agreed_output_root`, writing execution
    /// results to `kv`.
    pub fn from_output_root(
        oracle: O,
        executor: E,
        config: RollupConfig,
        agreed_output_root: B256,
        kv: MemoryKv,
    ) -> Result<Self, ChainError> {
        let output = oracle.output_by_root(agreed_output_root, config.l2_chain_id)?;
        let head = oracle.block_by_hash(output.block_hash, config.l2_chain_id)?;
        info!(
            target: "oracle_chain",
            "Loaded agreed head #{} ({}) of chain {}",
            head.number(),
            head.hash(),
            config.l2_chain_id
        );
        Ok(Self::with_kv(oracle, executor, config, head.header, kv))
    }

    /// Opens the chain at `head`, which must be known to the oracle.
    pub fn from_head(oracle: O, executor: E, config: RollupConfig, head: Sealed<Header>) -> Self {
        Self::with_kv(oracle, executor, config, head, MemoryKv::default())
    }

    /// Opens the chain at `head`, writing execution results to `kv`.
    pub fn with_kv(
        oracle: O,
        executor: E,
        config: RollupConfig,
        head: Sealed<Header>,
        kv: MemoryKv,
    ) -> Self {
        let chain_id = config.l2_chain_id;
        Self {
            store: ChainStore {
                db: OracleBackedDb::new(oracle.clone(), kv, chain_id),
                oracle,
                blocks: BTreeMap::new(),
                receipts: BTreeMap::new(),
                chain_id,
            },
            executor,
            canon: FastCanonicalBlockIndex::new(head.clone(), config),
            safe: head.clone(),
            finalized: head.clone(),
            oracle_head: head,
            config,
        }
    }

    /// Returns the rollup config of the chain.
    pub const fn config(&self) -> &RollupConfig {
        &self.config
    }

    /// Returns the chain ID.
    pub const fn chain_id(&self) -> u64 {
        self.config.l2_chain_id
    }

    /// Returns the oracle backing the chain.
    pub const fn oracle(&self) -> &O {
        &self.store.oracle
    }

    /// Returns the store holding trie nodes and code created by execution.
    pub fn kv(&self) -> &MemoryKv {
        self.store.db.kv()
    }

    /// Returns the newest block known to the oracle.
    pub const fn oracle_head(&self) -> &Sealed<Header> {
        &self.oracle_head
    }

    /// Returns the canonical head.
    pub const fn head(&self) -> &Sealed<Header> {
        self.canon.head()
    }

    /// Returns the safe head.
    pub const fn safe(&self) -> &Sealed<Header> {
        &self.safe
    }

    /// Returns the finalized head.
    pub const fn finalized(&self) -> &Sealed<Header> {
        &self.finalized
    }

    /// Returns the canonical header at `number`, or [None] above the canonical head.
    pub fn header_by_number(&mut self, number: u64) -> Result<Option<Sealed<Header>>, ChainError> {
        Ok(self.canon.header_by_number(number, &self.store)?)
    }

    /// Returns the canonical block hash at `number`.
    pub fn canonical_hash(&mut self, number: u64) -> Result<Option<B256>, ChainError> {
        Ok(self.header_by_number(number)?.map(|header| header.seal()))
    }

    /// Returns the header with the given hash.
    pub fn header_by_hash(&self, hash: B256) -> Result<Sealed<Header>, ChainError> {
        Ok(self.store.header_by_hash(hash)?)
    }

    /// Returns the block with the given hash, preferring blocks created by the program.
    pub fn block_by_hash(&self, hash: B256) -> Result<L2Block, ChainError> {
        Ok(self.store.block_by_hash(hash)?)
    }

    /// Returns the block with the given hash and number. Blocks above the oracle head are only
    /// found if they were created by the program.
    pub fn block(&self, hash: B256, number: u64) -> Result<Option<L2Block>, ChainError> {
        if let Some(block) = self.store.blocks.get(&hash) {
            return Ok(Some(block.clone()));
        }
        if number > self.oracle_head.number {
            return Ok(None);
        }
        let block = self.store.oracle.block_by_hash(hash, self.chain_id())?;
        Ok((block.number() == number).then_some(block))
    }

    /// Returns true if the block was created by the program.
    pub fn is_inserted(&self, hash: B256) -> bool {
        self.store.blocks.contains_key(&hash)
    }

    /// Returns the receipts of the block with the given hash.
    pub fn receipts_by_block_hash(&self, hash: B256) -> Result<Vec<OpReceiptEnvelope>, ChainError> {
        match self.store.receipts.get(&hash) {
            Some(receipts) => Ok(receipts.clone()),
            None => Ok(self.store.oracle.receipts_by_block_hash(hash, self.chain_id())?),
        }
    }

    /// Builds a block from `attributes` on top of `parent_hash` and stores it. The canonical head
    /// is left unchanged.
    pub fn build_block(
        &mut self,
        parent_hash: B256,
        attributes: &OpPayloadAttributes,
    ) -> Result<L2Block, ChainError> {
        let (block, receipts) = self.execute(parent_hash, attributes)?;
        self.store_block(block.clone(), receipts);
        Ok(block)
    }

    /// Replays the transactions of `block` on its parent and stores it if the result is
    /// identical. The canonical head is left unchanged.
    pub fn insert_block(&mut self, block: &L2Block) -> Result<(), ChainError> {
        if self.is_inserted(block.hash()) {
            return Ok(());
        }

        let attributes = payload_attributes_from_block(block, &self.config);
        let (built, receipts) = self.execute(block.header.parent_hash, &attributes)?;
        if built.hash() != block.hash() {
            return Err(ChainError::UnexpectedBlockHash {
                expected: block.hash(),
                actual: built.hash(),
            });
        }
        self.store_block(built, receipts);
        Ok(())
    }

    /// Makes the block with the given hash the canonical head.
    pub fn set_canonical(&mut self, hash: B256) -> Result<(), ChainError> {
        let head = self.store.header_by_hash(hash)?;
        self.canon.set_canonical(head, &self.store)?;
        Ok(())
    }

    /// Sets the safe head.
    pub fn set_safe(&mut self, hash: B256) -> Result<(), ChainError> {
        self.safe = self.store.header_by_hash(hash)?;
        Ok(())
    }

    /// Sets the finalized head.
    pub fn set_finalized(&mut self, hash: B256) -> Result<(), ChainError> {
        self.finalized = self.store.header_by_hash(hash)?;
        Ok(())
    }

    /// Returns the storage root of the `L2ToL1MessagePasser` after `header`. From Isthmus on the
    /// header carries it as the withdrawals root.
    pub fn message_passer_storage_root(&self, header: &Sealed<Header>) -> Result<B256, ChainError> {
        if self.config.is_isthmus_active(header.timestamp) {
            return header.withdrawals_root.ok_or(ChainError::InvalidHeader(header.seal()));
        }

        self.store.oracle.hint_withdrawals_root(header.seal(), self.chain_id());
        let account = account_at(header.state_root, L2_TO_L1_MESSAGE_PASSER_ADDRESS, &self.store)?
            .ok_or(ChainError::AccountNotFound {
                address: L2_TO_L1_MESSAGE_PASSER_ADDRESS,
                state_root: header.state_root,
            })?;
        Ok(account.storage_root)
    }

    /// Returns the output committed to after `header`.
    pub fn output_at(&self, header: &Sealed<Header>) -> Result<OutputV0, ChainError> {
        Ok(OutputV0::new(
            header.state_root,
            self.message_passer_storage_root(header)?,
            header.seal(),
        ))
    }

    fn execute(
        &mut self,
        parent_hash: B256,
        attributes: &OpPayloadAttributes,
    ) -> Result<(L2Block, Vec<OpReceiptEnvelope>), ChainError> {
        let parent = self.store.header_by_hash(parent_hash)?;
        let outcome = self
            .executor
            .execute_payload(&self.store.db, &parent, attributes)
            .map_err(|err| ChainError::Execution(err.to_string()))?;

        let header = outcome.header.seal_slow();
        debug!(
            target: "oracle_chain",
            "Executed block #{} ({}) on parent {}",
            header.number,
            header.seal(),
            parent_hash
        );
        let block = L2Block::new(header, attributes.transactions.clone().unwrap_or_default());
        Ok((block, outcome.receipts))
    }

    fn store_block(&mut self, block: L2Block, receipts: Vec<OpReceiptEnvelope>) {
        self.store.receipts.insert(block.hash(), receipts);
        self.store.blocks.insert(block.hash(), block);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{FakeExecutor, StubL2Oracle, TestChain};
    use alloy_primitives::{bytes, B256};

    fn open(
        chain: &TestChain,
        head: u64,
    ) -> (StubL2Oracle, OracleBackedChain<StubL2Oracle, FakeExecutor>) {
        let stub = StubL2Oracle::default();
        chain.register(&stub);
        let backed = OracleBackedChain::from_output_root(
            stub.clone(),
            FakeExecutor::default(),
            chain.config(),
            chain.output(head).root(),
            MemoryKv::default(),
        )
        .unwrap();
        (stub, backed)
    }

    #[test]
    fn test_open_from_output_root() {
        let chain = TestChain::new(10, 5);
        let (_, backed) = open(&chain, 3);
        assert_eq!(backed.head(), &chain.block(3).header);
        assert_eq!(backed.oracle_head(), &chain.block(3).header);
        assert_eq!(backed.safe(), &chain.block(3).header);
        assert_eq!(backed.chain_id(), 10);
    }

    #[test]
    fn test_insert_replays_block() {
        let chain = TestChain::new(10, 5);
        let (_, mut backed) = open(&chain, 3);

        let next = chain.block(4);
        backed.insert_block(&next).unwrap();
        assert!(backed.is_inserted(next.hash()));
        assert_eq!(backed.block(next.hash(), 4).unwrap(), Some(next.clone()));
        assert_eq!(backed.receipts_by_block_hash(next.hash()).unwrap(), chain.receipts(4));

        // Inserting does not move the head.
        assert_eq!(backed.head().number, 3);
        assert_eq!(backed.canonical_hash(4).unwrap(), None);
        backed.set_canonical(next.hash()).unwrap();
        assert_eq!(backed.canonical_hash(4).unwrap(), Some(next.hash()));
        assert_eq!(backed.canonical_hash(0).unwrap(), Some(chain.block(0).hash()));
    }

    #[test]
    fn test_insert_rejects_mismatched_block() {
        let chain = TestChain::new(10, 5);
        let (_, mut backed) = open(&chain, 3);

        let mut tampered = chain.block(4);
        let mut header = tampered.header.inner().clone();
        header.gas_used += 1;
        tampered.header = header.seal_slow();

        let err = backed.insert_block(&tampered).unwrap_err();
        assert!(matches!(
            err,
            ChainError::UnexpectedBlockHash { expected, actual }
                if expected == tampered.hash() && actual == chain.block(4).hash()
        ));
        assert!(!backed.is_inserted(tampered.hash()));
        assert!(!backed.is_inserted(chain.block(4).hash()));
    }

    #[test]
    fn test_block_above_oracle_head_requires_insertion() {
        let chain = TestChain::new(10, 5);
        let (stub, backed) = open(&chain, 3);

        let calls = stub.calls().block_by_hash;
        assert_eq!(backed.block(chain.block(4).hash(), 4).unwrap(), None);
        assert_eq!(stub.calls().block_by_hash, calls);

        assert_eq!(backed.block(chain.block(2).hash(), 2).unwrap(), Some(chain.block(2)));
        assert_eq!(backed.block(chain.block(2).hash(), 1).unwrap(), None);
    }

    #[test]
    fn test_build_block_stores_without_moving_head() {
        let chain = TestChain::new(10, 5);
        let (_, mut backed) = open(&chain, 3);

        let mut attributes = chain.attributes(4);
        attributes.transactions = Some(alloc::vec![bytes!("7e01")]);
        let block = backed.build_block(chain.block(3).hash(), &attributes).unwrap();
        assert_eq!(block.number(), 4);
        assert_eq!(block.transactions, alloc::vec![bytes!("7e01")]);
        assert_ne!(block.hash(), chain.block(4).hash());
        assert!(backed.is_inserted(block.hash()));
        assert_eq!(backed.head().number, 3);
    }

    #[test]
    fn test_execution_error() {
        let chain = TestChain::new(10, 5);
        let stub = StubL2Oracle::default();
        chain.register(&stub);
        let mut backed = OracleBackedChain::from_head(
            stub,
            FakeExecutor::failing("out of gas"),
            chain.config(),
            chain.block(3).header,
        );
        let err = backed.insert_block(&chain.block(4)).unwrap_err();
        assert!(matches!(err, ChainError::Execution(msg) if msg == "out of gas"));
    }

    #[test]
    fn test_isthmus_output_uses_withdrawals_root() {
        let chain = TestChain::new(10, 5);
        let (_, backed) = open(&chain, 3);
        let head = chain.block(3).header;
        assert_eq!(backed.output_at(&head).unwrap(), chain.output(3));

        let mut header = head.inner().clone();
        header.withdrawals_root = None;
        let sealed = header.seal_slow();
        assert!(matches!(
            backed.message_passer_storage_root(&sealed),
            Err(ChainError::InvalidHeader(hash)) if hash == sealed.seal()
        ));
    }

    #[test]
    fn test_pre_isthmus_output_reads_state() {
        let mut config = TestChain::default_config(10);
        config.isthmus_time = None;
        let chain = TestChain::from_config(config, 2);
        let (stub, backed) = open(&chain, 2);

        let output = backed.output_at(&chain.block(2).header).unwrap();
        assert_eq!(output.message_passer_storage_root, TestChain::MESSAGE_PASSER_STORAGE_ROOT);
        assert_eq!(output, chain.output(2));
        assert!(stub.hints().iter().any(|hint| hint.starts_with("l2-account-proof ")));

        let mut header = chain.block(2).header.inner().clone();
        header.state_root = B256::ZERO;
        assert!(backed.message_passer_storage_root(&header.seal_slow()).is_err());
    }

    #[test]
    fn test_payload_attributes_from_block() {
        let mut config = TestChain::default_config(10);
        config.holocene_time = Some(0);
        let chain = TestChain::from_config(config, 2);
        let block = chain.block(2);
        let attributes = payload_attributes_from_block(&block, &config);

        assert_eq!(attributes.payload_attributes.timestamp, block.timestamp());
        assert_eq!(attributes.payload_attributes.prev_randao, block.header.mix_hash);
        assert_eq!(attributes.payload_attributes.withdrawals, Some(Vec::new()));
        assert_eq!(attributes.transactions.as_deref(), Some(block.transactions.as_slice()));
        assert_eq!(attributes.no_tx_pool, Some(true));
        assert_eq!(attributes.gas_limit, Some(block.header.gas_limit));
        assert_eq!(
            attributes.eip_1559_params.map(|params| params.to_vec()),
            Some(block.header.extra_data[1..9].to_vec())
        );

        config.holocene_time = None;
        assert_eq!(payload_attributes_from_block(&block, &config).eip_1559_params, None);
    }
}
