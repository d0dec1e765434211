//! In-memory fixtures: a preimage client, a stub [L2Oracle], a deterministic [BlockExecutor],
//! chain builders and a driver replaying queued payload attributes.

use crate::{
    block::transactions_root,
    canonical::{CanonicalSource, HISTORY_SERVE_WINDOW, HISTORY_STORAGE_ADDRESS},
    chain::{BlockExecutor, ExecutionOutcome},
    derivation::{store_block_data, Driver},
    engine::{BlockLabel, EngineController},
    errors::{DerivationError, OracleProviderError},
    kv::KeyValueStore,
    l2::{L2Oracle, L2_TO_L1_MESSAGE_PASSER_ADDRESS},
    ChainGenesis, L2Block, MemoryKv, OracleBackedDb, OutputV0, RollupConfig, StateDatabase,
};
use alloc::{
    collections::{BTreeMap, VecDeque},
    string::{String, ToString},
    sync::Arc,
    vec,
    vec::Vec,
};
use alloy_consensus::{Eip658Value, Header, Receipt, ReceiptWithBloom, Sealed};
use alloy_eips::{eip2718::Encodable2718, BlockNumHash};
use alloy_primitives::{
    keccak256, Address, Bloom, Bytes, Log, Sealable, TxKind, B256, B64, U256,
};
use alloy_rlp::Decodable;
use alloy_rpc_types_engine::{ForkchoiceState, PayloadAttributes, PayloadStatusEnum};
use alloy_trie::EMPTY_ROOT_HASH;
use core::cell::{Cell, RefCell};
use interlock_interop::TransitionState;
use interlock_mpt::{
    ordered_trie_with_encoder,
    test_util::{build_state_trie, build_storage_trie},
    TrieAccount, TrieNode, TrieProvider,
};
use interlock_preimage::{
    errors::{PreimageOracleError, PreimageOracleResult},
    HintWriterClient, PreimageKey, PreimageOracleClient,
};
use op_alloy_consensus::{
    OpDepositReceipt, OpDepositReceiptWithBloom, OpReceiptEnvelope, OpTxEnvelope, OpTxType,
    TxDeposit,
};
use op_alloy_protocol::BlockInfo;
use op_alloy_rpc_types_engine::OpPayloadAttributes;
use spin::Mutex;

/// Gas charged by [FakeExecutor] for every non-deposit transaction.
pub const FAKE_TX_GAS: u64 = 21_000;

/// The gas limit of [TestChain] blocks.
pub const TEST_GAS_LIMIT: u64 = 30_000_000;

#[derive(Debug, Default)]
struct ClientState {
    preimages: BTreeMap<PreimageKey, Vec<u8>>,
    hints: Vec<String>,
    fail_hints: bool,
}

/// A preimage client serving values from memory. Clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreimageClient {
    inner: Arc<Mutex<ClientState>>,
}

impl MemoryPreimageClient {
    /// Stores `value` under its keccak256 key and returns the hash.
    pub fn insert_keccak(&self, value: Vec<u8>) -> B256 {
        let hash = keccak256(&value);
        self.inner.lock().preimages.insert(PreimageKey::new_keccak256(*hash), value);
        hash
    }

    /// Stores `value` under a local key.
    pub fn insert_local(&self, ident: u64, value: Vec<u8>) {
        self.inner.lock().preimages.insert(PreimageKey::new_local(ident), value);
    }

    /// Returns every hint received so far.
    pub fn hints(&self) -> Vec<String> {
        self.inner.lock().hints.clone()
    }

    /// Makes every following hint fail.
    pub fn fail_hints(&self) {
        self.inner.lock().fail_hints = true;
    }
}

impl PreimageOracleClient for MemoryPreimageClient {
    fn get(&self, key: PreimageKey) -> PreimageOracleResult<Vec<u8>> {
        self.inner.lock().preimages.get(&key).cloned().ok_or(PreimageOracleError::KeyNotFound)
    }

    fn get_exact(&self, key: PreimageKey, buf: &mut [u8]) -> PreimageOracleResult<()> {
        let value = PreimageOracleClient::get(self, key)?;
        if value.len() != buf.len() {
            return Err(PreimageOracleError::BufferLengthMismatch(buf.len(), value.len()));
        }
        buf.copy_from_slice(&value);
        Ok(())
    }
}

impl HintWriterClient for MemoryPreimageClient {
    fn write(&self, hint: &str) -> PreimageOracleResult<()> {
        let mut state = self.inner.lock();
        if state.fail_hints {
            return Err(PreimageOracleError::Other("hint rejected".to_string()));
        }
        state.hints.push(hint.to_string());
        Ok(())
    }
}

impl KeyValueStore for MemoryPreimageClient {
    fn get(&self, key: B256) -> Option<Bytes> {
        self.inner.lock().preimages.get(&PreimageKey::new_keccak256(*key)).cloned().map(Into::into)
    }

    fn set(&self, key: B256, value: Bytes) {
        self.inner.lock().preimages.insert(PreimageKey::new_keccak256(*key), value.to_vec());
    }
}

/// Number of calls made to each [StubL2Oracle] method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleCalls {
    /// Calls to [L2Oracle::block_by_hash].
    pub block_by_hash: usize,
    /// Calls to [L2Oracle::receipts_by_block_hash].
    pub receipts_by_block_hash: usize,
    /// Calls to [L2Oracle::node_by_hash].
    pub node_by_hash: usize,
    /// Calls to [L2Oracle::code_by_hash].
    pub code_by_hash: usize,
    /// Calls to [L2Oracle::output_by_root].
    pub output_by_root: usize,
    /// Calls to [L2Oracle::block_data_by_hash].
    pub block_data_by_hash: usize,
    /// Calls to [L2Oracle::transition_state_by_root].
    pub transition_state_by_root: usize,
}

#[derive(Debug, Default)]
struct StubState {
    blocks: BTreeMap<B256, L2Block>,
    receipts: BTreeMap<B256, Vec<OpReceiptEnvelope>>,
    nodes: BTreeMap<B256, Bytes>,
    codes: BTreeMap<B256, Bytes>,
    outputs: BTreeMap<B256, OutputV0>,
    transition_states: BTreeMap<B256, TransitionState>,
    calls: OracleCalls,
    hints: Vec<String>,
}

/// An [L2Oracle] serving typed values from memory and counting calls. Clones share the same
/// values.
#[derive(Debug, Clone, Default)]
pub struct StubL2Oracle {
    inner: Arc<Mutex<StubState>>,
}

impl StubL2Oracle {
    /// Stores a block.
    pub fn insert_block(&self, block: L2Block) {
        self.inner.lock().blocks.insert(block.hash(), block);
    }

    /// Stores the receipts of a block.
    pub fn insert_receipts(&self, block_hash: B256, receipts: Vec<OpReceiptEnvelope>) {
        self.inner.lock().receipts.insert(block_hash, receipts);
    }

    /// Stores a trie node and returns its hash.
    pub fn insert_node(&self, node: Bytes) -> B256 {
        let hash = keccak256(&node);
        self.inner.lock().nodes.insert(hash, node);
        hash
    }

    /// Stores contract code and returns its hash.
    pub fn insert_code(&self, code: Bytes) -> B256 {
        let hash = keccak256(&code);
        self.inner.lock().codes.insert(hash, code);
        hash
    }

    /// Stores an output and returns its root.
    pub fn insert_output(&self, output: OutputV0) -> B256 {
        let root = output.root();
        self.inner.lock().outputs.insert(root, output);
        root
    }

    /// Stores a transition state and returns its hash.
    pub fn insert_transition_state(&self, state: TransitionState) -> B256 {
        let root = state.hash();
        self.inner.lock().transition_states.insert(root, state);
        root
    }

    /// Returns the call counts so far.
    pub fn calls(&self) -> OracleCalls {
        self.inner.lock().calls
    }

    /// Returns every hint received so far.
    pub fn hints(&self) -> Vec<String> {
        self.inner.lock().hints.clone()
    }
}

impl L2Oracle for StubL2Oracle {
    fn block_by_hash(&self, block_hash: B256, _: u64) -> Result<L2Block, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.block_by_hash += 1;
        state.blocks.get(&block_hash).cloned().ok_or(OracleProviderError::NotFound(block_hash))
    }

    fn receipts_by_block_hash(
        &self,
        block_hash: B256,
        _: u64,
    ) -> Result<Vec<OpReceiptEnvelope>, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.receipts_by_block_hash += 1;
        state.receipts.get(&block_hash).cloned().ok_or(OracleProviderError::NotFound(block_hash))
    }

    fn node_by_hash(&self, node_hash: B256, _: u64) -> Result<Bytes, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.node_by_hash += 1;
        state.nodes.get(&node_hash).cloned().ok_or(OracleProviderError::NotFound(node_hash))
    }

    fn code_by_hash(&self, code_hash: B256, _: u64) -> Result<Bytes, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.code_by_hash += 1;
        state.codes.get(&code_hash).cloned().ok_or(OracleProviderError::NotFound(code_hash))
    }

    fn output_by_root(&self, output_root: B256, _: u64) -> Result<OutputV0, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.output_by_root += 1;
        state.outputs.get(&output_root).copied().ok_or(OracleProviderError::NotFound(output_root))
    }

    fn block_data_by_hash(
        &self,
        _: B256,
        block_hash: B256,
        _: u64,
    ) -> Result<L2Block, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.block_data_by_hash += 1;
        state.blocks.get(&block_hash).cloned().ok_or(OracleProviderError::NotFound(block_hash))
    }

    fn transition_state_by_root(&self, root: B256) -> Result<TransitionState, OracleProviderError> {
        let mut state = self.inner.lock();
        state.calls.transition_state_by_root += 1;
        state.transition_states.get(&root).cloned().ok_or(OracleProviderError::NotFound(root))
    }

    fn hint(&self, hint: &str) {
        self.inner.lock().hints.push(hint.to_string());
    }
}

/// A [BlockExecutor] that derives the header from the attributes without touching state. Every
/// non-deposit transaction whose payload RLP-decodes as a list of logs emits those logs.
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    failure: Option<String>,
}

impl FakeExecutor {
    /// Creates an executor that fails every payload with `message`.
    pub fn failing(message: &str) -> Self {
        Self { failure: Some(message.to_string()) }
    }
}

impl BlockExecutor for FakeExecutor {
    type Error = String;

    fn execute_payload<S: StateDatabase>(
        &mut self,
        _: &S,
        parent: &Sealed<Header>,
        attributes: &OpPayloadAttributes,
    ) -> Result<ExecutionOutcome, Self::Error> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let transactions = attributes.transactions.clone().unwrap_or_default();
        let mut receipts = Vec::with_capacity(transactions.len());
        let mut gas_used = 0u64;
        for tx in &transactions {
            if tx.first() == Some(&(OpTxType::Deposit as u8)) {
                receipts.push(deposit_receipt(gas_used));
            } else {
                gas_used += FAKE_TX_GAS;
                let logs = Vec::<Log>::decode(&mut tx.get(1..).unwrap_or_default()).unwrap_or_default();
                receipts.push(receipt_at(gas_used, logs));
            }
        }

        let attrs = &attributes.payload_attributes;
        let mut extra_data = Vec::new();
        if let Some(params) = attributes.eip_1559_params {
            extra_data.push(0);
            extra_data.extend_from_slice(params.as_slice());
        }
        let header = Header {
            parent_hash: parent.seal(),
            beneficiary: attrs.suggested_fee_recipient,
            state_root: parent.state_root,
            transactions_root: transactions_root(&transactions),
            receipts_root: receipts_root(&receipts),
            logs_bloom: logs_bloom(receipts.iter().flat_map(|r| r.logs())),
            number: parent.number + 1,
            gas_limit: attributes.gas_limit.unwrap_or(parent.gas_limit),
            gas_used,
            timestamp: attrs.timestamp,
            extra_data: extra_data.into(),
            mix_hash: attrs.prev_randao,
            withdrawals_root: attrs
                .withdrawals
                .as_ref()
                .map(|_| parent.withdrawals_root.unwrap_or(EMPTY_ROOT_HASH)),
            parent_beacon_block_root: attrs.parent_beacon_block_root,
            ..Default::default()
        };
        Ok(ExecutionOutcome { header, receipts })
    }
}

fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        bloom.m3_2048(log.address.as_slice());
        for topic in log.topics() {
            bloom.m3_2048(topic.as_slice());
        }
    }
    bloom
}

fn receipts_root(receipts: &[OpReceiptEnvelope]) -> B256 {
    ordered_trie_with_encoder(receipts, |receipt, buf| receipt.encode_2718(buf)).root()
}

fn deposit_receipt(cumulative_gas_used: u64) -> OpReceiptEnvelope {
    OpReceiptEnvelope::Deposit(OpDepositReceiptWithBloom {
        receipt: OpDepositReceipt {
            inner: Receipt {
                status: Eip658Value::Eip658(true),
                cumulative_gas_used: cumulative_gas_used as u128,
                logs: Vec::new(),
            },
            deposit_nonce: None,
            deposit_receipt_version: None,
        },
        logs_bloom: Bloom::ZERO,
    })
}

fn receipt_at(cumulative_gas_used: u64, logs: Vec<Log>) -> OpReceiptEnvelope {
    let logs_bloom = logs_bloom(&logs);
    OpReceiptEnvelope::Eip1559(ReceiptWithBloom {
        receipt: Receipt {
            status: Eip658Value::Eip658(true),
            cumulative_gas_used: cumulative_gas_used as u128,
            logs,
        },
        logs_bloom,
    })
}

/// Returns a successful EIP-1559 receipt emitting `logs`.
pub fn receipt_with_logs(logs: Vec<Log>) -> OpReceiptEnvelope {
    receipt_at(FAKE_TX_GAS, logs)
}

/// Returns a header committing to `transactions`.
pub fn header_with_transactions(transactions: &[Bytes]) -> Header {
    Header { number: 1, transactions_root: transactions_root(transactions), ..Default::default() }
}

/// Encodes a non-deposit transaction that makes [FakeExecutor] emit `logs`.
pub fn user_transaction(logs: &[Log]) -> Bytes {
    let mut tx = vec![OpTxType::Eip1559 as u8];
    tx.extend_from_slice(&alloy_rlp::encode(logs.to_vec()));
    tx.into()
}

/// Encodes a deposit transaction unique to `(chain_id, number)`.
pub fn deposit_transaction(chain_id: u64, number: u64) -> Bytes {
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&chain_id.to_be_bytes());
    seed[8..].copy_from_slice(&number.to_be_bytes());
    let deposit = TxDeposit {
        source_hash: keccak256(seed),
        from: Address::repeat_byte(0xde),
        to: TxKind::Call(Address::repeat_byte(0x15)),
        gas_limit: 1_000_000,
        ..Default::default()
    };
    OpTxEnvelope::Deposit(deposit).encoded_2718().into()
}

/// A linear chain built with [FakeExecutor], with the preimages needed to serve it.
#[derive(Debug, Clone)]
pub struct TestChain {
    config: RollupConfig,
    blocks: Vec<L2Block>,
    receipts: Vec<Vec<OpReceiptEnvelope>>,
    state_nodes: BTreeMap<B256, Bytes>,
}

/// Builds a [TestChain].
#[derive(Debug, Clone)]
pub struct TestChainBuilder {
    config: RollupConfig,
    length: u64,
    logs: BTreeMap<u64, Vec<Vec<Log>>>,
}

impl TestChainBuilder {
    /// Sets the number of the head block.
    pub const fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    /// Adds a user transaction emitting `logs` to block `number`. Blocks without user
    /// transactions get a single one emitting nothing.
    pub fn user_tx(mut self, number: u64, logs: Vec<Log>) -> Self {
        self.logs.entry(number).or_default().push(logs);
        self
    }

    /// Builds the chain.
    pub fn build(self) -> TestChain {
        let mut config = self.config;
        let chain_id = config.l2_chain_id;

        // Before Isthmus the output reads the message passer storage root from state. Blocks
        // inherit the parent's state root, which never holds the history contract.
        let isthmus = config.is_isthmus_active(config.genesis.l2_time);
        let account = TrieAccount {
            storage_root: TestChain::MESSAGE_PASSER_STORAGE_ROOT,
            code_hash: keccak256([]),
            ..Default::default()
        };
        let (state_root, state_nodes) =
            build_state_trie(&[(L2_TO_L1_MESSAGE_PASSER_ADDRESS, account)]);
        let genesis = Header {
            state_root,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            number: 0,
            timestamp: config.genesis.l2_time,
            gas_limit: TEST_GAS_LIMIT,
            mix_hash: keccak256(chain_id.to_be_bytes()),
            withdrawals_root: isthmus.then_some(TestChain::MESSAGE_PASSER_STORAGE_ROOT),
            ..Default::default()
        }
        .seal_slow();
        config.genesis.l2 = BlockNumHash { number: 0, hash: genesis.seal() };

        let db = OracleBackedDb::new(StubL2Oracle::default(), MemoryKv::default(), chain_id);
        let mut executor = FakeExecutor::default();
        let mut blocks = vec![L2Block::new(genesis, Vec::new())];
        let mut receipts = vec![Vec::new()];
        for number in 1..=self.length {
            let parent = &blocks[blocks.len() - 1].header;
            let mut transactions = vec![deposit_transaction(chain_id, number)];
            match self.logs.get(&number) {
                Some(txs) => transactions.extend(txs.iter().map(|logs| user_transaction(logs))),
                None => transactions.push(user_transaction(&[])),
            }

            let timestamp = parent.timestamp + config.block_time;
            let attributes = OpPayloadAttributes {
                payload_attributes: PayloadAttributes {
                    timestamp,
                    prev_randao: keccak256([chain_id.to_be_bytes(), number.to_be_bytes()].concat()),
                    suggested_fee_recipient: Address::repeat_byte(0xfe),
                    withdrawals: parent.withdrawals_root.map(|_| Vec::new()),
                    parent_beacon_block_root: Some(keccak256(number.to_be_bytes())),
                },
                transactions: Some(transactions.clone()),
                no_tx_pool: Some(true),
                gas_limit: Some(TEST_GAS_LIMIT),
                eip_1559_params: config
                    .is_holocene_active(timestamp)
                    .then_some(B64::new([0, 0, 0, 250, 0, 0, 0, 6])),
            };
            let outcome = match executor.execute_payload(&db, parent, &attributes) {
                Ok(outcome) => outcome,
                Err(err) => panic!("fake execution failed: {err}"),
            };
            blocks.push(L2Block::new(outcome.header.seal_slow(), transactions));
            receipts.push(outcome.receipts);
        }

        TestChain { config, blocks, receipts, state_nodes }
    }
}

impl TestChain {
    /// The storage root of the `L2ToL1MessagePasser` in every [TestChain] state.
    pub const MESSAGE_PASSER_STORAGE_ROOT: B256 = B256::repeat_byte(0x16);

    /// The L2 genesis timestamp of [TestChain::default_config].
    pub const GENESIS_TIME: u64 = 1_000;

    /// Returns a config with one-second blocks and both Isthmus and interop active from genesis.
    pub fn default_config(chain_id: u64) -> RollupConfig {
        RollupConfig {
            genesis: ChainGenesis { l2_time: Self::GENESIS_TIME, ..Default::default() },
            block_time: 1,
            l2_chain_id: chain_id,
            isthmus_time: Some(0),
            interop_time: Some(0),
            ..Default::default()
        }
    }

    /// Builds a chain of `length + 1` blocks with the default config.
    pub fn new(chain_id: u64, length: u64) -> Self {
        Self::builder(Self::default_config(chain_id)).length(length).build()
    }

    /// Builds a chain of `length + 1` blocks with `config`.
    pub fn from_config(config: RollupConfig, length: u64) -> Self {
        Self::builder(config).length(length).build()
    }

    /// Returns a builder for a chain with `config`.
    pub const fn builder(config: RollupConfig) -> TestChainBuilder {
        TestChainBuilder { config, length: 0, logs: BTreeMap::new() }
    }

    /// Returns the rollup config, with the genesis block hash filled in.
    pub const fn config(&self) -> RollupConfig {
        self.config
    }

    /// Returns block `number`.
    pub fn block(&self, number: u64) -> L2Block {
        self.blocks[number as usize].clone()
    }

    /// Returns the head block.
    pub fn head(&self) -> L2Block {
        self.blocks[self.blocks.len() - 1].clone()
    }

    /// Returns the receipts of block `number`.
    pub fn receipts(&self, number: u64) -> Vec<OpReceiptEnvelope> {
        self.receipts[number as usize].clone()
    }

    /// Returns the output after block `number`.
    pub fn output(&self, number: u64) -> OutputV0 {
        let header = &self.blocks[number as usize].header;
        let storage_root = if self.config.is_isthmus_active(header.timestamp) {
            header.withdrawals_root.unwrap_or_default()
        } else {
            Self::MESSAGE_PASSER_STORAGE_ROOT
        };
        OutputV0::new(header.state_root, storage_root, header.seal())
    }

    /// Returns the attributes that rebuild block `number` on its parent.
    pub fn attributes(&self, number: u64) -> OpPayloadAttributes {
        crate::chain::payload_attributes_from_block(&self.block(number), &self.config)
    }

    /// Serves every block, receipt list, output and state node from `stub`.
    pub fn register(&self, stub: &StubL2Oracle) {
        for (block, receipts) in self.blocks.iter().zip(&self.receipts) {
            stub.insert_block(block.clone());
            stub.insert_receipts(block.hash(), receipts.clone());
            stub.insert_output(self.output(block.number()));
        }
        for node in self.state_nodes.values() {
            stub.insert_node(node.clone());
        }
    }

    /// Serves every header, transaction, receipt, output and state node as raw preimages.
    pub fn register_preimages(&self, client: &MemoryPreimageClient) {
        for (block, receipts) in self.blocks.iter().zip(&self.receipts) {
            store_block_data(client, block, receipts);
            client.insert_keccak(self.output(block.number()).marshal().to_vec());
        }
        for node in self.state_nodes.values() {
            client.insert_keccak(node.to_vec());
        }
    }
}

/// A [Driver] that applies queued payload attributes one block at a time, as if each were
/// derived from L1. Running out of attributes behaves like reaching the end of L1 data.
#[derive(Debug, Default)]
pub struct AttributesDriver {
    queue: VecDeque<OpPayloadAttributes>,
    failure: Option<String>,
    calls: usize,
}

impl AttributesDriver {
    /// Creates a driver applying `attributes` in order.
    pub fn new(attributes: impl IntoIterator<Item = OpPayloadAttributes>) -> Self {
        Self { queue: attributes.into_iter().collect(), ..Default::default() }
    }

    /// Creates a driver that fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self { failure: Some(message.to_string()), ..Default::default() }
    }

    /// Queues more attributes.
    pub fn push(&mut self, attributes: OpPayloadAttributes) {
        self.queue.push_back(attributes);
    }

    /// Returns the number of times the driver was run.
    pub const fn calls(&self) -> usize {
        self.calls
    }
}

impl Driver for AttributesDriver {
    fn advance_to_target<C: EngineController>(
        &mut self,
        engine: &mut C,
        _: B256,
        target: u64,
    ) -> Result<BlockInfo, DerivationError> {
        self.calls += 1;
        if let Some(failure) = &self.failure {
            return Err(DerivationError::Driver(failure.clone()));
        }

        loop {
            let head = engine.l2_block_ref_by_label(BlockLabel::Unsafe)?;
            if head.number >= target {
                break;
            }
            let Some(attributes) = self.queue.pop_front() else {
                break;
            };

            let state = ForkchoiceState {
                head_block_hash: head.hash,
                safe_block_hash: head.hash,
                finalized_block_hash: B256::ZERO,
            };
            let payload_id = engine
                .forkchoice_updated(state, Some(attributes))?
                .payload_id
                .ok_or_else(|| DerivationError::Driver("no payload started".to_string()))?;
            let block = engine.get_payload(payload_id)?;
            let status = engine.new_payload(block.clone())?;
            if !matches!(status.status, PayloadStatusEnum::Valid) {
                return Err(DerivationError::Driver(alloc::format!(
                    "payload {} rejected: {:?}",
                    block.hash(),
                    status.status
                )));
            }

            let state = ForkchoiceState {
                head_block_hash: block.hash(),
                safe_block_hash: block.hash(),
                finalized_block_hash: B256::ZERO,
            };
            engine.forkchoice_updated(state, None)?;
        }
        Ok(engine.l2_block_ref_by_label(BlockLabel::Safe)?)
    }
}

/// A chain whose blocks carry the EIP-2935 history contract in their state, for testing the
/// canonical indices.
#[derive(Debug)]
pub struct HistoryChain {
    config: RollupConfig,
    main: Vec<Sealed<Header>>,
    fork_at: u64,
    fork: Vec<Sealed<Header>>,
    by_hash: BTreeMap<B256, Sealed<Header>>,
    nodes: BTreeMap<B256, Bytes>,
    lookups: Cell<usize>,
    history_hints: RefCell<Vec<(u64, B256)>>,
}

/// Builds a [HistoryChain].
#[derive(Debug, Clone, Default)]
pub struct HistoryChainBuilder {
    length: u64,
    isthmus_time: Option<u64>,
    window: Option<u64>,
    fork: Option<(u64, u64)>,
    state_at: Option<Vec<u64>>,
}

impl HistoryChainBuilder {
    /// Sets the number of the head block.
    pub const fn length(mut self, length: u64) -> Self {
        self.length = length;
        self
    }

    /// Activates the history contract at `time`. Block timestamps equal block numbers.
    pub const fn isthmus_time(mut self, time: u64) -> Self {
        self.isthmus_time = Some(time);
        self
    }

    /// Sets the ring buffer size of the history contract.
    pub const fn window(mut self, window: u64) -> Self {
        self.window = Some(window);
        self
    }

    /// Adds a fork branching off after block `at` with its head at `head`.
    pub const fn fork_at(mut self, at: u64, head: u64) -> Self {
        self.fork = Some((at, head));
        self
    }

    /// Only gives the listed blocks a state holding the history contract.
    pub fn state_at(mut self, numbers: &[u64]) -> Self {
        self.state_at = Some(numbers.to_vec());
        self
    }

    /// Builds the chain.
    pub fn build(self) -> HistoryChain {
        let config = RollupConfig { isthmus_time: self.isthmus_time, ..Default::default() };
        let window = self.window.unwrap_or(HISTORY_SERVE_WINDOW);
        let mut nodes = BTreeMap::new();

        let mut extend = |ancestors: &[Sealed<Header>], upto: u64, marker: u8| {
            let mut branch = ancestors.to_vec();
            let mut built = Vec::new();
            while (branch.len() as u64) <= upto {
                let number = branch.len() as u64;
                let state_root = self.history_state(&config, window, &branch, number, &mut nodes);
                let header = Header {
                    parent_hash: branch.last().map(|h| h.seal()).unwrap_or_default(),
                    number,
                    timestamp: number,
                    state_root,
                    extra_data: Bytes::from(vec![marker]),
                    ..Default::default()
                }
                .seal_slow();
                branch.push(header.clone());
                built.push(header);
            }
            built
        };

        let main = extend(&[], self.length, 0);
        let (fork_at, fork) = match self.fork {
            Some((at, head)) => (at, extend(&main[..=at as usize], head, 1)),
            None => (self.length, Vec::new()),
        };

        let by_hash = main.iter().chain(&fork).map(|h| (h.seal(), h.clone())).collect();
        HistoryChain {
            config,
            main,
            fork_at,
            fork,
            by_hash,
            nodes,
            lookups: Cell::new(0),
            history_hints: RefCell::new(Vec::new()),
        }
    }

    /// Returns the state root of block `number` built on `ancestors`, storing its trie nodes.
    fn history_state(
        &self,
        config: &RollupConfig,
        window: u64,
        ancestors: &[Sealed<Header>],
        number: u64,
        nodes: &mut BTreeMap<B256, Bytes>,
    ) -> B256 {
        let Some(activation) = self.isthmus_time else { return B256::ZERO };
        if !config.is_isthmus_active(number) {
            return B256::ZERO;
        }
        if self.state_at.as_ref().is_some_and(|at| !at.contains(&number)) {
            return B256::ZERO;
        }

        // The first active block stores its parent's hash.
        let start = activation.saturating_sub(1).max(number.saturating_sub(window));
        let slots = (start..number)
            .map(|n| {
                (U256::from(n % window), U256::from_be_bytes(ancestors[n as usize].seal().0))
            })
            .collect::<Vec<_>>();
        let (storage_root, storage_nodes) = build_storage_trie(&slots);
        let account = TrieAccount { storage_root, code_hash: keccak256([]), ..Default::default() };
        let (state_root, state_nodes) = build_state_trie(&[(HISTORY_STORAGE_ADDRESS, account)]);
        nodes.extend(storage_nodes);
        nodes.extend(state_nodes);
        state_root
    }
}

impl HistoryChain {
    /// Returns a builder for a chain with only a genesis block.
    pub fn builder() -> HistoryChainBuilder {
        HistoryChainBuilder::default()
    }

    /// Returns the rollup config of the chain.
    pub const fn config(&self) -> RollupConfig {
        self.config
    }

    /// Returns main chain block `number`.
    pub fn header(&self, number: u64) -> Sealed<Header> {
        self.main[number as usize].clone()
    }

    /// Returns block `number` of the fork, which shares the main chain up to the fork point.
    pub fn fork_header(&self, number: u64) -> Sealed<Header> {
        if number <= self.fork_at {
            return self.header(number);
        }
        self.fork[(number - self.fork_at - 1) as usize].clone()
    }

    /// Returns the head of the fork, if there is one.
    pub fn fork_head(&self) -> Option<Sealed<Header>> {
        self.fork.last().cloned()
    }

    /// Returns the number of headers fetched by hash.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    /// Returns every `(number, head hash)` history lookup hinted.
    pub fn history_hints(&self) -> Vec<(u64, B256)> {
        self.history_hints.borrow().clone()
    }
}

impl TrieProvider for HistoryChain {
    type Error = OracleProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        let raw = self.nodes.get(&key).ok_or(OracleProviderError::NotFound(key))?;
        TrieNode::decode(&mut raw.as_ref()).map_err(OracleProviderError::Rlp)
    }
}

impl CanonicalSource for HistoryChain {
    fn header_by_hash(&self, hash: B256) -> Result<Sealed<Header>, OracleProviderError> {
        self.lookups.set(self.lookups.get() + 1);
        self.by_hash.get(&hash).cloned().ok_or(OracleProviderError::NotFound(hash))
    }

    fn hint_block_hash_lookup(&self, block_number: u64, head_hash: B256) {
        self.history_hints.borrow_mut().push((block_number, head_hash));
    }
}
