//! The single-chain derivation task: advance an [OracleEngine] to a target block through a
//! [Driver] and read back the output root.

use crate::{
    chain::{BlockExecutor, OracleBackedChain},
    engine::{EngineController, OracleEngine},
    errors::DerivationError,
    kv::KeyValueStore,
    l2::L2Oracle,
    L2Block, MemoryKv, RollupConfig,
};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::B256;
use alloy_rlp::BufMut;
use interlock_mpt::ordered_trie_with_encoder;
use op_alloy_consensus::OpReceiptEnvelope;
use op_alloy_protocol::BlockInfo;

/// Derives L2 blocks from L1 data and applies them through an [EngineController].
pub trait Driver {
    /// Advances the safe head of `engine` towards block `target`, reading L1 data no newer than
    /// `l1_head`. Returns the new safe head, which is below `target` if L1 data ran out.
    fn advance_to_target<C: EngineController>(
        &mut self,
        engine: &mut C,
        l1_head: B256,
        target: u64,
    ) -> Result<BlockInfo, DerivationError>;
}

/// The inputs of [run_derivation].
#[derive(Debug, Clone, Copy)]
pub struct DerivationRequest {
    /// The rollup config of the chain.
    pub config: RollupConfig,
    /// The L1 head the derivation may read up to.
    pub l1_head: B256,
    /// The output root of the agreed starting block.
    pub agreed_output_root: B256,
    /// The number of the block to derive.
    pub target_block: u64,
    /// Whether to store the preimages of the derived block in the key-value store.
    pub store_block_data: bool,
}

/// The result of [run_derivation].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationOutcome {
    /// The safe head after derivation.
    pub head: BlockInfo,
    /// The hash of the block the output root was taken at.
    pub block_hash: B256,
    /// The output root at `min(target_block, head.number)`.
    pub output_root: B256,
}

/// Derives the chain from the agreed output up to the target block and returns the resulting
/// output root. A target at or below the agreed block skips the driver and reads the output of
/// the agreed chain.
pub fn run_derivation<D, O, E>(
    driver: &mut D,
    oracle: O,
    executor: E,
    kv: MemoryKv,
    request: &DerivationRequest,
) -> Result<DerivationOutcome, DerivationError>
where
    D: Driver,
    O: L2Oracle + Clone,
    E: BlockExecutor,
{
    let chain = OracleBackedChain::from_output_root(
        oracle,
        executor,
        request.config,
        request.agreed_output_root,
        kv.clone(),
    )?;
    let agreed = chain.head().clone();
    let mut engine = OracleEngine::new(chain);

    let head = if request.target_block > agreed.number {
        info!(
            target: "derivation",
            "Deriving chain {} from #{} to #{}",
            request.config.l2_chain_id,
            agreed.number,
            request.target_block
        );
        driver.advance_to_target(&mut engine, request.l1_head, request.target_block)?
    } else {
        info!(
            target: "derivation",
            "Target #{} is not after agreed block #{}, skipping derivation",
            request.target_block,
            agreed.number
        );
        BlockInfo::new(agreed.seal(), agreed.number, agreed.parent_hash, agreed.timestamp)
    };

    if request.store_block_data {
        let block = engine.chain().block_by_hash(head.hash)?;
        let receipts = engine.chain().receipts_by_block_hash(head.hash)?;
        store_block_data(&kv, &block, &receipts);
    }

    let (block_hash, output_root) =
        engine.l2_output_root(request.target_block.min(head.number))?;
    info!(
        target: "derivation",
        "Derived safe head #{} ({}), output root {}",
        head.number,
        head.hash,
        output_root
    );
    Ok(DerivationOutcome { head, block_hash, output_root })
}

/// Stores the header, transaction trie and receipt trie of `block` in `kv` so that the block can
/// be read back through the preimage interface.
pub fn store_block_data<K: KeyValueStore>(kv: &K, block: &L2Block, receipts: &[OpReceiptEnvelope]) {
    kv.set(block.hash(), alloy_rlp::encode(block.header.inner()).into());

    let mut tx_trie = ordered_trie_with_encoder(&block.transactions, |tx, buf| buf.put_slice(tx));
    let mut receipt_trie =
        ordered_trie_with_encoder(receipts, |receipt, buf| receipt.encode_2718(buf));
    tx_trie.root();
    receipt_trie.root();

    for node in tx_trie
        .take_proof_nodes()
        .into_inner()
        .into_values()
        .chain(receipt_trie.take_proof_nodes().into_inner().into_values())
    {
        kv.insert_preimage(node);
    }
}
