//! Deposits-only replacement blocks.
//!
//! When an optimistic block carries an invalid cross-chain dependency, it is replaced by a block
//! on the same parent holding only its deposits, followed by a marker deposit that commits to the
//! output of the block being invalidated.

use crate::errors::ConsolidationError;
use alloc::{format, vec::Vec};
use alloy_eips::eip2718::{Decodable2718, Encodable2718};
use alloy_primitives::{address, keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_rpc_types_engine::{ForkchoiceState, PayloadStatusEnum};
use interlock_interop::OptimisticBlock;
use interlock_proof::{
    chain::{payload_attributes_from_block, BlockExecutor, OracleBackedChain},
    derivation::store_block_data,
    engine::{EngineController, OracleEngine},
    kv::KeyValueStore,
    l2::L2Oracle,
    L2Block, MemoryKv, OutputV0, RollupConfig,
};
use op_alloy_consensus::{OpTxEnvelope, TxDeposit};
use op_alloy_rpc_types_engine::OpPayloadAttributes;

/// The sender of the block-invalidated marker deposit.
pub const BLOCK_INVALIDATED_DEPOSITOR: Address =
    address!("deaddeaddeaddeaddeaddeaddeaddeaddead0002");

/// The source hash domain of the block-invalidated marker deposit.
pub const BLOCK_INVALIDATED_SOURCE_DOMAIN: u64 = 4;

/// The gas limit of the block-invalidated marker deposit.
pub const BLOCK_INVALIDATED_GAS_LIMIT: u64 = 36_000;

/// Returns the source hash of the marker deposit invalidating the block with `output_root`.
pub fn block_invalidated_source_hash(output_root: B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&U256::from(BLOCK_INVALIDATED_SOURCE_DOMAIN).to_be_bytes::<32>());
    buf[32..].copy_from_slice(output_root.as_slice());
    keccak256(buf)
}

/// Builds the marker deposit for the block committed to by `output`. Its input is the 128-byte
/// output preimage.
pub fn block_invalidated_deposit(output: &OutputV0) -> TxDeposit {
    TxDeposit {
        source_hash: block_invalidated_source_hash(output.root()),
        from: BLOCK_INVALIDATED_DEPOSITOR,
        to: TxKind::Call(Address::ZERO),
        mint: None,
        value: U256::ZERO,
        gas_limit: BLOCK_INVALIDATED_GAS_LIMIT,
        is_system_transaction: false,
        input: Bytes::copy_from_slice(&output.marshal()),
    }
}

/// Recovers the output of the invalidated block from the transactions of a replacement block. The
/// marker deposit is the last transaction.
pub fn invalidated_output(transactions: &[Bytes]) -> Result<OutputV0, ConsolidationError> {
    let last = transactions.last().ok_or(ConsolidationError::NotReplacement("no transactions"))?;
    let OpTxEnvelope::Deposit(deposit) = OpTxEnvelope::decode_2718(&mut last.as_ref())
        .map_err(|_| ConsolidationError::NotReplacement("undecodable last transaction"))?
    else {
        return Err(ConsolidationError::NotReplacement("last transaction is not a deposit"));
    };
    if deposit.from != BLOCK_INVALIDATED_DEPOSITOR {
        return Err(ConsolidationError::NotReplacement("unexpected depositor"));
    }
    OutputV0::unmarshal(&deposit.input)
        .map_err(|_| ConsolidationError::NotReplacement("invalid output preimage"))
}

/// Returns the attributes that rebuild `block` with only its deposits, followed by the marker
/// deposit for `output`.
pub fn deposits_only_attributes(
    block: &L2Block,
    config: &RollupConfig,
    output: &OutputV0,
) -> OpPayloadAttributes {
    let mut attributes = payload_attributes_from_block(block, config);
    let marker = OpTxEnvelope::Deposit(block_invalidated_deposit(output)).encoded_2718();
    attributes.transactions = Some(
        block.deposits().cloned().chain(core::iter::once(Bytes::from(marker))).collect::<Vec<_>>(),
    );
    attributes
}

/// Builds the deposits-only replacement of `optimistic` on a chain anchored at
/// `agreed_output_root`. The new header, its transaction and receipt tries and its output preimage
/// are written to `kv`.
///
/// # Panics
///
/// Panics if `optimistic` already holds nothing but deposits. Such a block cannot carry an invalid
/// dependency.
pub fn build_deposits_only_block<O, E>(
    oracle: O,
    executor: E,
    config: RollupConfig,
    agreed_output_root: B256,
    optimistic: &L2Block,
    kv: &MemoryKv,
) -> Result<OptimisticBlock, ConsolidationError>
where
    O: L2Oracle + Clone,
    E: BlockExecutor,
{
    assert!(
        !optimistic.is_deposits_only(),
        "block {} of chain {} holds only deposits and cannot be replaced",
        optimistic.hash(),
        config.l2_chain_id
    );

    let chain =
        OracleBackedChain::from_output_root(oracle, executor, config, agreed_output_root, kv.clone())?;
    let invalidated = chain.output_at(&optimistic.header)?;
    let attributes = deposits_only_attributes(optimistic, &config, &invalidated);
    let mut engine = OracleEngine::new(chain);
    let block = seal_on_parent(&mut engine, optimistic.header.parent_hash, attributes)?;

    let receipts = engine.chain().receipts_by_block_hash(block.hash())?;
    store_block_data(kv, &block, &receipts);
    let output = engine.l2_output_at_block_hash(block.hash())?;
    kv.insert_preimage(Bytes::copy_from_slice(&output.marshal()));

    info!(
        target: "consolidation",
        "Replaced block #{} ({}) of chain {} with deposits-only block {}",
        optimistic.number(),
        optimistic.hash(),
        config.l2_chain_id,
        block.hash()
    );
    Ok(block.optimistic(output.root()))
}

/// Builds a block from `attributes` on `parent` and makes it the unsafe, safe and finalized
/// head of `engine`.
fn seal_on_parent<O, E>(
    engine: &mut OracleEngine<O, E>,
    parent: B256,
    attributes: OpPayloadAttributes,
) -> Result<L2Block, ConsolidationError>
where
    O: L2Oracle + Clone,
    E: BlockExecutor,
{
    let updated = engine.forkchoice_updated(
        ForkchoiceState {
            head_block_hash: parent,
            safe_block_hash: parent,
            finalized_block_hash: parent,
        },
        Some(attributes),
    )?;
    if updated.payload_status.status != PayloadStatusEnum::Valid {
        return Err(ConsolidationError::PayloadRejected(format!(
            "forkchoice update on {parent}: {:?}",
            updated.payload_status.status
        )));
    }
    let payload_id = updated
        .payload_id
        .ok_or_else(|| ConsolidationError::PayloadRejected(format!("no payload on {parent}")))?;

    let block = engine.get_payload(payload_id)?;
    let status = engine.new_payload(block.clone())?;
    if status.status != PayloadStatusEnum::Valid {
        return Err(ConsolidationError::PayloadRejected(format!(
            "new payload {}: {:?}",
            block.hash(),
            status.status
        )));
    }
    engine.forkchoice_updated(
        ForkchoiceState {
            head_block_hash: block.hash(),
            safe_block_hash: block.hash(),
            finalized_block_hash: block.hash(),
        },
        None,
    )?;
    Ok(block)
}
