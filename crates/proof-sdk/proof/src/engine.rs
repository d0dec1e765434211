//! An in-process execution engine over an [OracleBackedChain], exposing the engine API calls the
//! derivation driver issues.

use crate::{
    chain::{BlockExecutor, OracleBackedChain},
    errors::{ChainError, EngineError},
    l2::L2Oracle,
    L2Block, OutputV0,
};
use alloc::{collections::BTreeMap, string::ToString};
use alloy_primitives::{B256, B64};
use alloy_rpc_types_engine::{
    ForkchoiceState, ForkchoiceUpdated, PayloadId, PayloadStatus, PayloadStatusEnum,
};
use op_alloy_protocol::BlockInfo;
use op_alloy_rpc_types_engine::OpPayloadAttributes;

/// A named head of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLabel {
    /// The canonical head.
    Unsafe,
    /// The safe head.
    Safe,
    /// The finalized head.
    Finalized,
}

/// The engine API subset used to drive the chain forward.
pub trait EngineController {
    /// Updates the forkchoice and optionally starts building a payload on the new head.
    fn forkchoice_updated(
        &mut self,
        state: ForkchoiceState,
        attributes: Option<OpPayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineError>;

    /// Returns the payload built under `payload_id`.
    fn get_payload(&mut self, payload_id: PayloadId) -> Result<L2Block, EngineError>;

    /// Validates and stores `block` without making it canonical.
    fn new_payload(&mut self, block: L2Block) -> Result<PayloadStatus, EngineError>;

    /// Returns the block carrying `label`.
    fn l2_block_ref_by_label(&mut self, label: BlockLabel) -> Result<BlockInfo, EngineError>;
}

/// An [EngineController] that executes blocks in process.
#[derive(Debug)]
pub struct OracleEngine<O, E> {
    chain: OracleBackedChain<O, E>,
    payloads: BTreeMap<B64, L2Block>,
    next_payload_id: u64,
}

impl<O, E> OracleEngine<O, E>
where
    O: L2Oracle + Clone,
    E: BlockExecutor,
{
    /// Creates a new [OracleEngine] over `chain`.
    pub const fn new(chain: OracleBackedChain<O, E>) -> Self {
        Self { chain, payloads: BTreeMap::new(), next_payload_id: 0 }
    }

    /// Returns the underlying chain.
    pub const fn chain(&self) -> &OracleBackedChain<O, E> {
        &self.chain
    }

    /// Returns the underlying chain mutably.
    pub fn chain_mut(&mut self) -> &mut OracleBackedChain<O, E> {
        &mut self.chain
    }

    /// Consumes the engine, returning the chain.
    pub fn into_chain(self) -> OracleBackedChain<O, E> {
        self.chain
    }

    /// Returns the hash and output root of the canonical block at `number`.
    pub fn l2_output_root(&mut self, number: u64) -> Result<(B256, B256), EngineError> {
        let header = self
            .chain
            .header_by_number(number)?
            .ok_or(EngineError::BlockNumberNotFound(number))?;
        let output = self.chain.output_at(&header)?;
        Ok((header.seal(), output.root()))
    }

    /// Returns the output committed to after the block with the given hash.
    pub fn l2_output_at_block_hash(&self, hash: B256) -> Result<OutputV0, EngineError> {
        let header = self.chain.header_by_hash(hash)?;
        Ok(self.chain.output_at(&header)?)
    }

    /// Returns the [BlockInfo] of the block with the given hash.
    pub fn l2_block_ref_by_hash(&self, hash: B256) -> Result<BlockInfo, EngineError> {
        Ok(self.chain.block_by_hash(hash)?.block_info())
    }

    /// Returns the [BlockInfo] of the canonical block at `number`.
    pub fn l2_block_ref_by_number(&mut self, number: u64) -> Result<BlockInfo, EngineError> {
        let header = self
            .chain
            .header_by_number(number)?
            .ok_or(EngineError::BlockNumberNotFound(number))?;
        Ok(BlockInfo::new(header.seal(), header.number, header.parent_hash, header.timestamp))
    }

    fn next_payload_id(&mut self) -> PayloadId {
        self.next_payload_id += 1;
        PayloadId::new(self.next_payload_id.to_be_bytes())
    }
}

impl<O, E> EngineController for OracleEngine<O, E>
where
    O: L2Oracle + Clone,
    E: BlockExecutor,
{
    fn forkchoice_updated(
        &mut self,
        state: ForkchoiceState,
        attributes: Option<OpPayloadAttributes>,
    ) -> Result<ForkchoiceUpdated, EngineError> {
        let head = match self.chain.block_by_hash(state.head_block_hash) {
            Ok(head) => head,
            Err(err) => {
                debug!(
                    target: "oracle_engine",
                    "Unknown forkchoice head {}: {err}",
                    state.head_block_hash
                );
                return Ok(ForkchoiceUpdated {
                    payload_status: PayloadStatus {
                        status: PayloadStatusEnum::Syncing,
                        latest_valid_hash: None,
                    },
                    payload_id: None,
                });
            }
        };

        if self.chain.canonical_hash(head.number())? != Some(head.hash()) {
            self.chain.set_canonical(head.hash())?;
        }
        if !state.safe_block_hash.is_zero() {
            self.chain.set_safe(state.safe_block_hash)?;
        }
        if !state.finalized_block_hash.is_zero() {
            self.chain.set_finalized(state.finalized_block_hash)?;
        }

        let payload_status =
            PayloadStatus { status: PayloadStatusEnum::Valid, latest_valid_hash: Some(head.hash()) };
        let Some(attributes) = attributes else {
            return Ok(ForkchoiceUpdated { payload_status, payload_id: None });
        };

        self.chain.oracle().hint_block_execution(head.hash(), &attributes, self.chain.chain_id());
        let block = self.chain.build_block(head.hash(), &attributes)?;
        let payload_id = self.next_payload_id();
        debug!(
            target: "oracle_engine",
            "Built payload {payload_id} with block #{} ({})",
            block.number(),
            block.hash()
        );
        self.payloads.insert(payload_id.0, block);
        Ok(ForkchoiceUpdated { payload_status, payload_id: Some(payload_id) })
    }

    fn get_payload(&mut self, payload_id: PayloadId) -> Result<L2Block, EngineError> {
        self.payloads.remove(&payload_id.0).ok_or(EngineError::UnknownPayload(payload_id))
    }

    fn new_payload(&mut self, block: L2Block) -> Result<PayloadStatus, EngineError> {
        let valid =
            PayloadStatus { status: PayloadStatusEnum::Valid, latest_valid_hash: Some(block.hash()) };
        if self.chain.block(block.hash(), block.number())?.is_some() {
            return Ok(valid);
        }

        match self.chain.insert_block(&block) {
            Ok(()) => Ok(valid),
            Err(err @ (ChainError::UnexpectedBlockHash { .. } | ChainError::Execution(_))) => {
                warn!(target: "oracle_engine", "Rejected payload {}: {err}", block.hash());
                Ok(PayloadStatus {
                    status: PayloadStatusEnum::Invalid { validation_error: err.to_string() },
                    latest_valid_hash: Some(block.header.parent_hash),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn l2_block_ref_by_label(&mut self, label: BlockLabel) -> Result<BlockInfo, EngineError> {
        let header = match label {
            BlockLabel::Unsafe => self.chain.head(),
            BlockLabel::Safe => self.chain.safe(),
            BlockLabel::Finalized => self.chain.finalized(),
        };
        Ok(BlockInfo::new(header.seal(), header.number, header.parent_hash, header.timestamp))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{FakeExecutor, StubL2Oracle, TestChain};
    use alloy_primitives::Sealable;

    fn engine(
        chain: &TestChain,
        head: u64,
    ) -> (StubL2Oracle, OracleEngine<StubL2Oracle, FakeExecutor>) {
        let stub = StubL2Oracle::default();
        chain.register(&stub);
        let backed = OracleBackedChain::from_head(
            stub.clone(),
            FakeExecutor::default(),
            chain.config(),
            chain.block(head).header,
        );
        (stub, OracleEngine::new(backed))
    }

    fn forkchoice(head: B256) -> ForkchoiceState {
        ForkchoiceState {
            head_block_hash: head,
            safe_block_hash: head,
            finalized_block_hash: B256::ZERO,
        }
    }

    #[test]
    fn test_build_payload_and_advance() {
        let chain = TestChain::new(10, 6);
        let (stub, mut engine) = engine(&chain, 3);
        let head = chain.block(3).hash();

        let updated =
            engine.forkchoice_updated(forkchoice(head), Some(chain.attributes(4))).unwrap();
        assert_eq!(updated.payload_status.status, PayloadStatusEnum::Valid);
        let payload_id = updated.payload_id.unwrap();
        assert!(stub.hints().iter().any(|hint| hint.starts_with("l2-payload-witness ")));

        let block = engine.get_payload(payload_id).unwrap();
        assert_eq!(block, chain.block(4));
        assert!(matches!(engine.get_payload(payload_id), Err(EngineError::UnknownPayload(_))));

        let status = engine.new_payload(block.clone()).unwrap();
        assert_eq!(status.status, PayloadStatusEnum::Valid);
        assert_eq!(engine.l2_block_ref_by_label(BlockLabel::Unsafe).unwrap().number, 3);

        engine.forkchoice_updated(forkchoice(block.hash()), None).unwrap();
        assert_eq!(engine.l2_block_ref_by_label(BlockLabel::Unsafe).unwrap(), block.block_info());
        assert_eq!(engine.l2_block_ref_by_label(BlockLabel::Safe).unwrap(), block.block_info());
        assert_eq!(
            engine.l2_block_ref_by_label(BlockLabel::Finalized).unwrap(),
            chain.block(3).block_info()
        );
        assert_eq!(engine.l2_output_root(4).unwrap(), (block.hash(), chain.output(4).root()));
        assert_eq!(engine.l2_block_ref_by_number(2).unwrap(), chain.block(2).block_info());
        assert!(matches!(
            engine.l2_block_ref_by_number(5),
            Err(EngineError::BlockNumberNotFound(5))
        ));
    }

    #[test]
    fn test_unknown_head_is_syncing() {
        let chain = TestChain::new(10, 6);
        let (_, mut engine) = engine(&chain, 3);
        let updated = engine
            .forkchoice_updated(forkchoice(B256::repeat_byte(9)), Some(chain.attributes(4)))
            .unwrap();
        assert_eq!(updated.payload_status.status, PayloadStatusEnum::Syncing);
        assert_eq!(updated.payload_id, None);
    }

    #[test]
    fn test_new_payload_statuses() {
        let chain = TestChain::new(10, 6);
        let (_, mut engine) = engine(&chain, 3);

        // Known to the oracle.
        let status = engine.new_payload(chain.block(2)).unwrap();
        assert_eq!(status.status, PayloadStatusEnum::Valid);

        let mut tampered = chain.block(4);
        let mut header = tampered.header.inner().clone();
        header.state_root = B256::repeat_byte(0xff);
        tampered.header = header.seal_slow();
        let status = engine.new_payload(tampered).unwrap();
        assert!(matches!(status.status, PayloadStatusEnum::Invalid { .. }));

        // Parent unknown to the oracle and the chain.
        let mut header = chain.block(5).header.inner().clone();
        header.parent_hash = B256::repeat_byte(7);
        let orphan = L2Block::new(header.seal_slow(), chain.block(5).transactions);
        assert!(engine.new_payload(orphan).is_err());
    }

    #[test]
    fn test_output_at_block_hash() {
        let chain = TestChain::new(10, 6);
        let (_, engine) = engine(&chain, 3);
        assert_eq!(engine.l2_output_at_block_hash(chain.block(1).hash()).unwrap(), chain.output(1));
        assert_eq!(
            engine.l2_block_ref_by_hash(chain.block(1).hash()).unwrap(),
            chain.block(1).block_info()
        );
    }
}
