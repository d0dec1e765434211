//! This module contains the [L2Block] type.

use alloc::vec::Vec;
use alloy_consensus::{Header, Sealed};
use alloy_eips::BlockNumHash;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::BufMut;
use interlock_interop::OptimisticBlock;
use interlock_mpt::ordered_trie_with_encoder;
use op_alloy_consensus::OpTxType;
use op_alloy_protocol::BlockInfo;

/// An L2 block: a sealed header and its EIP-2718 encoded transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Block {
    /// The sealed header.
    pub header: Sealed<Header>,
    /// The EIP-2718 encoded transactions, in block order.
    pub transactions: Vec<Bytes>,
}

impl L2Block {
    /// Creates a new [L2Block].
    pub const fn new(header: Sealed<Header>, transactions: Vec<Bytes>) -> Self {
        Self { header, transactions }
    }

    /// Returns the block hash.
    pub fn hash(&self) -> B256 {
        self.header.seal()
    }

    /// Returns the block number.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Returns the block timestamp.
    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// Returns the number and hash of the block.
    pub fn num_hash(&self) -> BlockNumHash {
        BlockNumHash { number: self.number(), hash: self.hash() }
    }

    /// Returns the [BlockInfo] of the block.
    pub fn block_info(&self) -> BlockInfo {
        BlockInfo::new(self.hash(), self.number(), self.header.parent_hash, self.timestamp())
    }

    /// Returns the deposit transactions of the block, in order.
    pub fn deposits(&self) -> impl Iterator<Item = &Bytes> {
        self.transactions.iter().filter(|tx| is_deposit(tx))
    }

    /// Returns true if every transaction of the block is a deposit.
    pub fn is_deposits_only(&self) -> bool {
        self.transactions.iter().all(|tx| is_deposit(tx))
    }

    /// Pairs the block hash with an output root.
    pub fn optimistic(&self, output_root: B256) -> OptimisticBlock {
        OptimisticBlock::new(self.hash(), output_root)
    }
}

/// Returns true if the EIP-2718 encoded transaction is a deposit.
pub fn is_deposit(tx: &[u8]) -> bool {
    tx.first() == Some(&(OpTxType::Deposit as u8))
}

/// Computes the transactions root of EIP-2718 encoded transactions.
pub fn transactions_root(transactions: &[Bytes]) -> B256 {
    ordered_trie_with_encoder(transactions, |tx, buf| buf.put_slice(tx)).root()
}
