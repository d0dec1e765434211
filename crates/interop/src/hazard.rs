//! The [HazardSet]: the blocks a candidate block transitively depends on through executing messages
//! at its own timestamp.

use crate::{
    errors::{HazardError, HazardResult},
    ExecutingMessage, LinkChecker,
};
use alloc::{collections::BTreeMap, vec, vec::Vec};
use alloy_primitives::B256;
use core::fmt;
use tracing::{debug, trace};

/// The identity of a block together with its timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockSeal {
    /// The block hash.
    pub hash: B256,
    /// The block number.
    pub number: u64,
    /// The block timestamp.
    pub timestamp: u64,
}

impl BlockSeal {
    /// Creates a new [BlockSeal].
    pub const fn new(hash: B256, number: u64, timestamp: u64) -> Self {
        Self { hash, number, timestamp }
    }

    /// Returns `true` if both seals name the same block, ignoring the timestamp.
    pub fn same_block(&self, other: &Self) -> bool {
        self.hash == other.hash && self.number == other.number
    }
}

impl fmt::Display for BlockSeal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}) @ {}", self.number, self.hash, self.timestamp)
    }
}

/// A lookup for an initiating log, derived from an [ExecutingMessage].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainsQuery {
    /// The timestamp of the block holding the log.
    pub timestamp: u64,
    /// The number of the block holding the log.
    pub block_number: u64,
    /// The block-wide index of the log.
    pub log_index: u32,
    /// The checksum the log must match.
    pub checksum: B256,
}

impl From<&ExecutingMessage> for ContainsQuery {
    fn from(message: &ExecutingMessage) -> Self {
        Self {
            timestamp: message.timestamp,
            block_number: message.block_number,
            log_index: message.log_index,
            checksum: message.checksum,
        }
    }
}

/// A canonical block opened for hazard checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenedBlock {
    /// The hash of the block.
    pub hash: B256,
    /// The number of the block.
    pub number: u64,
    /// The number of logs emitted by the block.
    pub log_count: u32,
    /// The executing messages of the block, keyed by block-wide log index.
    pub messages: BTreeMap<u32, ExecutingMessage>,
}

impl OpenedBlock {
    fn matches(&self, seal: &BlockSeal) -> bool {
        self.hash == seal.hash && self.number == seal.number
    }
}

/// Access to the canonical chains needed to resolve hazards.
pub trait HazardDeps {
    /// Resolves the block on `chain_id` holding the log described by `query`.
    ///
    /// Fails with an invalid-dependency [HazardError] if the log is not there.
    fn contains(&mut self, chain_id: u64, query: &ContainsQuery) -> HazardResult<BlockSeal>;

    /// Opens the canonical block at `number` on `chain_id`.
    fn open_block(&mut self, chain_id: u64, number: u64) -> HazardResult<OpenedBlock>;

    /// Checks that a block referenced by an older-timestamp message is cross-valid.
    fn is_cross_valid_block(&mut self, _chain_id: u64, _block: &BlockSeal) -> HazardResult<()> {
        Ok(())
    }

    /// Checks that a hazard block is at or behind the cross-unsafe frontier of its chain.
    fn is_cross_unsafe(&mut self, _chain_id: u64, _block: &BlockSeal) -> HazardResult<()> {
        Ok(())
    }
}

/// The blocks, at most one per chain, that a candidate block depends on at its own timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HazardSet {
    entries: BTreeMap<u64, BlockSeal>,
}

impl HazardSet {
    /// Builds the hazard set of `candidate` on `chain_id`.
    ///
    /// Blocks are visited depth first. For every visited block, all executing messages are first
    /// checked against `linker`, and only then resolved through [HazardDeps::contains].
    pub fn build<D, L>(
        deps: &mut D,
        linker: &L,
        chain_id: u64,
        candidate: BlockSeal,
    ) -> HazardResult<Self>
    where
        D: HazardDeps + ?Sized,
        L: LinkChecker + ?Sized,
    {
        debug!(target: "hazards", "Building hazard set for chain {} block {}", chain_id, candidate);

        let mut set = Self::default();
        let mut stack = vec![(chain_id, candidate)];
        while let Some((chain_id, block)) = stack.pop() {
            trace!(target: "hazards", "Processing chain {} block {}", chain_id, block);

            let opened = deps.open_block(chain_id, block.number)?;
            if !opened.matches(&block) {
                return Err(HazardError::BlockMismatch {
                    chain: chain_id,
                    expected: block,
                    actual: BlockSeal::new(opened.hash, opened.number, block.timestamp),
                });
            }

            for message in opened.messages.values() {
                if !linker.can_execute(
                    chain_id,
                    block.timestamp,
                    message.chain_id,
                    message.timestamp,
                ) {
                    return Err(HazardError::CannotExecute {
                        exec_chain: chain_id,
                        exec_timestamp: block.timestamp,
                        init_chain: message.chain_id,
                        init_timestamp: message.timestamp,
                    });
                }
            }

            for message in opened.messages.values() {
                let included_in = deps.contains(message.chain_id, &message.into())?;

                if message.timestamp < block.timestamp {
                    deps.is_cross_valid_block(message.chain_id, &included_in)?;
                } else if message.timestamp == block.timestamp {
                    match set.entries.get(&message.chain_id) {
                        Some(existing) if !existing.same_block(&included_in) => {
                            return Err(HazardError::ConflictingDependency {
                                chain: message.chain_id,
                                existing: *existing,
                                found: included_in,
                            });
                        }
                        Some(_) => {}
                        None => {
                            trace!(
                                target: "hazards",
                                "Adding chain {} block {} to the hazard set",
                                message.chain_id,
                                included_in
                            );
                            set.entries.insert(message.chain_id, included_in);
                            stack.push((message.chain_id, included_in));
                        }
                    }
                } else {
                    return Err(HazardError::FutureMessage {
                        message_timestamp: message.timestamp,
                        block_timestamp: block.timestamp,
                    });
                }
            }
        }

        Ok(set)
    }

    /// Creates a hazard set from known entries.
    pub const fn from_entries(entries: BTreeMap<u64, BlockSeal>) -> Self {
        Self { entries }
    }

    /// Returns the hazard blocks, keyed by chain ID.
    pub const fn entries(&self) -> &BTreeMap<u64, BlockSeal> {
        &self.entries
    }

    /// Returns `true` if the candidate has no same-timestamp dependencies.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs [HazardDeps::is_cross_unsafe] over every hazard block.
    pub fn check_unsafe_frontier<D: HazardDeps + ?Sized>(&self, deps: &mut D) -> HazardResult<()> {
        self.entries.iter().try_for_each(|(chain_id, block)| deps.is_cross_unsafe(*chain_id, block))
    }

    /// Returns the chains in the set.
    pub fn chains(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }
}

/// Runs every cross-chain check on `candidate`: builds its hazard set, checks the unsafe frontier
/// and rejects same-timestamp message cycles.
pub fn check_hazards<D, L>(
    deps: &mut D,
    linker: &L,
    chain_id: u64,
    candidate: BlockSeal,
) -> HazardResult<()>
where
    D: HazardDeps + ?Sized,
    L: LinkChecker + ?Sized,
{
    let hazards = HazardSet::build(deps, linker, chain_id, candidate)?;
    hazards.check_unsafe_frontier(deps)?;
    crate::check_hazard_cycles(deps, candidate.timestamp, &hazards)
}


#[cfg(test)]
mod test {
    use super::{test_util::*, *};

    #[test]
    fn test_no_messages() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(1, candidate, 2, BTreeMap::new());

        let set = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap();
        assert!(set.is_empty());
        assert_eq!(deps.contains_calls, 0);
    }

    #[test]
    fn test_candidate_mismatch() {
        let mut deps = MockHazardDeps::default();
        deps.add_block(1, seal(1, 5, 100), 0, BTreeMap::new());
        let other = BlockSeal::new(B256::repeat_byte(0xff), 5, 100);

        let err = HazardSet::build(&mut deps, &linker(), 1, other).unwrap_err();
        assert!(matches!(err, HazardError::BlockMismatch { chain: 1, .. }));
        assert!(err.is_invalid_dependency());
    }

    #[test]
    fn test_link_check_runs_before_inclusion() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(2, seal(2, 4, 100), 1, BTreeMap::new());
        deps.add_block(
            1,
            candidate,
            2,
            BTreeMap::from([(0, message(2, 4, 0, 100)), (1, message(9, 4, 0, 100))]),
        );

        let err = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap_err();
        assert!(matches!(err, HazardError::CannotExecute { init_chain: 9, .. }));
        assert_eq!(deps.contains_calls, 0);
    }

    #[test]
    fn test_older_message_is_not_a_hazard() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(2, seal(2, 3, 98), 1, BTreeMap::new());
        deps.add_block(1, candidate, 1, BTreeMap::from([(0, message(2, 3, 0, 98))]));

        let set = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap();
        assert!(set.is_empty());
        assert_eq!(deps.contains_calls, 1);
    }

    #[test]
    fn test_same_timestamp_messages_are_transitive() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(3, seal(3, 7, 100), 1, BTreeMap::new());
        deps.add_block(2, seal(2, 4, 100), 2, BTreeMap::from([(1, message(3, 7, 0, 100))]));
        deps.add_block(1, candidate, 1, BTreeMap::from([(0, message(2, 4, 0, 100))]));

        let set = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap();
        assert_eq!(set.chains(), vec![2, 3]);
        assert_eq!(set.entries()[&2], seal(2, 4, 100));
        assert_eq!(set.entries()[&3], seal(3, 7, 100));
        assert!(set.check_unsafe_frontier(&mut deps).is_ok());
    }

    #[test]
    fn test_future_message() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(2, seal(2, 4, 102), 1, BTreeMap::new());
        deps.add_block(1, candidate, 1, BTreeMap::from([(0, message(2, 4, 0, 102))]));

        let err = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap_err();
        assert_eq!(err, HazardError::FutureMessage { message_timestamp: 102, block_timestamp: 100 });
    }

    #[test]
    fn test_conflicting_dependencies() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(2, seal(2, 4, 100), 1, BTreeMap::new());
        deps.add_block(2, seal(2, 5, 100), 1, BTreeMap::new());
        deps.add_block(
            1,
            candidate,
            2,
            BTreeMap::from([(0, message(2, 4, 0, 100)), (1, message(2, 5, 0, 100))]),
        );

        let err = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap_err();
        assert!(matches!(err, HazardError::ConflictingDependency { chain: 2, .. }));
    }

    #[test]
    fn test_inclusion_failure_propagates() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(2, seal(2, 4, 100), 1, BTreeMap::new());
        let mut bad = message(2, 4, 0, 100);
        bad.checksum = B256::ZERO;
        deps.add_block(1, candidate, 1, BTreeMap::from([(0, bad)]));

        let err = HazardSet::build(&mut deps, &linker(), 1, candidate).unwrap_err();
        assert!(matches!(err, HazardError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_check_hazards_accepts_acyclic_exchange() {
        let mut deps = MockHazardDeps::default();
        let candidate = seal(1, 5, 100);
        deps.add_block(2, seal(2, 4, 100), 2, BTreeMap::from([(1, message(1, 5, 0, 100))]));
        deps.add_block(1, candidate, 2, BTreeMap::from([(1, message(2, 4, 0, 100))]));

        check_hazards(&mut deps, &linker(), 1, candidate).unwrap();
    }
}
