//! Cycle detection over the same-timestamp messages of a [HazardSet].
//!
//! Every log of every hazard block is a node. Consecutive logs of a block are joined by an edge,
//! and every same-timestamp executing message adds an edge from the initiating log to the
//! executing log. The messages are valid only if this graph is acyclic.

use crate::{
    errors::{HazardError, HazardResult},
    ExecutingMessage, HazardDeps, HazardSet,
};
use alloc::{
    collections::{BTreeMap, BTreeSet},
    vec::Vec,
};
use tracing::{debug, warn};

/// A log within a hazard block: `(chain_id, log_index)`.
type Node = (u64, u32);

/// The dependency graph of a hazard set.
#[derive(Debug, Default)]
struct MessageGraph {
    in_degree_zero: BTreeSet<Node>,
    in_degree: BTreeMap<Node, u32>,
    outgoing: BTreeMap<Node, Vec<Node>>,
}

impl MessageGraph {
    fn add_edge(&mut self, from: Node, to: Node) {
        self.in_degree_zero.remove(&to);
        *self.in_degree.entry(to).or_default() += 1;
        self.outgoing.entry(from).or_default().push(to);
    }

    /// Removes nodes without incoming edges until none are left. Fails if any node remains.
    fn check(mut self) -> HazardResult<()> {
        while let Some(node) = self.in_degree_zero.pop_first() {
            for to in self.outgoing.remove(&node).unwrap_or_default() {
                if let Some(degree) = self.in_degree.get_mut(&to) {
                    *degree -= 1;
                    if *degree == 0 {
                        self.in_degree.remove(&to);
                        self.in_degree_zero.insert(to);
                    }
                }
            }
        }

        if self.in_degree.is_empty() {
            Ok(())
        } else {
            warn!(target: "cycle_check", "Cycle detected among {} logs", self.in_degree.len());
            Err(HazardError::Cycle)
        }
    }
}

/// Rejects the hazards of a block at `timestamp` if their same-timestamp messages form a cycle or
/// reference logs that do not exist.
pub fn check_hazard_cycles<D: HazardDeps + ?Sized>(
    deps: &mut D,
    timestamp: u64,
    hazards: &HazardSet,
) -> HazardResult<()> {
    let (log_counts, messages) = gather_logs(deps, timestamp, hazards)?;
    debug!(
        target: "cycle_check",
        "Checking {} hazard blocks with {} same-timestamp messages",
        log_counts.len(),
        messages.values().map(BTreeMap::len).sum::<usize>()
    );

    let mut graph = MessageGraph::default();
    for (&chain_id, &log_count) in &log_counts {
        for log_index in 0..log_count {
            if log_index == 0 {
                graph.in_degree_zero.insert((chain_id, 0));
            } else {
                graph.add_edge((chain_id, log_index - 1), (chain_id, log_index));
            }
        }
    }

    for (&chain_id, chain_messages) in &messages {
        for (&log_index, message) in chain_messages {
            if !hazards.entries().contains_key(&message.chain_id) {
                return Err(HazardError::UnknownHazardChain(message.chain_id));
            }
            match log_counts.get(&message.chain_id) {
                Some(count) if message.log_index < *count => {}
                _ => return Err(HazardError::InitiatingIndexOutOfBounds),
            }

            let init = (message.chain_id, message.log_index);
            let exec = (chain_id, log_index);
            if init == exec {
                return Err(HazardError::SelfReference);
            }
            graph.add_edge(init, exec);
        }
    }

    graph.check()
}

/// Opens every hazard block. Returns the log count per chain, and the executing messages at
/// `timestamp` per chain.
#[allow(clippy::type_complexity)]
fn gather_logs<D: HazardDeps + ?Sized>(
    deps: &mut D,
    timestamp: u64,
    hazards: &HazardSet,
) -> HazardResult<(BTreeMap<u64, u32>, BTreeMap<u64, BTreeMap<u32, ExecutingMessage>>)> {
    let mut log_counts = BTreeMap::new();
    let mut messages = BTreeMap::new();

    for (&chain_id, seal) in hazards.entries() {
        let opened = deps.open_block(chain_id, seal.number)?;
        if opened.hash != seal.hash || opened.number != seal.number {
            return Err(HazardError::InconsistentSeal(chain_id));
        }

        if let Some((&log_index, _)) = opened.messages.range(opened.log_count..).next() {
            return Err(HazardError::InvalidExecutingIndex {
                log_index,
                log_count: opened.log_count,
            });
        }

        log_counts.insert(chain_id, opened.log_count);
        let current = opened
            .messages
            .into_iter()
            .filter(|(_, message)| message.timestamp == timestamp)
            .collect::<BTreeMap<_, _>>();
        if !current.is_empty() {
            messages.insert(chain_id, current);
        }
    }

    Ok((log_counts, messages))
}
