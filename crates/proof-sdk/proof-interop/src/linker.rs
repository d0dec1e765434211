//! Message linking across the chains of the boot info.

use alloc::collections::BTreeMap;
use interlock_interop::{DependencySet, LinkChecker};
use interlock_proof::RollupConfig;

/// A [LinkChecker] that also requires interop to be active on both chains of a message.
///
/// A chain without a rollup config is treated as never interop-active.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLinker<'a> {
    rollup_configs: &'a BTreeMap<u64, RollupConfig>,
    dependency_set: &'a DependencySet,
}

impl<'a> ConfigLinker<'a> {
    /// Creates a new [ConfigLinker] over `rollup_configs` and `dependency_set`.
    pub const fn new(
        rollup_configs: &'a BTreeMap<u64, RollupConfig>,
        dependency_set: &'a DependencySet,
    ) -> Self {
        Self { rollup_configs, dependency_set }
    }

    fn is_interop_active(&self, chain_id: u64, timestamp: u64) -> bool {
        let active =
            self.rollup_configs.get(&chain_id).is_some_and(|c| c.is_interop_active(timestamp));
        if !active {
            trace!(target: "consolidation", "Interop inactive on chain {chain_id} at {timestamp}");
        }
        active
    }
}

impl LinkChecker for ConfigLinker<'_> {
    fn can_execute(
        &self,
        exec_chain: u64,
        exec_timestamp: u64,
        init_chain: u64,
        init_timestamp: u64,
    ) -> bool {
        self.dependency_set.can_execute(exec_chain, exec_timestamp, init_chain, init_timestamp)
            && self.is_interop_active(exec_chain, exec_timestamp)
            && self.is_interop_active(init_chain, init_timestamp)
    }
}
