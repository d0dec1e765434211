//! The dependency set: the chains that may exchange messages, and the rules for linking them.

use crate::MESSAGE_EXPIRY_WINDOW;
use alloc::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Decides whether a message initiated on one chain may be executed on another.
pub trait LinkChecker {
    /// Returns `true` if a message initiated on `init_chain` at `init_timestamp` may be executed
    /// by a block of `exec_chain` at `exec_timestamp`.
    fn can_execute(
        &self,
        exec_chain: u64,
        exec_timestamp: u64,
        init_chain: u64,
        init_timestamp: u64,
    ) -> bool;
}

/// Per-chain entry of a [DependencySet].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDependency {}

/// The set of chains that may depend on each other's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySet {
    /// The member chains, keyed by chain ID.
    pub dependencies: BTreeMap<u64, ChainDependency>,
    /// Replaces [MESSAGE_EXPIRY_WINDOW] when set to a non-zero value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_message_expiry_window: Option<u64>,
}

impl DependencySet {
    /// Creates a dependency set over `chains` with the default expiry window.
    pub fn new(chains: impl IntoIterator<Item = u64>) -> Self {
        Self {
            dependencies: chains.into_iter().map(|id| (id, ChainDependency::default())).collect(),
            override_message_expiry_window: None,
        }
    }

    /// Returns `true` if `chain_id` is a member of the set.
    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.dependencies.contains_key(&chain_id)
    }

    /// Returns the number of seconds an initiating message stays executable.
    pub fn message_expiry_window(&self) -> u64 {
        match self.override_message_expiry_window {
            Some(window) if window != 0 => window,
            _ => MESSAGE_EXPIRY_WINDOW,
        }
    }
}

impl LinkChecker for DependencySet {
    fn can_execute(
        &self,
        exec_chain: u64,
        exec_timestamp: u64,
        init_chain: u64,
        init_timestamp: u64,
    ) -> bool {
        self.has_chain(exec_chain)
            && self.has_chain(init_chain)
            && init_timestamp.saturating_add(self.message_expiry_window()) >= exec_timestamp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_dependency_set() {
        let raw = r#"{
            "dependencies": {
                "900": {},
                "901": {}
            },
            "overrideMessageExpiryWindow": 10
        }"#;
        let set: DependencySet = serde_json::from_str(raw).unwrap();
        assert!(set.has_chain(900));
        assert!(set.has_chain(901));
        assert!(!set.has_chain(902));
        assert_eq!(set.message_expiry_window(), 10);

        let encoded = serde_json::to_string(&set).unwrap();
        assert_eq!(serde_json::from_str::<DependencySet>(&encoded).unwrap(), set);
    }

    #[test]
    fn test_default_expiry_window() {
        let set: DependencySet = serde_json::from_str(r#"{"dependencies":{"10":{}}}"#).unwrap();
        assert_eq!(set.message_expiry_window(), MESSAGE_EXPIRY_WINDOW);

        let zero = DependencySet { override_message_expiry_window: Some(0), ..set };
        assert_eq!(zero.message_expiry_window(), MESSAGE_EXPIRY_WINDOW);
    }

    #[test]
    fn test_can_execute() {
        let mut set = DependencySet::new([1, 2]);
        set.override_message_expiry_window = Some(5);

        assert!(set.can_execute(1, 100, 2, 100));
        assert!(set.can_execute(1, 100, 2, 95));
        assert!(!set.can_execute(1, 100, 2, 94));
        assert!(!set.can_execute(1, 100, 3, 100));
        assert!(!set.can_execute(3, 100, 1, 100));
        assert!(set.can_execute(2, 0, 2, u64::MAX));
    }
}
