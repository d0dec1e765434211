#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(any(test, feature = "arbitrary")), no_std)]

extern crate alloc;

mod constants;
pub use constants::{
    CONSOLIDATE_STEP, CROSS_L2_INBOX_ADDRESS, INVALID_TRANSITION, INVALID_TRANSITION_HASH,
    MESSAGE_EXPIRY_WINDOW, SUPER_ROOT_VERSION, TRANSITION_STATE_VERSION,
};

mod errors;
pub use errors::{
    HazardError, HazardResult, MessageDecodeError, PreStateError, SuperRootError, SuperRootResult,
};

mod super_root;
pub use super_root::{OutputRootWithChain, SuperRoot};

mod transition;
pub use transition::{OptimisticBlock, PreState, TransitionState};

mod message;
pub use message::{
    decode_executing_message, executing_message_log, executing_messages_from_receipts,
    initiating_log_checksum, log_payload_hash, message_checksum, payload_hash_to_log_hash,
    ExecutingMessage, MessageIdentifier, CHECKSUM_VERSION,
};

mod depset;
pub use depset::{ChainDependency, DependencySet, LinkChecker};

mod hazard;
pub use hazard::{check_hazards, BlockSeal, ContainsQuery, HazardDeps, HazardSet, OpenedBlock};

mod cycle;
pub use cycle::check_hazard_cycles;
