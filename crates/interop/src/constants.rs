//! Constants for the interop protocol.

use alloy_primitives::{address, b256, Address, B256};

/// The version byte of an encoded [SuperRoot](crate::SuperRoot).
pub const SUPER_ROOT_VERSION: u8 = 1;

/// The version byte of an encoded [TransitionState](crate::TransitionState).
pub const TRANSITION_STATE_VERSION: u8 = 255;

/// The step at which all optimistic blocks have been derived and consolidation runs. Also the
/// maximum number of chains a super root may hold.
pub const CONSOLIDATE_STEP: u64 = 127;

/// The claim produced when a chain cannot reach the next super root timestamp.
pub const INVALID_TRANSITION: &[u8] = b"invalid";

/// `keccak256(INVALID_TRANSITION)`.
pub const INVALID_TRANSITION_HASH: B256 =
    b256!("ffd7db0f9d5cdeb49c4c9eba649d4dc6d852d64671e65488e57f58584992ac68");

/// The default number of seconds an initiating message remains executable.
pub const MESSAGE_EXPIRY_WINDOW: u64 = 7 * 24 * 60 * 60;

/// The address of the L2 cross chain inbox predeploy proxy.
pub const CROSS_L2_INBOX_ADDRESS: Address = address!("4200000000000000000000000000000000000022");
