//! Interop message primitives.
//!
//! <https://specs.optimism.io/interop/messaging.html#messaging>

use crate::{errors::MessageDecodeError, CROSS_L2_INBOX_ADDRESS};
use alloc::{collections::BTreeMap, vec::Vec};
use alloy_primitives::{keccak256, Address, Log, LogData, B256, U256};
use alloy_sol_types::SolEvent;
use op_alloy_consensus::OpReceiptEnvelope;

mod abi {
    use alloy_sol_types::sol;

    sol! {
        /// @notice The struct for a pointer to a message payload in a remote (or local) chain.
        #[derive(Default, Debug, PartialEq, Eq)]
        struct MessageIdentifierAbi {
            address origin;
            uint256 blockNumber;
            uint256 logIndex;
            uint256 timestamp;
            uint256 chainId;
        }

        /// @notice Emitted when a cross chain message is being executed.
        /// @param msgHash Hash of message payload being executed.
        /// @param id Encoded Identifier of the message.
        #[derive(Default, Debug, PartialEq, Eq)]
        event ExecutingMessage(bytes32 indexed msgHash, MessageIdentifierAbi id);
    }
}

/// The version byte stamped over the first byte of every [message_checksum].
pub const CHECKSUM_VERSION: u8 = 0x03;

/// The byte length of the ABI encoded identifier carried in the event data.
const IDENTIFIER_LENGTH: usize = 32 * 5;

/// An executing message, as carried by a log of the cross chain inbox.
///
/// Identifies an initiating log on another (or the same) chain by position, and commits to its
/// contents through `checksum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutingMessage {
    /// The chain that emitted the initiating message.
    pub chain_id: u64,
    /// The block that contains the initiating message.
    pub block_number: u64,
    /// The index of the initiating log within its block.
    pub log_index: u32,
    /// The timestamp of the initiating block.
    pub timestamp: u64,
    /// The checksum of the initiating message.
    pub checksum: B256,
}

/// A [MessageIdentifier] uniquely represents a log that is emitted from a chain within
/// the broader dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageIdentifier {
    /// The account that sent the message.
    pub origin: Address,
    /// The block number that the message was sent in.
    pub block_number: u64,
    /// The log index of the message in the block.
    pub log_index: u32,
    /// The timestamp of the message.
    pub timestamp: u64,
    /// The chain ID of the chain that the message was sent on.
    pub chain_id: U256,
}

impl MessageIdentifier {
    /// Decodes the identifier from event data, rejecting any non-zero padding.
    pub fn decode_strict(data: &[u8]) -> Result<Self, MessageDecodeError> {
        if data.len() != IDENTIFIER_LENGTH {
            return Err(MessageDecodeError::DataLength(data.len()));
        }

        let word = |i: usize| &data[i * 32..(i + 1) * 32];
        let origin = Address::from_slice(padded(word(0), 20, "origin")?);
        let block_number = u64::from_be_bytes(be_array(padded(word(1), 8, "blockNumber")?));
        let log_index = u32::from_be_bytes(be_array(padded(word(2), 4, "logIndex")?));
        let timestamp = u64::from_be_bytes(be_array(padded(word(3), 8, "timestamp")?));
        let chain_id = U256::from_be_slice(word(4));

        Ok(Self { origin, block_number, log_index, timestamp, chain_id })
    }

    /// Encodes the identifier as ABI event data.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IDENTIFIER_LENGTH);
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(self.origin.as_slice());
        out.extend_from_slice(&U256::from(self.block_number).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(self.log_index).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(self.timestamp).to_be_bytes::<32>());
        out.extend_from_slice(&self.chain_id.to_be_bytes::<32>());
        out
    }

    /// Computes the checksum of the message this identifier points at.
    pub fn checksum(&self, payload_hash: B256) -> B256 {
        message_checksum(
            payload_hash_to_log_hash(payload_hash, self.origin),
            self.block_number,
            self.log_index,
            self.timestamp,
            self.chain_id,
        )
    }
}

/// Returns the `width` low bytes of `word`, requiring every byte before them to be zero.
fn padded<'a>(
    word: &'a [u8],
    width: usize,
    field: &'static str,
) -> Result<&'a [u8], MessageDecodeError> {
    let (padding, value) = word.split_at(word.len() - width);
    if padding.iter().any(|b| *b != 0) {
        return Err(MessageDecodeError::Padding(field));
    }
    Ok(value)
}

fn be_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Decodes an [ExecutingMessage] from `log`.
///
/// Returns `Ok(None)` if the log was not emitted by the cross chain inbox or is not an
/// `ExecutingMessage` event. Malformed executing message events are errors.
pub fn decode_executing_message(log: &Log) -> Result<Option<ExecutingMessage>, MessageDecodeError> {
    if log.address != CROSS_L2_INBOX_ADDRESS {
        return Ok(None);
    }
    let topics = log.topics();
    if topics.first() != Some(&abi::ExecutingMessage::SIGNATURE_HASH) {
        return Ok(None);
    }
    if topics.len() != 2 {
        return Err(MessageDecodeError::TopicCount(topics.len()));
    }

    let id = MessageIdentifier::decode_strict(&log.data.data)?;
    Ok(Some(ExecutingMessage {
        chain_id: id.chain_id.saturating_to(),
        block_number: id.block_number,
        log_index: id.log_index,
        timestamp: id.timestamp,
        checksum: id.checksum(topics[1]),
    }))
}

/// Builds the cross chain inbox log that executes the message identified by `id`.
pub fn executing_message_log(id: &MessageIdentifier, payload_hash: B256) -> Log {
    Log {
        address: CROSS_L2_INBOX_ADDRESS,
        data: LogData::new_unchecked(
            alloc::vec![abi::ExecutingMessage::SIGNATURE_HASH, payload_hash],
            id.encode().into(),
        ),
    }
}

/// Hashes the payload of an initiating log: its topics followed by its data.
pub fn log_payload_hash(log: &Log) -> B256 {
    let mut payload = Vec::with_capacity(log.topics().len() * 32 + log.data.data.len());
    for topic in log.topics() {
        payload.extend_from_slice(topic.as_slice());
    }
    payload.extend_from_slice(&log.data.data);
    keccak256(payload)
}

/// Binds a payload hash to the address that emitted it.
pub fn payload_hash_to_log_hash(payload_hash: B256, origin: Address) -> B256 {
    let mut buf = [0u8; 52];
    buf[..20].copy_from_slice(origin.as_slice());
    buf[20..].copy_from_slice(payload_hash.as_slice());
    keccak256(buf)
}

/// Computes the checksum that an executing message carries for the initiating log at the given
/// position.
pub fn message_checksum(
    log_hash: B256,
    block_number: u64,
    log_index: u32,
    timestamp: u64,
    chain_id: U256,
) -> B256 {
    let mut id_packed = [0u8; 32];
    id_packed[12..20].copy_from_slice(&block_number.to_be_bytes());
    id_packed[20..28].copy_from_slice(&timestamp.to_be_bytes());
    id_packed[28..].copy_from_slice(&log_index.to_be_bytes());

    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(log_hash.as_slice());
    buf[32..].copy_from_slice(&id_packed);
    let id_log_hash = keccak256(buf);

    buf[..32].copy_from_slice(id_log_hash.as_slice());
    buf[32..].copy_from_slice(&chain_id.to_be_bytes::<32>());
    let mut out = keccak256(buf);
    out[0] = CHECKSUM_VERSION;
    out
}

/// Computes the checksum an executing message must carry to reference `log`.
pub fn initiating_log_checksum(
    log: &Log,
    chain_id: u64,
    block_number: u64,
    log_index: u32,
    timestamp: u64,
) -> B256 {
    message_checksum(
        payload_hash_to_log_hash(log_payload_hash(log), log.address),
        block_number,
        log_index,
        timestamp,
        U256::from(chain_id),
    )
}

/// Collects the executing messages of a block's receipts, keyed by block-wide log index, together
/// with the total number of logs in the block.
pub fn executing_messages_from_receipts(
    receipts: &[OpReceiptEnvelope],
) -> Result<(BTreeMap<u32, ExecutingMessage>, u32), MessageDecodeError> {
    let mut messages = BTreeMap::new();
    let mut log_index = 0u32;
    for log in receipts.iter().flat_map(|receipt| receipt.logs()) {
        if let Some(message) = decode_executing_message(log)? {
            messages.insert(log_index, message);
        }
        log_index += 1;
    }
    Ok((messages, log_index))
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;
    use alloy_consensus::{Eip658Value, Receipt, ReceiptWithBloom};
    use alloy_primitives::{address, b256, Bloom, Bytes};

    fn identifier() -> MessageIdentifier {
        MessageIdentifier {
            origin: address!("1111111111111111111111111111111111111111"),
            block_number: 42,
            log_index: 3,
            timestamp: 1_000,
            chain_id: U256::from(900),
        }
    }

    fn receipt(logs: Vec<Log>) -> OpReceiptEnvelope {
        OpReceiptEnvelope::Eip1559(ReceiptWithBloom {
            receipt: Receipt { status: Eip658Value::Eip658(true), cumulative_gas_used: 21_000, logs },
            logs_bloom: Bloom::ZERO,
        })
    }

    #[test]
    fn test_event_signature() {
        assert_eq!(
            abi::ExecutingMessage::SIGNATURE,
            "ExecutingMessage(bytes32,(address,uint256,uint256,uint256,uint256))"
        );
        assert_eq!(
            abi::ExecutingMessage::SIGNATURE_HASH,
            b256!("5c37832d2e8d10e346e55ad62071a6a2f9fa5130614ef2ec6617555c6f467ba7")
        );
    }

    #[test]
    fn test_decode_executing_message() {
        let payload_hash = B256::repeat_byte(0xbb);
        let id = identifier();
        let message = decode_executing_message(&executing_message_log(&id, payload_hash)).unwrap().unwrap();
        assert_eq!(message.chain_id, 900);
        assert_eq!(message.block_number, 42);
        assert_eq!(message.log_index, 3);
        assert_eq!(message.timestamp, 1_000);
        assert_eq!(message.checksum, id.checksum(payload_hash));
        assert_eq!(message.checksum[0], CHECKSUM_VERSION);
    }

    #[test]
    fn test_decode_skips_unrelated_logs() {
        let mut log = executing_message_log(&identifier(), B256::ZERO);
        log.address = Address::ZERO;
        assert_eq!(decode_executing_message(&log), Ok(None));

        let log = Log {
            address: CROSS_L2_INBOX_ADDRESS,
            data: LogData::new_unchecked(vec![B256::repeat_byte(1)], Bytes::new()),
        };
        assert_eq!(decode_executing_message(&log), Ok(None));
    }

    #[test]
    fn test_decode_rejects_malformed_events() {
        let mut log = executing_message_log(&identifier(), B256::ZERO);
        log.data = LogData::new_unchecked(vec![abi::ExecutingMessage::SIGNATURE_HASH], Bytes::new());
        assert_eq!(decode_executing_message(&log), Err(MessageDecodeError::TopicCount(1)));

        let mut log = executing_message_log(&identifier(), B256::ZERO);
        let mut data = log.data.data.to_vec();
        data.push(0);
        log.data = LogData::new_unchecked(log.data.topics().to_vec(), data.into());
        assert_eq!(decode_executing_message(&log), Err(MessageDecodeError::DataLength(161)));

        for (offset, field) in
            [(0, "origin"), (32, "blockNumber"), (64, "logIndex"), (96, "timestamp")]
        {
            let mut log = executing_message_log(&identifier(), B256::ZERO);
            let mut data = log.data.data.to_vec();
            data[offset] = 1;
            log.data = LogData::new_unchecked(log.data.topics().to_vec(), data.into());
            assert_eq!(decode_executing_message(&log), Err(MessageDecodeError::Padding(field)));
        }
    }

    #[test]
    fn test_initiating_checksum_matches_executing() {
        let initiating = Log {
            address: address!("1111111111111111111111111111111111111111"),
            data: LogData::new_unchecked(vec![B256::repeat_byte(7)], Bytes::from_static(b"hi")),
        };
        let id = identifier();
        let executing = executing_message_log(&id, log_payload_hash(&initiating));
        let message = decode_executing_message(&executing).unwrap().unwrap();
        assert_eq!(message.checksum, initiating_log_checksum(&initiating, 900, 42, 3, 1_000));
        assert_ne!(message.checksum, initiating_log_checksum(&initiating, 900, 42, 4, 1_000));
    }

    #[test]
    fn test_messages_from_receipts() {
        let id = identifier();
        let plain = Log {
            address: Address::ZERO,
            data: LogData::new_unchecked(vec![], Bytes::new()),
        };
        let receipts = vec![
            receipt(vec![plain.clone(), plain.clone()]),
            receipt(vec![]),
            receipt(vec![plain.clone(), executing_message_log(&id, B256::ZERO), plain]),
        ];
        let (messages, log_count) = executing_messages_from_receipts(&receipts).unwrap();
        assert_eq!(log_count, 5);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[&3].block_number, 42);
    }
}
