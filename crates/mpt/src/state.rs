//! Point reads against a state root.

use crate::{errors::TrieNodeResult, TrieAccount, TrieNode, TrieProvider};
use alloy_primitives::{keccak256, Address, U256};
use alloy_rlp::Decodable;
use alloy_trie::Nibbles;

/// Reads the account stored for `address` under `state_root`.
pub fn account_at<P: TrieProvider>(
    state_root: alloy_primitives::B256,
    address: Address,
    provider: &P,
) -> TrieNodeResult<Option<TrieAccount>> {
    let path = Nibbles::unpack(keccak256(address));
    let Some(raw) = TrieNode::new_blinded(state_root).open(path.as_slice(), provider)? else {
        return Ok(None);
    };
    Ok(Some(TrieAccount::decode(&mut raw.as_ref())?))
}

/// Reads `slot` from the storage trie rooted at `storage_root`. Absent slots read as zero.
pub fn storage_at<P: TrieProvider>(
    storage_root: alloy_primitives::B256,
    slot: U256,
    provider: &P,
) -> TrieNodeResult<U256> {
    let path = Nibbles::unpack(keccak256(slot.to_be_bytes::<32>()));
    let Some(raw) = TrieNode::new_blinded(storage_root).open(path.as_slice(), provider)? else {
        return Ok(U256::ZERO);
    };
    Ok(U256::decode(&mut raw.as_ref())?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{build_state_trie, build_storage_trie, TrieNodeProvider};
    use alloy_primitives::{address, B256};

    #[test]
    fn test_account_and_storage_reads() {
        let (storage_root, storage_nodes) =
            build_storage_trie(&[(U256::from(1), U256::from(0xbeef)), (U256::from(7), U256::MAX)]);
        let account = TrieAccount {
            nonce: 3,
            balance: U256::from(100),
            storage_root,
            code_hash: B256::repeat_byte(0xcc),
        };
        let target = address!("4200000000000000000000000000000000000016");
        let (state_root, state_nodes) = build_state_trie(&[
            (target, account),
            (Address::repeat_byte(0x11), TrieAccount::default()),
        ]);

        let provider = TrieNodeProvider::new(state_nodes.into_iter().chain(storage_nodes).collect());

        assert_eq!(account_at(state_root, target, &provider).unwrap(), Some(account));
        assert_eq!(account_at(state_root, Address::repeat_byte(0x22), &provider).unwrap(), None);
        assert_eq!(storage_at(storage_root, U256::from(1), &provider).unwrap(), U256::from(0xbeef));
        assert_eq!(storage_at(storage_root, U256::from(7), &provider).unwrap(), U256::MAX);
        assert_eq!(storage_at(storage_root, U256::from(2), &provider).unwrap(), U256::ZERO);
    }
}
