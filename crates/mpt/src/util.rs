//! Trie construction helpers.

use alloc::vec::Vec;
use alloy_rlp::{BufMut, Encodable};
use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles};

/// Builds the derivable-list trie of `items`, encoding each with `encode`. Every intermediate node
/// is retained and can be taken from the returned [HashBuilder] with
/// [HashBuilder::take_proof_nodes].
pub fn ordered_trie_with_encoder<T, F>(items: &[T], mut encode: F) -> HashBuilder
where
    F: FnMut(&T, &mut dyn BufMut),
{
    let len = items.len();
    let key_of = |position: usize| {
        Nibbles::unpack(alloy_rlp::encode(adjust_index_for_rlp(position, len)))
    };

    let retainer = ProofRetainer::new((0..len).map(key_of).collect());
    let mut builder = HashBuilder::default().with_proof_retainer(retainer);

    let mut value = Vec::new();
    for position in 0..len {
        value.clear();
        encode(&items[adjust_index_for_rlp(position, len)], &mut value);
        builder.add_leaf(key_of(position), &value);
    }
    builder
}

/// Maps the `position`-th key in nibble order back to its list index. RLP encodes index 0 as
/// `0x80`, which sorts after `0x7f`.
pub(crate) const fn adjust_index_for_rlp(position: usize, len: usize) -> usize {
    if position > 0x7f {
        position
    } else if position == 0x7f || position + 1 == len {
        0
    } else {
        position + 1
    }
}
