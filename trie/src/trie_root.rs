//! Recomputes the Merkle-Patricia root of the accumulated storage map, so
//! the fold loop can test `reconstructed_root == storageHash` without
//! depending on a full `trie-db` trie implementation.
//!
//! `KeccakHasher` and `Hash256RlpTrieStream` are ported from
//! `chains/ethereum/trie/src/{hasher,trie_stream}.rs`; the stream's
//! hex-prefix encoding now goes through [`crate::hp::encode_hp`] instead
//! of a second private copy of the same algorithm.

use hash256_std_hasher::Hash256StdHasher;
pub use hash_db::Hasher;
use primitive_types::H256;
use rlp::RlpStream;
use tiny_keccak::Keccak;
use trie_root::{TrieStream, Value};

use crate::hp::encode_hp;

/// Keccak-256, as [`hash_db::Hasher`] needs it.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeccakHasher;

impl Hasher for KeccakHasher {
    type Out = H256;
    type StdHasher = Hash256StdHasher;
    const LENGTH: usize = 32;

    fn hash(x: &[u8]) -> Self::Out {
        use tiny_keccak::Hasher as _;
        let mut keccak256 = Keccak::v256();
        keccak256.update(x);
        let mut out = [0; 32];
        keccak256.finalize(&mut out);
        H256(out)
    }
}

/// `TrieStream` impl for the ethereum storage trie's RLP node encoding.
#[derive(Default)]
pub struct Hash256RlpTrieStream {
    stream: RlpStream,
}

impl TrieStream for Hash256RlpTrieStream {
    fn new() -> Self {
        Self { stream: RlpStream::new() }
    }

    fn append_empty_data(&mut self) {
        self.stream.append_empty_data();
    }

    fn begin_branch(
        &mut self,
        _maybe_key: Option<&[u8]>,
        _maybe_value: Option<Value>,
        _has_children: impl Iterator<Item = bool>,
    ) {
        self.stream.begin_list(17);
    }

    fn append_empty_child(&mut self) {
        self.stream.append_empty_data();
    }

    fn end_branch(&mut self, value: Option<Value>) {
        match value {
            Some(Value::Inline(value) | Value::Node(value)) => {
                self.stream.append(&value);
            },
            None => {
                self.stream.append_empty_data();
            },
        };
    }

    fn append_leaf(&mut self, key: &[u8], value: Value) {
        self.stream.begin_list(2);
        self.stream.append(&encode_hp(key, true));
        match value {
            Value::Inline(value) | Value::Node(value) => {
                self.stream.append(&value);
            },
        };
    }

    fn append_extension(&mut self, key: &[u8]) {
        self.stream.begin_list(2);
        self.stream.append(&encode_hp(key, false));
    }

    fn append_substream<H: Hasher>(&mut self, other: Self) {
        let out = other.out();
        match out.len() {
            0..=31 => self.stream.append_raw(&out, 1),
            _ => self.stream.append(&H::hash(&out).as_ref()),
        };
    }

    fn out(self) -> Vec<u8> {
        self.stream.out().to_vec()
    }
}

/// Recompute the trie root for a set of `(32-byte key, RLP-encoded value)`
/// pairs, exactly as if they had been inserted into a fresh Ethereum
/// storage trie.
pub fn compute_root<'a>(storage: impl IntoIterator<Item = (&'a H256, &'a Vec<u8>)>) -> H256 {
    trie_root::trie_root::<KeccakHasher, Hash256RlpTrieStream, _, _, _>(
        storage.into_iter().map(|(k, v)| (k.as_bytes(), v.as_slice())),
        None,
    )
}

/// The root hash of the empty storage trie: `keccak256(rlp(""))`.
pub fn empty_root() -> H256 {
    KeccakHasher::hash(&[0x80])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_storage_matches_known_empty_root() {
        let root = compute_root(std::iter::empty());
        assert_eq!(root, empty_root());
    }

    #[test]
    fn single_entry_root_is_deterministic() {
        let key = H256::from_low_u64_be(1);
        let value = rlp::encode(&42u64).to_vec();
        let storage = vec![(&key, &value)];
        let root_a = compute_root(storage.iter().map(|(k, v)| (*k, *v)));
        let root_b = compute_root(storage.into_iter());
        assert_eq!(root_a, root_b);
        assert_ne!(root_a, empty_root());
    }
}
