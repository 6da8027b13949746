//! End-to-end reconstruction against small reference tries served by a
//! mock [`StorageProofSource`], exercising the real `reconstruct` fold
//! loop rather than its internals directly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use primitive_types::{H160, H256, U256};
use rlp::RlpStream;
use storage_trie_recon::{
    hp::{encode_hp, hex_to_nibbles},
    oracle::{hex_digest, PrecomputationTable},
    reconstruct,
    source::{EIP1186ProofResponse, StorageProof, StorageProofSource},
    trie_root::{compute_root, empty_root},
    WalkError,
};
use tiny_keccak::{Hasher as _, Keccak};

fn keccak(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(bytes);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// A minimal Merkle-Patricia trie built directly from 64-nibble-keyed
/// entries, used only to hand the walker realistic proof arrays. Child
/// references are always hashes, regardless of size: the walker never
/// validates them, so the inline-node optimization real clients use would
/// only add complexity here for no behavioral difference.
enum RefNode {
    Leaf { fragment: Vec<u8>, value: Vec<u8> },
    Extension { fragment: Vec<u8>, child: Box<RefNode> },
    Branch { children: [Option<Box<RefNode>>; 16] },
}

impl RefNode {
    fn encode(&self) -> Vec<u8> {
        match self {
            RefNode::Leaf { fragment, value } => {
                let mut s = RlpStream::new_list(2);
                s.append(&encode_hp(fragment, true));
                s.append(value);
                s.out().to_vec()
            },
            RefNode::Extension { fragment, child } => {
                let mut s = RlpStream::new_list(2);
                s.append(&encode_hp(fragment, false));
                s.append(&keccak(&child.encode()).to_vec());
                s.out().to_vec()
            },
            RefNode::Branch { children } => {
                let mut s = RlpStream::new_list(17);
                for child in children {
                    match child {
                        Some(node) => {
                            s.append(&keccak(&node.encode()).to_vec());
                        },
                        None => {
                            s.append_empty_data();
                        },
                    }
                }
                s.append_empty_data();
                s.out().to_vec()
            },
        }
    }

    /// Collect the root-to-target proof array for `target` (64 nibbles).
    /// Stops where the real trie would: at an absent branch slot or a
    /// diverging extension.
    fn proof_path(&self, target: &[u8], acc: &mut Vec<Vec<u8>>) {
        acc.push(self.encode());
        match self {
            RefNode::Leaf { .. } => {},
            RefNode::Extension { fragment, child } => {
                if target.starts_with(fragment.as_slice()) {
                    child.proof_path(&target[fragment.len()..], acc);
                }
            },
            RefNode::Branch { children } => {
                if let Some(Some(child)) = children.get(target[0] as usize) {
                    child.proof_path(&target[1..], acc);
                }
            },
        }
    }
}

/// Build the unique compact trie for a set of (nibbles, value) entries. All
/// keys are expected to be the same length (64, as with hashed storage
/// keys), so no entry is ever a strict prefix of another.
fn build_trie(entries: &[(Vec<u8>, Vec<u8>)]) -> Option<RefNode> {
    if entries.is_empty() {
        return None;
    }
    let refs: Vec<(&[u8], &[u8])> =
        entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())).collect();
    Some(build(&refs))
}

fn build(entries: &[(&[u8], &[u8])]) -> RefNode {
    if entries.len() == 1 {
        return RefNode::Leaf { fragment: entries[0].0.to_vec(), value: entries[0].1.to_vec() };
    }
    let common = common_prefix_len(entries);
    if common > 0 {
        let stripped: Vec<(&[u8], &[u8])> =
            entries.iter().map(|(k, v)| (&k[common..], *v)).collect();
        RefNode::Extension {
            fragment: entries[0].0[..common].to_vec(),
            child: Box::new(build_branch(&stripped)),
        }
    } else {
        build_branch(entries)
    }
}

fn build_branch(entries: &[(&[u8], &[u8])]) -> RefNode {
    let mut children: [Option<Box<RefNode>>; 16] = Default::default();
    for nibble in 0u8..16 {
        let group: Vec<(&[u8], &[u8])> = entries
            .iter()
            .filter(|(k, _)| k[0] == nibble)
            .map(|(k, v)| (&k[1..], *v))
            .collect();
        if !group.is_empty() {
            children[nibble as usize] = Some(Box::new(build(&group)));
        }
    }
    RefNode::Branch { children }
}

fn common_prefix_len(entries: &[(&[u8], &[u8])]) -> usize {
    let first = entries[0].0;
    let mut len = 0;
    while len < first.len() && entries.iter().all(|(k, _)| k.get(len) == Some(&first[len])) {
        len += 1;
    }
    len
}

fn digest_nibbles(digest: &str) -> Vec<u8> {
    hex_to_nibbles(digest)
}

fn find_slot_with_prefix(prefix: &str, exclude: U256, cap: u64) -> U256 {
    for n in 0..cap {
        let candidate = U256::from(n);
        if candidate == exclude {
            continue;
        }
        let digest = hex_digest(candidate);
        if digest.starts_with(prefix) {
            return candidate;
        }
    }
    panic!("no slot found with prefix {prefix} within {cap} candidates");
}

struct MockSource {
    storage_hash: H256,
    /// slot -> (key nibbles, proof)
    responses: BTreeMap<U256, (Vec<u8>, Vec<Vec<u8>>)>,
    calls: AtomicUsize,
}

#[derive(Debug, thiserror::Error)]
#[error("slot not found in mock fixture")]
struct MockError;

#[async_trait]
impl StorageProofSource for MockSource {
    type Error = MockError;

    async fn get_proof(
        &self,
        _address: H160,
        slot: U256,
        _block: u64,
    ) -> Result<EIP1186ProofResponse, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (_key_nibbles, proof) = self.responses.get(&slot).ok_or(MockError)?;
        Ok(EIP1186ProofResponse {
            address: _address,
            storage_hash: self.storage_hash,
            storage_proof: vec![StorageProof { key: slot, proof: proof.clone(), value: U256::zero() }],
        })
    }
}

fn expected_storage(entries: &[(Vec<u8>, Vec<u8>)]) -> BTreeMap<H256, Vec<u8>> {
    entries
        .iter()
        .map(|(nibbles, value)| {
            let bytes: Vec<u8> =
                nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect();
            (H256::from_slice(&bytes), value.clone())
        })
        .collect()
}

#[tokio::test]
async fn empty_storage_terminates_in_one_call() {
    let source = MockSource {
        storage_hash: empty_root(),
        responses: BTreeMap::from([(U256::zero(), (vec![], vec![]))]),
        calls: AtomicUsize::new(0),
    };
    let table = PrecomputationTable::default();
    let result = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap();
    assert!(result.storage.is_empty());
    assert_eq!(result.root, empty_root());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_slot_terminates_in_one_call() {
    let digest0 = hex_digest(U256::zero());
    let nibbles0 = digest_nibbles(&digest0);
    let value0 = vec![0x2a];
    let entries = vec![(nibbles0.clone(), value0.clone())];
    let trie = build_trie(&entries).unwrap();
    let mut proof = Vec::new();
    trie.proof_path(&nibbles0, &mut proof);

    let storage_hash = compute_root(expected_storage(&entries).iter());
    let source = MockSource {
        storage_hash,
        responses: BTreeMap::from([(U256::zero(), (nibbles0, proof))]),
        calls: AtomicUsize::new(0),
    };
    let table = PrecomputationTable::default();
    let result = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap();
    assert_eq!(result.storage, expected_storage(&entries));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn two_sibling_leaves_take_exactly_two_calls() {
    let slot0 = U256::zero();
    let digest0 = hex_digest(slot0);
    let first_nibble = &digest0[..1];
    // find a slot whose digest starts with a *different* first nibble.
    let complementary = (0..16u8)
        .map(|n| format!("{n:x}"))
        .find(|n| n != first_nibble)
        .unwrap();
    let slot1 = find_slot_with_prefix(&complementary, slot0, 1_000_000);
    let digest1 = hex_digest(slot1);

    let nibbles0 = digest_nibbles(&digest0);
    let nibbles1 = digest_nibbles(&digest1);
    let value0 = vec![0x2a];
    let value1 = vec![0x7b];
    let entries = vec![(nibbles0.clone(), value0), (nibbles1.clone(), value1)];
    let trie = build_trie(&entries).unwrap();

    let mut proof0 = Vec::new();
    trie.proof_path(&nibbles0, &mut proof0);
    let mut proof1 = Vec::new();
    trie.proof_path(&nibbles1, &mut proof1);

    let storage_hash = compute_root(expected_storage(&entries).iter());
    let table = PrecomputationTable::from_entries([(complementary, slot1.as_u128())]);
    let source = MockSource {
        storage_hash,
        responses: BTreeMap::from([
            (slot0, (nibbles0, proof0)),
            (slot1, (nibbles1, proof1)),
        ]),
        calls: AtomicUsize::new(0),
    };
    let result = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap();
    assert_eq!(result.storage, expected_storage(&entries));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

/// 256 leaves under a single root branch: one per top nibble, times 16 —
/// the root branch's children are themselves branches, each holding 16
/// leaves. Every (nibble0, nibble1) combination is populated, so every
/// probe this fixture ever answers lands on a real, if not yet known,
/// leaf: the algorithm never wastes a call on a structurally-absent path,
/// and termination takes exactly 256 round trips (one per leaf).
#[tokio::test]
async fn two_hundred_fifty_six_leaves_under_root_branch_take_256_calls() {
    let mut slots = [[U256::zero(); 16]; 16];
    let mut entries = Vec::new();
    let mut table_entries = Vec::new();
    for (n0, row) in slots.iter_mut().enumerate() {
        for (n1, slot_cell) in row.iter_mut().enumerate() {
            let prefix = format!("{n0:x}{n1:x}");
            let slot = find_slot_with_prefix(&prefix, U256::MAX, 200_000);
            let digest = hex_digest(slot);
            entries.push((digest_nibbles(&digest), vec![u8::try_from(n0 * 16 + n1).unwrap()]));
            table_entries.push((prefix, slot.as_u128()));
            *slot_cell = slot;
        }
        // exploring the bare top nibble resolves to this group's nibble1=0
        // leaf, exactly as the fold loop's own branch-descent would.
        table_entries.push((format!("{n0:x}"), row[0].as_u128()));
    }
    let trie = build_trie(&entries).unwrap();

    let mut responses = BTreeMap::new();
    for row in &slots {
        for &slot in row {
            let digest = hex_digest(slot);
            let mut proof = Vec::new();
            trie.proof_path(&digest_nibbles(&digest), &mut proof);
            responses.insert(slot, (digest_nibbles(&digest), proof));
        }
    }
    if !responses.contains_key(&U256::zero()) {
        let digest0 = hex_digest(U256::zero());
        let mut proof = Vec::new();
        trie.proof_path(&digest_nibbles(&digest0), &mut proof);
        responses.insert(U256::zero(), (vec![], proof));
    }

    let storage_hash = compute_root(expected_storage(&entries).iter());
    let table = PrecomputationTable::from_entries(table_entries);
    let source = MockSource { storage_hash, responses, calls: AtomicUsize::new(0) };
    let result = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap();
    assert_eq!(result.storage, expected_storage(&entries));
    assert_eq!(source.calls.load(Ordering::SeqCst), 256);
}

#[tokio::test]
async fn reconstruct_is_idempotent() {
    let digest0 = hex_digest(U256::zero());
    let nibbles0 = digest_nibbles(&digest0);
    let value0 = vec![0x2a];
    let entries = vec![(nibbles0.clone(), value0)];
    let trie = build_trie(&entries).unwrap();
    let mut proof = Vec::new();
    trie.proof_path(&nibbles0, &mut proof);

    let storage_hash = compute_root(expected_storage(&entries).iter());
    let table = PrecomputationTable::default();
    let source = MockSource {
        storage_hash,
        responses: BTreeMap::from([(U256::zero(), (nibbles0, proof))]),
        calls: AtomicUsize::new(0),
    };

    let first = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap();
    let second = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn malformed_proof_node_is_reported_as_fatal() {
    let source = MockSource {
        storage_hash: empty_root(),
        responses: BTreeMap::from([(U256::zero(), (vec![], vec![vec![0xc1, 0x01]]))]),
        calls: AtomicUsize::new(0),
    };
    let table = PrecomputationTable::default();
    let err = reconstruct(H160::zero(), 1, &source, &table, 1).await.unwrap_err();
    assert!(matches!(err, WalkError::MalformedNode { proof_index: 0, .. }));
}
