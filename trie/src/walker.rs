//! The Frontier Walker: holds the growing reconstructed storage map and
//! the frontier of unexplored trie prefixes, and repeatedly requests a
//! proof under the next unexplored prefix until the reconstructed root
//! matches the account's `storageHash`.

use std::collections::{BTreeMap, BTreeSet};

use primitive_types::{H160, H256, U256};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::{
    hp::hex_to_nibbles,
    node::{parse_node, NodeError, ProofNode},
    oracle::{hex_digest, preimage_for, PrecomputationTable},
    source::StorageProofSource,
    trie_root::compute_root,
};

/// Fatal reconstruction errors (spec section "Error Handling Design").
///
/// `MalformedNode`/`MalformedLeafPath` carry the offending proof element's
/// raw bytes alongside its index, per spec.md §7's "reported with the
/// failing proof index and offending node bytes".
#[derive(Debug, Error)]
pub enum WalkError<E: std::error::Error + 'static> {
    #[error("proof element {proof_index} is malformed: {source} (node bytes: {node_bytes:x?})")]
    MalformedNode { proof_index: usize, node_bytes: Vec<u8>, source: NodeError },
    #[error(
        "leaf path at proof element {proof_index} has {len} nibbles, expected 64 (node bytes: {node_bytes:x?})"
    )]
    MalformedLeafPath { proof_index: usize, len: usize, node_bytes: Vec<u8> },
    #[error("frontier exhausted but reconstructed root does not match storageHash")]
    FrontierExhausted,
    #[error("rpc adapter failed: {0}")]
    Rpc(#[source] E),
}

/// The outcome of a successful reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub root: H256,
    pub storage: BTreeMap<H256, Vec<u8>>,
}

/// Holds the fold loop's working state for one `reconstruct` call.
struct WalkerState {
    storage: BTreeMap<H256, Vec<u8>>,
    frontier: BTreeSet<String>,
    visited: BTreeSet<String>,
}

impl WalkerState {
    fn new() -> Self {
        Self { storage: BTreeMap::new(), frontier: BTreeSet::new(), visited: BTreeSet::new() }
    }

    fn reconstructed_root(&self) -> H256 {
        compute_root(self.storage.iter())
    }
}

/// Fold one proof (an ordered list of RLP-encoded trie nodes) into the
/// walker state, steered by `probe_key` (the 64-nibble hex key the proof
/// was requested for).
fn fold_proof<E: std::error::Error + 'static>(
    state: &mut WalkerState,
    proof: &[Vec<u8>],
    probe_key: &str,
) -> Result<(), WalkError<E>> {
    let mut current_prefix = String::new();
    let mut past_leaf = false;

    for (proof_index, node_bytes) in proof.iter().enumerate() {
        if past_leaf {
            return Err(WalkError::MalformedNode {
                proof_index,
                node_bytes: node_bytes.clone(),
                source: NodeError::ProofContinuesPastLeaf,
            });
        }

        let old_prefix = current_prefix.clone();
        // Load-bearing: mark the prefix visited *before* processing the
        // node, so the root (empty prefix) is visited immediately. This
        // matters for branches directly under the root.
        state.visited.insert(old_prefix.clone());

        let node = parse_node(node_bytes).map_err(|source| WalkError::MalformedNode {
            proof_index,
            node_bytes: node_bytes.clone(),
            source,
        })?;

        match node {
            ProofNode::Branch { children } => {
                for (nibble, child) in children.iter().enumerate() {
                    if child.is_none() {
                        continue;
                    }
                    let sibling = format!("{old_prefix}{nibble:x}");
                    if !probe_key.starts_with(&sibling) && !state.visited.contains(&sibling) {
                        state.frontier.insert(sibling);
                    }
                }
                current_prefix = probe_key[..old_prefix.len() + 1].to_string();
            },
            ProofNode::Extension { fragment, .. } => {
                let child_prefix = format!("{old_prefix}{fragment}");
                if !probe_key.starts_with(&child_prefix) && !state.visited.contains(&child_prefix)
                {
                    state.frontier.insert(child_prefix.clone());
                }
                current_prefix = child_prefix;
            },
            ProofNode::Leaf { fragment, value } => {
                let full_path = format!("{old_prefix}{fragment}");
                if full_path.len() != 64 {
                    return Err(WalkError::MalformedLeafPath {
                        proof_index,
                        len: full_path.len(),
                        node_bytes: node_bytes.clone(),
                    });
                }
                let key_bytes = hex_to_nibbles(&full_path)
                    .chunks(2)
                    .map(|pair| (pair[0] << 4) | pair[1])
                    .collect::<Vec<u8>>();
                let key = H256::from_slice(&key_bytes);
                state.storage.insert(key, value);
                state.visited.insert(full_path);
                past_leaf = true;
            },
            ProofNode::Empty => {
                past_leaf = true;
            },
        }
    }
    Ok(())
}

/// Reconstruct the full contents of `address`'s storage trie at `block`,
/// using `rpc` to fetch proofs and `oracle`/`table` to steer each probe
/// toward an unexplored subtree.
#[instrument(skip(rpc, table), fields(%address, block))]
pub async fn reconstruct<S>(
    address: H160,
    block: u64,
    rpc: &S,
    table: &PrecomputationTable,
    parallelism: usize,
) -> Result<Reconstruction, WalkError<S::Error>>
where
    S: StorageProofSource,
{
    let mut state = WalkerState::new();

    let mut slot = U256::zero();
    let response = rpc.get_proof(address, slot, block).await.map_err(WalkError::Rpc)?;
    let storage_hash = response.storage_hash;
    let mut proof = response
        .storage_proof
        .into_iter()
        .next()
        .map(|p| p.proof)
        .unwrap_or_default();
    let mut probe_key = hex_digest(slot);

    loop {
        fold_proof(&mut state, &proof, &probe_key)?;

        if state.reconstructed_root() == storage_hash {
            debug!(slots = state.storage.len(), "reconstruction complete");
            return Ok(Reconstruction { root: storage_hash, storage: state.storage });
        }

        let Some(prefix) = state.frontier.pop_first() else {
            error!("frontier exhausted without matching storageHash");
            return Err(WalkError::FrontierExhausted);
        };

        slot = preimage_for(&prefix, table, parallelism);
        probe_key = hex_digest(slot);
        debug!(%prefix, %probe_key, frontier_len = state.frontier.len(), "probing");

        let response = rpc.get_proof(address, slot, block).await.map_err(WalkError::Rpc)?;
        if response.storage_hash != storage_hash {
            warn!("storageHash changed mid-reconstruction; archive node may be unstable");
        }
        proof = response
            .storage_proof
            .into_iter()
            .next()
            .map(|p| p.proof)
            .unwrap_or_default();
    }
}
