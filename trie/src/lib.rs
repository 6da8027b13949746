//! Reconstructs the full contents of an Ethereum account's storage trie
//! at a historical block using only `eth_getProof`.
//!
//! The archive node exposes no bulk enumeration; the only observable is
//! "prove slot K belongs (or does not belong) to root R". This crate
//! walks the trie structure revealed in successive proofs, steering each
//! new probe toward a yet-unexplored subtree, until every leaf has been
//! folded into a reconstructed storage map whose recomputed root matches
//! the account's `storageHash`.
//!
//! Reconstructing the account trie, verifying proof integrity against the
//! root, recovering zeroed slots, and non-Ethereum trie variants are all
//! out of scope.

pub mod hp;
pub mod node;
pub mod oracle;
pub mod source;
pub mod trie_root;
pub mod walker;

pub use node::{parse_node, NodeError, ProofNode};
pub use oracle::{preimage_for, PrecomputationTable};
pub use source::{EIP1186ProofResponse, StorageProof, StorageProofSource};
pub use walker::{reconstruct, Reconstruction, WalkError};
