//! Parses one RLP-decoded trie node from a proof and classifies it as a
//! branch, extension, or leaf.

use rlp::{DecoderError, Prototype, Rlp};
use thiserror::Error;

use crate::hp::{decode_hp, nibbles_to_hex};

/// A single trie node, as obtained by RLP-decoding one element of an
/// `eth_getProof` proof array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofNode {
    /// 17-entry branch. `children[n]` is the raw RLP of the child reference
    /// (a 32-byte hash or an inlined node) under nibble `n`, if present.
    Branch { children: [Option<Vec<u8>>; 16] },
    /// Extension node. `fragment` is the shared nibble path, rendered as
    /// lowercase hex digits.
    Extension { fragment: String, child: Vec<u8> },
    /// Leaf node. `fragment` completes the 64-nibble key path; `value` is
    /// the RLP-encoded storage word.
    Leaf { fragment: String, value: Vec<u8> },
    /// The empty trie node (`rlp("")`). Only ever seen as the sole proof
    /// element for an account whose storage trie has never held a slot.
    Empty,
}

/// Fatal errors produced while parsing a proof node. The oracle (archive
/// node) is assumed honest; any of these indicates its response cannot be
/// reconciled with a valid Merkle-Patricia trie node.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NodeError {
    #[error("proof node is not a valid RLP-encoded trie node: {0}")]
    MalformedNode(#[from] DecoderError),
    #[error("branch node has a non-empty value at index 16, which storage tries never produce")]
    UnexpectedBranchValue,
    #[error("extension/leaf node has an empty hex-prefix fragment")]
    EmptyFragment,
    #[error("proof continues after a leaf node, which is always terminal")]
    ProofContinuesPastLeaf,
}

/// Parse one RLP-encoded proof element into a [`ProofNode`].
pub fn parse_node(rlp_bytes: &[u8]) -> Result<ProofNode, NodeError> {
    let rlp = Rlp::new(rlp_bytes);
    match rlp.prototype()? {
        Prototype::List(2) => parse_extension_or_leaf(&rlp),
        Prototype::List(17) => parse_branch(&rlp),
        Prototype::Data(0) => Ok(ProofNode::Empty),
        _ => Err(NodeError::MalformedNode(DecoderError::Custom(
            "proof node must be a 2-item or 17-item RLP list",
        ))),
    }
}

fn parse_extension_or_leaf(rlp: &Rlp) -> Result<ProofNode, NodeError> {
    let hp_bytes: Vec<u8> = rlp.at(0)?.data()?.to_vec();
    let (nibbles, is_leaf) = decode_hp(&hp_bytes).map_err(|_| {
        NodeError::MalformedNode(DecoderError::Custom("invalid hex-prefix encoding"))
    })?;
    if nibbles.is_empty() && !is_leaf {
        return Err(NodeError::EmptyFragment);
    }
    let fragment = nibbles_to_hex(&nibbles);
    let second = rlp.at(1)?;
    if is_leaf {
        let value = second.data()?.to_vec();
        Ok(ProofNode::Leaf { fragment, value })
    } else {
        let child = second.as_raw().to_vec();
        Ok(ProofNode::Extension { fragment, child })
    }
}

fn parse_branch(rlp: &Rlp) -> Result<ProofNode, NodeError> {
    let mut children: [Option<Vec<u8>>; 16] = Default::default();
    for (i, slot) in children.iter_mut().enumerate() {
        let child = rlp.at(i)?;
        if !child.is_empty() {
            *slot = Some(child.as_raw().to_vec());
        }
    }
    let value = rlp.at(16)?;
    if !value.is_empty() {
        return Err(NodeError::UnexpectedBranchValue);
    }
    Ok(ProofNode::Branch { children })
}
