//! The literal JSON shape of an `eth_getProof` response, and its
//! conversion into [`storage_trie_recon::source::EIP1186ProofResponse`].
//!
//! Trimmed from `chains/ethereum/primitives/src/storage_proof.rs`'s
//! `EIP1186ProofResponse`/`StorageProof`: `key`/`value`/`storageHash`
//! already deserialize as 0x-hex through `primitive-types`'s `serde`
//! feature, but `proof` arrives as a list of 0x-hex strings rather than
//! the decoded bytes the core crate works with, so this layer owns that
//! one conversion.

use primitive_types::{H160, H256, U256};
use serde::Deserialize;
use storage_trie_recon::source::{EIP1186ProofResponse, StorageProof};

use crate::error::RpcError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireStorageProof {
    key: U256,
    proof: Vec<String>,
    value: U256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireProofResponse {
    address: H160,
    storage_hash: H256,
    storage_proof: Vec<WireStorageProof>,
}

fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, RpcError> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(invalid_hex(s));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| invalid_hex(s)))
        .collect()
}

fn invalid_hex(s: &str) -> RpcError {
    RpcError::Decode(jsonrpsee::core::Error::Custom(format!(
        "proof element is not valid hex: {s}"
    )))
}

impl TryFrom<WireProofResponse> for EIP1186ProofResponse {
    type Error = RpcError;

    fn try_from(wire: WireProofResponse) -> Result<Self, Self::Error> {
        let storage_proof = wire
            .storage_proof
            .into_iter()
            .map(|sp| {
                let proof =
                    sp.proof.iter().map(|hex| decode_hex_bytes(hex)).collect::<Result<_, _>>()?;
                Ok(StorageProof { key: sp.key, proof, value: sp.value })
            })
            .collect::<Result<Vec<_>, RpcError>>()?;
        Ok(EIP1186ProofResponse { address: wire.address, storage_hash: wire.storage_hash, storage_proof })
    }
}
