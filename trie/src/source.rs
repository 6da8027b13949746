//! The port the Frontier Walker depends on: "prove that slot K belongs (or
//! does not belong) to root R". Concrete `eth_getProof` transports (a
//! jsonrpsee HTTP client, a mock fixture in tests) implement
//! [`StorageProofSource`]; the walker never talks to the network directly.
//!
//! Wire types are trimmed down from
//! `chains/ethereum/primitives/src/storage_proof.rs`'s
//! `EIP1186ProofResponse`/`StorageProof` to the fields this system reads.

use async_trait::async_trait;
use primitive_types::{H160, H256, U256};

/// One slot's storage proof, as returned under `storageProof` in an
/// `eth_getProof` response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StorageProof {
    pub key: U256,
    pub proof: Vec<Vec<u8>>,
    pub value: U256,
}

/// The response shape of `eth_getProof`, trimmed to the account-level
/// storage root and the single slot's proof this system ever requests.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct EIP1186ProofResponse {
    pub address: H160,
    pub storage_hash: H256,
    pub storage_proof: Vec<StorageProof>,
}

/// Translates `(address, slot, block) -> proof bundle`. The one operation
/// the core depends on from the RPC layer (spec section "External
/// Interfaces").
#[async_trait]
pub trait StorageProofSource {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get_proof(
        &self,
        address: H160,
        slot: U256,
        block: u64,
    ) -> Result<EIP1186ProofResponse, Self::Error>;
}
