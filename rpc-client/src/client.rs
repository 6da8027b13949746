//! The concrete `eth_getProof` transport: a plain HTTP `jsonrpsee` client.
//!
//! Ported from `chains/ethereum/backend/src/jsonrpsee.rs`'s `get_proof`
//! (the `rpc_params![...]` + `ClientT::request` call shape) and
//! `chains/ethereum/rpc-client/src/client.rs`'s request/error plumbing,
//! adapted from a reconnecting websocket client to a stateless HTTP one:
//! there is nothing to reconnect, so the `ArcSwapOption`/`DashMap`
//! machinery the teacher needed for subscriptions has no counterpart here.

use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use primitive_types::{H160, U256};
use storage_trie_recon::source::{EIP1186ProofResponse, StorageProofSource};
use tracing::debug;

use crate::{error::RpcError, wire::WireProofResponse};

/// A stateless `eth_getProof` client over plain HTTP.
#[derive(Debug)]
pub struct JsonRpcClient {
    inner: HttpClient,
}

impl JsonRpcClient {
    /// Connect to an HTTP(S) JSON-RPC endpoint.
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let inner = HttpClientBuilder::default().build(url).map_err(RpcError::from)?;
        Ok(Self { inner })
    }
}

fn block_tag(block: u64) -> String {
    format!("0x{block:x}")
}

fn storage_key(slot: U256) -> String {
    let mut bytes = [0u8; 32];
    slot.to_big_endian(&mut bytes);
    format!("0x{}", bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[async_trait]
impl StorageProofSource for JsonRpcClient {
    type Error = RpcError;

    async fn get_proof(
        &self,
        address: H160,
        slot: U256,
        block: u64,
    ) -> Result<EIP1186ProofResponse, Self::Error> {
        let params = rpc_params![address, [storage_key(slot)], block_tag(block)];
        debug!(%address, %slot, block, "eth_getProof");
        let wire: WireProofResponse =
            ClientT::request(&self.inner, "eth_getProof", params).await.map_err(RpcError::from)?;
        EIP1186ProofResponse::try_from(wire)
    }
}
