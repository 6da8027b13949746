//! HTTP `eth_getProof` transport implementing `storage_trie_recon`'s
//! `StorageProofSource` port, following the module layout of
//! `chains/ethereum/rpc-client`.

mod client;
mod error;
mod wire;

pub use client::JsonRpcClient;
pub use error::RpcError;
