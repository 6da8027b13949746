//! Error classification for the `eth_getProof` transport, adapted from
//! `chains/ethereum/rpc-client/src/error.rs`'s `jsonrpsee::core::Error`
//! translation (minus the websocket-reconnect variants, which a plain HTTP
//! client has no use for).

use thiserror::Error;

/// Failure modes for a single `eth_getProof` round trip.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never reached a JSON-RPC call/response exchange:
    /// connection refused, timed out, TLS failure, and so on.
    #[error("transport error: {0}")]
    Transport(#[source] jsonrpsee::core::Error),

    /// The node returned a JSON-RPC error object (bad params, method not
    /// found, node-side failure).
    #[error("rpc call failed: {0}")]
    Rpc(#[source] jsonrpsee::core::Error),

    /// The response body didn't parse into the shape this crate expects.
    #[error("failed to decode response: {0}")]
    Decode(#[source] jsonrpsee::core::Error),
}

impl From<jsonrpsee::core::Error> for RpcError {
    fn from(error: jsonrpsee::core::Error) -> Self {
        use jsonrpsee::core::Error as E;
        match error {
            E::Call(_) => Self::Rpc(error),
            E::ParseError(_) => Self::Decode(error),
            other => Self::Transport(other),
        }
    }
}
