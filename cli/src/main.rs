//! Command-line front end: parses the target address and RPC endpoint,
//! drives the frontier walker to completion, and prints the recovered
//! storage slots.
//!
//! Argument/logging shape ported from `rosetta-cli`'s `clap` derive +
//! `env_logger::init()` pattern, with a `tracing_subscriber` layer added
//! on top (as in `chains/ethereum/playground`'s `main.rs`) so the library
//! crates' `tracing` spans surface through the same output.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use primitive_types::H160;
use storage_trie_recon::{reconstruct, PrecomputationTable};
use storage_trie_recon_rpc::JsonRpcClient;
use tracing_log::LogTracer;

/// Reconstructs an Ethereum account's storage trie using only `eth_getProof`.
#[derive(Parser)]
struct Opts {
    /// 0x-prefixed contract address to reconstruct storage for.
    address: String,

    /// Archive node JSON-RPC endpoint.
    #[clap(long)]
    rpc_url: url::Url,

    /// Block number to query at.
    #[clap(long)]
    block: u64,

    /// Number of integers to scan when building the preimage
    /// precomputation table.
    #[clap(long, default_value_t = 1_000_000)]
    precomputation_size: u64,

    /// Persist/reuse the precomputation table at `precomputation.bin`
    /// instead of rebuilding it every run.
    #[clap(long)]
    save_precomputation: bool,

    /// Worker thread count for the oracle's random-trial fallback.
    #[clap(long, default_value_t = 1)]
    precomputation_parallelism: usize,
}

const PRECOMPUTATION_FILE: &str = "precomputation.bin";

fn load_or_build_table(opts: &Opts) -> Result<PrecomputationTable> {
    let path = PathBuf::from(PRECOMPUTATION_FILE);
    if opts.save_precomputation && path.exists() {
        log::info!("loading precomputation table from {PRECOMPUTATION_FILE}");
        let bytes = fs::read(&path).context("reading precomputation.bin")?;
        return bincode::deserialize(&bytes).context("decoding precomputation.bin");
    }

    log::info!("building precomputation table for n=0..{}", opts.precomputation_size);
    let table = PrecomputationTable::build(opts.precomputation_size);

    if opts.save_precomputation {
        let bytes = bincode::serialize(&table).context("encoding precomputation table")?;
        fs::write(&path, bytes).context("writing precomputation.bin")?;
        log::info!("saved precomputation table to {PRECOMPUTATION_FILE}");
    }

    Ok(table)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let _ = LogTracer::init();
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();

    let address = opts
        .address
        .parse::<H160>()
        .with_context(|| format!("'{}' is not a valid 20-byte hex address", opts.address))?;

    let table = load_or_build_table(&opts)?;
    let rpc = JsonRpcClient::new(opts.rpc_url.as_str())
        .with_context(|| format!("connecting to {}", opts.rpc_url))?;

    log::info!("reconstructing storage for {address:?} at block {}", opts.block);
    let reconstruction =
        reconstruct(address, opts.block, &rpc, &table, opts.precomputation_parallelism)
            .await
            .context("reconstruction failed")?;

    println!("hashed_key\tpreimage\tvalue");
    for (key, value) in &reconstruction.storage {
        let key_hex = hex_encode(key.as_bytes());
        let preimage = table
            .get(&key_hex)
            .map(|slot| slot.to_string())
            .unwrap_or_else(|| "None".to_string());
        let decoded_value: Vec<u8> =
            rlp::decode(value).context("decoding a recovered slot's RLP value")?;
        println!("{key_hex}\t{preimage}\t{}", hex_encode(&decoded_value));
    }

    Ok(())
}
