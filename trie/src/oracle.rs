//! The preimage oracle: given a target nibble prefix, produce a storage
//! slot whose Keccak-256 hash starts with that prefix.
//!
//! Ported from `original_source/prefixes.py`: the precomputation table is
//! built once by scanning `n = 0..N`, keeping the first (smallest) `n`
//! that produces each prefix; anything not covered falls back to random
//! trial, optionally fanned out across worker threads.

use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use primitive_types::U256;
use rand::RngCore;
use tiny_keccak::{Hasher as _, Keccak};

fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(bytes);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Hex digest of `keccak256(slot.to_big_endian_bytes())` — the 64-nibble
/// key a proof for `slot` will be rooted at.
pub fn hex_digest(slot: U256) -> String {
    let mut bytes = [0u8; 32];
    slot.to_big_endian(&mut bytes);
    hex_of(&keccak256(&bytes))
}

fn hex_of(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Smallest-preimage-wins table mapping a hex prefix to an integer slot
/// whose Keccak-256 digest starts with it.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrecomputationTable {
    entries: HashMap<String, u128>,
}

/// Prefix lengths (in nibbles) recorded for every scanned integer, beyond
/// the full 64-nibble digest itself. Matches `prefixes.py`'s `range(1, 8)`.
const SHORT_PREFIX_LEN: usize = 7;

impl PrecomputationTable {
    /// Build a table from explicit `(prefix, slot)` pairs, bypassing a scan.
    /// Used to assemble fixtures around a handful of known slots rather than
    /// scanning millions of integers to stumble on them.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, u128)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    /// Build a table covering `n = 0..count`.
    pub fn build(count: u64) -> Self {
        let mut entries = HashMap::with_capacity(count as usize * 2);
        for n in 0..count {
            let slot = U256::from(n);
            let digest = hex_digest(slot);
            entries.entry(digest.clone()).or_insert(u128::from(n));
            for i in 1..=SHORT_PREFIX_LEN {
                entries.entry(digest[..i].to_string()).or_insert(u128::from(n));
            }
        }
        Self { entries }
    }

    /// Look up a slot known to produce a digest starting with `prefix`.
    pub fn get(&self, prefix: &str) -> Option<U256> {
        self.entries.get(prefix).copied().map(U256::from)
    }

    /// Number of distinct prefixes recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find a slot whose Keccak-256 digest starts with `prefix`, consulting
/// `table` first and falling back to random trial.
///
/// `parallelism` controls how many worker threads race the random-trial
/// fallback; `1` (the default) runs it on the calling thread. The first
/// thread to find a match cancels the others.
pub fn preimage_for(prefix: &str, table: &PrecomputationTable, parallelism: usize) -> U256 {
    if let Some(slot) = table.get(prefix) {
        return slot;
    }
    random_trial(prefix, parallelism.max(1))
}

fn random_trial(prefix: &str, parallelism: usize) -> U256 {
    let found = AtomicBool::new(false);
    let result = std::sync::Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..parallelism {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();
                let mut bytes = [0u8; 32];
                while !found.load(Ordering::Relaxed) {
                    rng.fill_bytes(&mut bytes);
                    let digest = hex_of(&keccak256(&bytes));
                    if digest.starts_with(prefix) {
                        if !found.swap(true, Ordering::SeqCst) {
                            *result.lock().unwrap() = Some(U256::from_big_endian(&bytes));
                        }
                        break;
                    }
                }
            });
        }
    });

    result.into_inner().unwrap().expect("at least one worker must find a match")
}
