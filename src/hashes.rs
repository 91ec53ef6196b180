//! Digest helpers

use crate::types::{Hash, Hash160};
use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA256(SHA256(x))
pub fn double_sha256(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha256_hash = Sha256::digest(data);
    let ripemd160_hash = Ripemd160::digest(sha256_hash);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd160_hash);
    out
}
