//! Core types shared across the crate

use crate::codec;
use crate::error::{BetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// HASH160 image: RIPEMD160(SHA256(x))
pub type Hash160 = [u8; 20];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Transaction id in display order (the byte-reversed double SHA-256)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Txid(pub Hash);

impl Txid {
    /// Build from the raw double-SHA-256 digest of a serialized transaction
    pub fn from_digest(digest: Hash) -> Self {
        let mut bytes = digest;
        bytes.reverse();
        Txid(bytes)
    }

    /// Byte order used inside serialized inputs
    pub fn to_wire(&self) -> Hash {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    pub fn from_wire(wire: Hash) -> Self {
        Self::from_digest(wire)
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::to_hex(&self.0))
    }
}

impl FromStr for Txid {
    type Err = BetError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Txid(codec::from_hex_array(s)?))
    }
}

/// Reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}
