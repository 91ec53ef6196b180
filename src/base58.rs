//! Base58Check text encoding
//!
//! encode = base58(payload ‖ first four bytes of SHA256d(payload)).
//! Leading zero bytes survive as leading '1' characters.

use crate::constants::CHECKSUM_SIZE;
use crate::error::{BetError, Result};
use crate::hashes::double_sha256;
use crate::types::ByteString;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = double_sha256(payload);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

pub fn encode_check(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + CHECKSUM_SIZE);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum(payload));
    bs58::encode(data).into_string()
}

/// Decode and verify the trailing checksum, returning the payload
pub fn decode_check(text: &str) -> Result<ByteString> {
    let mut data = bs58::decode(text)
        .into_vec()
        .map_err(|e| BetError::malformed(format!("invalid base58: {e}")))?;
    if data.len() < CHECKSUM_SIZE {
        return Err(BetError::malformed("base58check data shorter than checksum"));
    }
    let split = data.len() - CHECKSUM_SIZE;
    let expected = checksum(&data[..split]);
    if data[split..] != expected {
        return Err(BetError::malformed("base58check checksum mismatch"));
    }
    data.truncate(split);
    Ok(data)
}
