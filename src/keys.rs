//! secp256k1 key material, WIF and Base58Check addresses

use crate::base58;
use crate::codec;
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::hashes::hash160;
use crate::types::{ByteString, Hash, Hash160};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// WIF suffix marking a key whose public key is serialized compressed
const WIF_COMPRESSED_FLAG: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet => 0xc4,
        }
    }

    pub fn wif_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xef,
        }
    }

    /// Tag used in the canonical bet encoding
    pub fn to_byte(self) -> u8 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Network::Mainnet),
            1 => Ok(Network::Testnet),
            other => Err(BetError::malformed(format!("unknown network tag {other}"))),
        }
    }

    fn from_wif_version(byte: u8) -> Result<Self> {
        [Network::Mainnet, Network::Testnet]
            .into_iter()
            .find(|n| n.wif_version() == byte)
            .ok_or_else(|| BetError::malformed(format!("unknown WIF version 0x{byte:02x}")))
    }
}

/// An elliptic-curve point with its serialization flags.
///
/// Equality is structural: the same point with a different compression flag
/// is a different key, because it derives a different address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    point: secp256k1::PublicKey,
    compressed: bool,
    network: Network,
}

impl PublicKey {
    /// Parse a 33-byte compressed or 65-byte uncompressed key
    pub fn from_bytes(bytes: &[u8], network: Network) -> Result<Self> {
        let compressed = match bytes.len() {
            COMPRESSED_PUBLIC_KEY_SIZE => true,
            UNCOMPRESSED_PUBLIC_KEY_SIZE => false,
            other => {
                return Err(BetError::malformed(format!(
                    "unsupported public key length {other}"
                )))
            }
        };
        let point = secp256k1::PublicKey::from_slice(bytes)
            .map_err(|e| BetError::malformed(format!("invalid public key: {e}")))?;
        Ok(Self {
            point,
            compressed,
            network,
        })
    }

    pub fn from_hex(text: &str, network: Network) -> Result<Self> {
        Self::from_bytes(&codec::from_hex(text)?, network)
    }

    pub fn to_bytes(&self) -> ByteString {
        if self.compressed {
            self.point.serialize().to_vec()
        } else {
            self.point.serialize_uncompressed().to_vec()
        }
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(&self.to_bytes())
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Same point, 33-byte encoding
    pub fn compress(&self) -> Self {
        Self {
            compressed: true,
            ..*self
        }
    }

    /// Same point, 65-byte encoding
    pub fn decompress(&self) -> Self {
        Self {
            compressed: false,
            ..*self
        }
    }

    pub fn pubkey_hash(&self) -> Hash160 {
        hash160(&self.to_bytes())
    }

    pub fn address(&self) -> Address {
        Address::pay_to_pubkey_hash(self.pubkey_hash(), self.network)
    }

    /// Check a DER signature over a 32-byte digest
    pub fn verify(&self, digest: &Hash, der_signature: &[u8]) -> bool {
        let secp = Secp256k1::verification_only();
        let signature = match Signature::from_der(der_signature) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let message = match Message::from_digest_slice(digest) {
            Ok(msg) => msg,
            Err(_) => return false,
        };
        secp.verify_ecdsa(&message, &signature, &self.point).is_ok()
    }
}

/// Recover the y-coordinate of a compressed key.
///
/// secp256k1's field prime satisfies p ≡ 3 (mod 4), so the point parser
/// takes y = a^((p+1)/4) mod p and fixes its parity from the prefix byte.
pub fn decompress(compressed: &[u8]) -> Result<[u8; UNCOMPRESSED_PUBLIC_KEY_SIZE]> {
    if compressed.len() != COMPRESSED_PUBLIC_KEY_SIZE {
        return Err(BetError::malformed(format!(
            "compressed public key must be {} bytes, got {}",
            COMPRESSED_PUBLIC_KEY_SIZE,
            compressed.len()
        )));
    }
    let point = secp256k1::PublicKey::from_slice(compressed)
        .map_err(|e| BetError::malformed(format!("invalid compressed key: {e}")))?;
    Ok(point.serialize_uncompressed())
}

/// Drop the y-coordinate, keeping its parity in the prefix byte
pub fn compress(uncompressed: &[u8]) -> Result<[u8; COMPRESSED_PUBLIC_KEY_SIZE]> {
    if uncompressed.len() != UNCOMPRESSED_PUBLIC_KEY_SIZE {
        return Err(BetError::malformed(format!(
            "uncompressed public key must be {} bytes, got {}",
            UNCOMPRESSED_PUBLIC_KEY_SIZE,
            uncompressed.len()
        )));
    }
    let point = secp256k1::PublicKey::from_slice(uncompressed)
        .map_err(|e| BetError::malformed(format!("invalid uncompressed key: {e}")))?;
    Ok(point.serialize())
}

/// A secp256k1 scalar, wiped when the key is dropped. Not `Clone`.
pub struct PrivateKey {
    secret: [u8; PRIVATE_KEY_SIZE],
    compressed: bool,
    network: Network,
    public_key: PublicKey,
}

impl PrivateKey {
    pub fn generate(network: Network) -> Self {
        let secp = Secp256k1::signing_only();
        let secret_key = SecretKey::new(&mut secp256k1::rand::thread_rng());
        let point = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret: secret_key.secret_bytes(),
            compressed: true,
            network,
            public_key: PublicKey {
                point,
                compressed: true,
                network,
            },
        }
    }

    /// Build from a raw 32-byte scalar
    pub fn from_bytes(bytes: &[u8], compressed: bool, network: Network) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(BetError::malformed(format!(
                "private key must be {} bytes, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            )));
        }
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| BetError::malformed(format!("invalid private key scalar: {e}")))?;
        let secp = Secp256k1::signing_only();
        let point = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self {
            secret: secret_key.secret_bytes(),
            compressed,
            network,
            public_key: PublicKey {
                point,
                compressed,
                network,
            },
        })
    }

    pub fn from_hex(text: &str, compressed: bool, network: Network) -> Result<Self> {
        let mut bytes = codec::from_hex(text)?;
        let key = Self::from_bytes(&bytes, compressed, network);
        bytes.zeroize();
        key
    }

    /// WIF: Base58Check(version ‖ scalar [‖ 0x01 when compressed])
    pub fn from_wif(wif: &str) -> Result<Self> {
        let mut payload = base58::decode_check(wif)?;
        let result = match payload.len() {
            33 => {
                let network = Network::from_wif_version(payload[0])?;
                Self::from_bytes(&payload[1..], false, network)
            }
            34 if payload[33] == WIF_COMPRESSED_FLAG => {
                let network = Network::from_wif_version(payload[0])?;
                Self::from_bytes(&payload[1..33], true, network)
            }
            34 => Err(BetError::malformed(format!(
                "invalid WIF compression flag 0x{:02x}",
                payload[33]
            ))),
            other => Err(BetError::malformed(format!("invalid WIF length {other}"))),
        };
        payload.zeroize();
        result
    }

    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(self.network.wif_version());
        payload.extend_from_slice(&self.secret);
        if self.compressed {
            payload.push(WIF_COMPRESSED_FLAG);
        }
        let wif = base58::encode_check(&payload);
        payload.zeroize();
        wif
    }

    pub fn secret_bytes(&self) -> &[u8; PRIVATE_KEY_SIZE] {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Deterministic (RFC 6979), low-S ECDSA signature over a digest, DER encoded
    pub fn sign_digest(&self, digest: &Hash) -> Result<ByteString> {
        let secp = Secp256k1::signing_only();
        let secret_key = SecretKey::from_slice(&self.secret)?;
        let message = Message::from_digest_slice(digest)?;
        let signature = secp.sign_ecdsa(&message, &secret_key);
        Ok(signature.serialize_der().to_vec())
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key)
            .field("compressed", &self.compressed)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    PayToPubkeyHash,
    PayToScriptHash,
}

/// Network-prefixed HASH160, printed as Base58Check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub network: Network,
    pub kind: AddressKind,
    pub hash: Hash160,
}

impl Address {
    pub fn pay_to_pubkey_hash(hash: Hash160, network: Network) -> Self {
        Self {
            network,
            kind: AddressKind::PayToPubkeyHash,
            hash,
        }
    }

    pub fn pay_to_script_hash(hash: Hash160, network: Network) -> Self {
        Self {
            network,
            kind: AddressKind::PayToScriptHash,
            hash,
        }
    }

    fn version(&self) -> u8 {
        match self.kind {
            AddressKind::PayToPubkeyHash => self.network.p2pkh_version(),
            AddressKind::PayToScriptHash => self.network.p2sh_version(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version());
        payload.extend_from_slice(&self.hash);
        f.write_str(&base58::encode_check(&payload))
    }
}

impl FromStr for Address {
    type Err = BetError;

    fn from_str(s: &str) -> Result<Self> {
        let payload = base58::decode_check(s)?;
        if payload.len() != 21 {
            return Err(BetError::malformed(format!(
                "address payload must be 21 bytes, got {}",
                payload.len()
            )));
        }
        let hash = codec::to_array(&payload[1..])?;
        for network in [Network::Mainnet, Network::Testnet] {
            if payload[0] == network.p2pkh_version() {
                return Ok(Self::pay_to_pubkey_hash(hash, network));
            }
            if payload[0] == network.p2sh_version() {
                return Ok(Self::pay_to_script_hash(hash, network));
            }
        }
        Err(BetError::malformed(format!(
            "unknown address version 0x{:02x}",
            payload[0]
        )))
    }
}
