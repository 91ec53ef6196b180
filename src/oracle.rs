//! Oracles, their outcome secrets and revealed preimages

use crate::bet::Player;
use crate::codec::{self, Reader};
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::hashes::hash160;
use crate::keys::{Address, Network, PrivateKey, PublicKey};
use crate::opcodes::OP_0;
use crate::script::ScriptItem;
use crate::transaction::Transaction;
use crate::types::*;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A candidate oracle, identified by its public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oracle {
    key: PublicKey,
}

impl Oracle {
    pub fn new(key: PublicKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn serialize_into(&self, buf: &mut ByteString) {
        codec::write_var_bytes(buf, &self.key.to_bytes());
    }

    pub fn deserialize_from(reader: &mut Reader<'_>, network: Network) -> Result<Self> {
        let bytes = reader.read_var_bytes()?;
        Ok(Self::new(PublicKey::from_bytes(bytes, network)?))
    }
}

impl fmt::Display for Oracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

/// One outcome secret. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_SIZE]);

impl Secret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self(codec::to_array(bytes)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn hash(&self) -> Hash160 {
        hash160(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", codec::to_hex(&self.hash()))
    }
}

/// An oracle selected for a bet. Owns its signing key and one secret per
/// outcome, generated once.
#[derive(Debug)]
pub struct ParticipatingOracle {
    oracle: Oracle,
    key: PrivateKey,
    secrets: [Secret; 2],
}

impl ParticipatingOracle {
    pub fn new(key: PrivateKey) -> Self {
        Self::with_secrets(key, [Secret::generate(), Secret::generate()])
    }

    pub fn with_secrets(key: PrivateKey, secrets: [Secret; 2]) -> Self {
        Self {
            oracle: Oracle::new(*key.public_key()),
            key,
            secrets,
        }
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    /// Secret announcing that `winner` won
    pub fn secret(&self, winner: Player) -> &Secret {
        &self.secrets[winner.index()]
    }

    pub fn hashes(&self) -> [Hash160; 2] {
        [self.secrets[0].hash(), self.secrets[1].hash()]
    }

    pub fn commitment(&self) -> OracleCommitment {
        OracleCommitment {
            oracle: self.oracle,
            hashes: self.hashes(),
        }
    }
}

/// An oracle's published hash images, one per outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleCommitment {
    pub oracle: Oracle,
    pub hashes: [Hash160; 2],
}

impl OracleCommitment {
    pub fn hash_for(&self, winner: Player) -> &Hash160 {
        &self.hashes[winner.index()]
    }

    /// Outcome announced by `preimage`, if it opens either hash
    pub fn outcome_of(&self, preimage: &[u8]) -> Option<Player> {
        let digest = hash160(preimage);
        Player::ALL
            .into_iter()
            .find(|p| *self.hash_for(*p) == digest)
    }

    /// `"OBI" ‖ h0 ‖ h1`
    pub fn inscription_payload(&self) -> ByteString {
        let mut payload = Vec::with_capacity(INSCRIPTION_MAGIC.len() + 40);
        payload.extend_from_slice(INSCRIPTION_MAGIC);
        payload.extend_from_slice(&self.hashes[0]);
        payload.extend_from_slice(&self.hashes[1]);
        payload
    }

    /// Read the hashes an inscription transaction committed to
    pub fn from_inscription(oracle: Oracle, inscription: &Transaction) -> Result<Self> {
        let payload = inscription
            .output(INSCRIPTION_COMMITMENT_INDEX)?
            .script_pubkey
            .null_data()
            .ok_or_else(|| BetError::inconsistent("inscription has no commitment output"))?;
        let Some(hashes) = payload.strip_prefix(INSCRIPTION_MAGIC) else {
            return Err(BetError::inconsistent("inscription commitment has the wrong magic"));
        };
        if hashes.len() != 40 {
            return Err(BetError::malformed(format!(
                "inscription commitment carries {} hash bytes, expected 40",
                hashes.len()
            )));
        }
        Ok(Self {
            oracle,
            hashes: [codec::to_array(&hashes[..20])?, codec::to_array(&hashes[20..])?],
        })
    }

    pub fn serialize_into(&self, buf: &mut ByteString) {
        self.oracle.serialize_into(buf);
        buf.extend_from_slice(&self.hashes[0]);
        buf.extend_from_slice(&self.hashes[1]);
    }

    pub fn deserialize_from(reader: &mut Reader<'_>, network: Network) -> Result<Self> {
        let oracle = Oracle::deserialize_from(reader, network)?;
        Ok(Self {
            oracle,
            hashes: [reader.read_array()?, reader.read_array()?],
        })
    }
}

/// Preimages revealed so far, indexed by committee position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealedPreimages {
    slots: Vec<Option<ByteString>>,
}

impl RevealedPreimages {
    pub fn new(committee_size: usize) -> Self {
        Self {
            slots: vec![None; committee_size],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record oracle `position`'s preimage. It must open one of that oracle's
    /// hashes.
    pub fn reveal(
        &mut self,
        commitments: &[OracleCommitment],
        position: usize,
        preimage: &[u8],
    ) -> Result<Player> {
        if commitments.len() != self.slots.len() {
            return Err(BetError::inconsistent(format!(
                "{} commitments for a committee of {}",
                commitments.len(),
                self.slots.len()
            )));
        }
        let commitment = commitments.get(position).ok_or_else(|| {
            BetError::malformed(format!("committee position {position} out of range"))
        })?;
        let outcome = commitment.outcome_of(preimage).ok_or_else(|| {
            BetError::inconsistent(format!(
                "preimage does not match either hash of oracle {}",
                commitment.oracle
            ))
        })?;
        self.slots[position] = Some(preimage.to_vec());
        Ok(outcome)
    }

    pub fn get(&self, position: usize) -> Option<&[u8]> {
        self.slots.get(position).and_then(|s| s.as_deref())
    }

    /// Number of revealed preimages announcing `winner`, skipping `exclude`
    pub fn matches(&self, commitments: &[OracleCommitment], winner: Player, exclude: Option<usize>) -> usize {
        self.slots
            .iter()
            .zip(commitments)
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .filter(|(_, (slot, commitment))| {
                slot.as_deref()
                    .map(|p| hash160(p) == *commitment.hash_for(winner))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Unlocking items for a preimage-counting script: one per oracle in
    /// reverse committee order, so the first oracle's item ends on top.
    /// Unrevealed slots push an empty item.
    pub fn script_items(&self, exclude: Option<usize>) -> Vec<ScriptItem> {
        self.slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(_, slot)| match slot {
                Some(preimage) => ScriptItem::Push(preimage.clone()),
                None => ScriptItem::Op(OP_0),
            })
            .collect()
    }
}
