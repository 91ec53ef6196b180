//! Bet terms, their canonical encoding and the on-chain commitment
//!
//! Canonical form:
//! `"OBET" ‖ network ‖ description ‖ min ‖ max ‖ required ‖ oracles ‖ backups ‖
//! pkA ‖ pkB ‖ amounts(6 × u64) ‖ unit ‖ value(u32) ‖ channel`

use crate::channel::ChannelDescriptor;
use crate::codec::{self, Reader};
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::hashes::hash160;
use crate::keys::{Network, PublicKey};
use crate::oracle::{Oracle, OracleCommitment};
use crate::script::Script;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A side of the bet. Player A wins on outcome 0, player B on outcome 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    A,
    B,
}

impl Player {
    pub const ALL: [Player; 2] = [Player::A, Player::B];

    pub fn index(self) -> usize {
        match self {
            Player::A => 0,
            Player::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Player::A => Player::B,
            Player::B => Player::A,
        }
    }

    /// Value pushed to select this player's branch in a redeem script
    pub fn selector(self) -> bool {
        self == Player::B
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::A => f.write_str("A"),
            Player::B => f.write_str("B"),
        }
    }
}

/// Satoshi amounts agreed for the bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amounts {
    /// Paid to each oracle when it inscribes
    pub first_payment: u64,
    /// Paid to each oracle for answering
    pub oracle_payment: u64,
    /// Each player's stake
    pub pot_amount: u64,
    /// Fee of each inscription transaction
    pub inscription_fee: u64,
    /// Deposit each oracle forfeits by answering both ways
    pub penalty: u64,
    /// Satoshis per byte for every other transaction
    pub fee_rate: u64,
}

impl Amounts {
    /// Value the promise locks for one oracle
    pub fn oracle_output_value(&self) -> Result<u64> {
        self.first_payment
            .checked_add(self.oracle_payment)
            .and_then(|v| v.checked_add(self.inscription_fee))
            .ok_or_else(|| BetError::malformed("oracle amounts overflow"))
    }

    fn serialize_into(&self, buf: &mut ByteString) {
        for value in [
            self.first_payment,
            self.oracle_payment,
            self.pot_amount,
            self.inscription_fee,
            self.penalty,
            self.fee_rate,
        ] {
            codec::write_u64(buf, value);
        }
    }

    fn deserialize_from(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            first_payment: reader.read_u64()?,
            oracle_payment: reader.read_u64()?,
            pot_amount: reader.read_u64()?,
            inscription_fee: reader.read_u64()?,
            penalty: reader.read_u64()?,
            fee_rate: reader.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds(self) -> u32 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            TimeUnit::Seconds => 0,
            TimeUnit::Minutes => 1,
            TimeUnit::Hours => 2,
            TimeUnit::Days => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(TimeUnit::Seconds),
            1 => Ok(TimeUnit::Minutes),
            2 => Ok(TimeUnit::Hours),
            3 => Ok(TimeUnit::Days),
            other => Err(BetError::malformed(format!("unknown time unit {other}"))),
        }
    }
}

/// Time after the promise confirms at which the bet resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetTimeout {
    pub unit: TimeUnit,
    pub value: u32,
}

impl BetTimeout {
    pub fn new(unit: TimeUnit, value: u32) -> Self {
        Self { unit, value }
    }

    pub fn seconds(&self) -> Result<u32> {
        self.value
            .checked_mul(self.unit.seconds())
            .ok_or_else(|| BetError::malformed(format!("timeout {} {:?} overflows", self.value, self.unit)))
    }
}

/// The agreed terms of a bet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub network: Network,
    pub description: String,
    pub min_oracles: usize,
    pub max_oracles: usize,
    /// Matching preimages needed to settle an outcome
    pub required_hashes: usize,
    pub oracles: Vec<Oracle>,
    pub backup_oracles: Vec<Oracle>,
    /// Player A then player B
    pub players: [PublicKey; 2],
    pub amounts: Amounts,
    pub timeout: BetTimeout,
    pub channel: ChannelDescriptor,
}

impl Bet {
    pub fn player_key(&self, player: Player) -> &PublicKey {
        &self.players[player.index()]
    }

    /// Which side `key` plays
    pub fn player_of(&self, key: &PublicKey) -> Result<Player> {
        Player::ALL
            .into_iter()
            .find(|p| self.player_key(*p) == key)
            .ok_or_else(|| {
                BetError::inconsistent(format!("key {} belongs to neither player", key.to_hex()))
            })
    }

    pub fn description_hash(&self) -> Hash160 {
        hash160(self.description.as_bytes())
    }

    /// Check the terms are internally coherent
    pub fn validate(&self) -> Result<()> {
        if self.min_oracles == 0 || self.min_oracles > self.max_oracles {
            return Err(BetError::inconsistent(format!(
                "invalid oracle bounds {}..={}",
                self.min_oracles, self.max_oracles
            )));
        }
        if self.required_hashes == 0 || self.required_hashes > self.min_oracles {
            return Err(BetError::inconsistent(format!(
                "required hashes {} must lie in 1..={}",
                self.required_hashes, self.min_oracles
            )));
        }
        if self.players[0] == self.players[1] {
            return Err(BetError::inconsistent("both players use the same key"));
        }
        if self.oracles.len() + self.backup_oracles.len() < self.min_oracles {
            return Err(BetError::inconsistent(format!(
                "{} candidate oracles cannot fill a committee of {}",
                self.oracles.len() + self.backup_oracles.len(),
                self.min_oracles
            )));
        }
        self.timeout.seconds()?;
        self.amounts.oracle_output_value()?;
        Ok(())
    }

    /// Check a selected committee against the terms
    pub fn validate_committee(&self, committee: &[Oracle]) -> Result<()> {
        if committee.len() < self.min_oracles || committee.len() > self.max_oracles {
            return Err(BetError::inconsistent(format!(
                "committee of {} is outside {}..={}",
                committee.len(),
                self.min_oracles,
                self.max_oracles
            )));
        }
        for (i, oracle) in committee.iter().enumerate() {
            if !self.oracles.contains(oracle) && !self.backup_oracles.contains(oracle) {
                return Err(BetError::inconsistent(format!(
                    "committee member {oracle} is not a candidate"
                )));
            }
            if committee[..i].contains(oracle) {
                return Err(BetError::inconsistent(format!(
                    "committee member {oracle} appears twice"
                )));
            }
            if self.players.contains(oracle.key()) {
                return Err(BetError::inconsistent("a player cannot serve as oracle"));
            }
        }
        Ok(())
    }

    pub fn validate_commitments(&self, commitments: &[OracleCommitment]) -> Result<()> {
        let committee: Vec<Oracle> = commitments.iter().map(|c| c.oracle).collect();
        self.validate_committee(&committee)
    }

    pub fn serialize(&self) -> ByteString {
        let mut buf = Vec::new();
        buf.extend_from_slice(BET_MAGIC);
        buf.push(self.network.to_byte());
        codec::write_var_bytes(&mut buf, self.description.as_bytes());
        codec::write_varint(&mut buf, self.min_oracles as u64);
        codec::write_varint(&mut buf, self.max_oracles as u64);
        codec::write_varint(&mut buf, self.required_hashes as u64);
        for list in [&self.oracles, &self.backup_oracles] {
            codec::write_varint(&mut buf, list.len() as u64);
            for oracle in list {
                oracle.serialize_into(&mut buf);
            }
        }
        for player in &self.players {
            codec::write_var_bytes(&mut buf, &player.to_bytes());
        }
        self.amounts.serialize_into(&mut buf);
        buf.push(self.timeout.unit.to_byte());
        codec::write_u32(&mut buf, self.timeout.value);
        self.channel.serialize_into(&mut buf);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        if reader.read_bytes(BET_MAGIC.len())? != BET_MAGIC {
            return Err(BetError::malformed("bet encoding has the wrong magic"));
        }
        let network = Network::from_byte(reader.read_u8()?)?;
        let description = String::from_utf8(reader.read_var_bytes()?.to_vec())
            .map_err(|e| BetError::malformed(format!("bet description is not UTF-8: {e}")))?;
        let min_oracles = reader.read_length()?;
        let max_oracles = reader.read_length()?;
        let required_hashes = reader.read_length()?;
        let mut lists = [Vec::new(), Vec::new()];
        for list in &mut lists {
            let count = reader.read_length()?;
            for _ in 0..count {
                list.push(Oracle::deserialize_from(&mut reader, network)?);
            }
        }
        let [oracles, backup_oracles] = lists;
        let players = [
            PublicKey::from_bytes(reader.read_var_bytes()?, network)?,
            PublicKey::from_bytes(reader.read_var_bytes()?, network)?,
        ];
        let amounts = Amounts::deserialize_from(&mut reader)?;
        let unit = TimeUnit::from_byte(reader.read_u8()?)?;
        let value = reader.read_u32()?;
        let channel = ChannelDescriptor::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            network,
            description,
            min_oracles,
            max_oracles,
            required_hashes,
            oracles,
            backup_oracles,
            players,
            amounts,
            timeout: BetTimeout::new(unit, value),
            channel,
        })
    }
}

/// The promise's OP_RETURN payload:
/// `"OBET" ‖ varint(n) ‖ committee keys ‖ HASH160(description) ‖ channel`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetCommitment {
    pub committee: Vec<Oracle>,
    pub description_hash: Hash160,
    pub channel: ChannelDescriptor,
}

impl BetCommitment {
    pub fn new(bet: &Bet, committee: &[Oracle]) -> Self {
        Self {
            committee: committee.to_vec(),
            description_hash: bet.description_hash(),
            channel: bet.channel.clone(),
        }
    }

    pub fn encode(&self) -> ByteString {
        let mut buf = Vec::new();
        buf.extend_from_slice(BET_MAGIC);
        codec::write_varint(&mut buf, self.committee.len() as u64);
        for oracle in &self.committee {
            oracle.serialize_into(&mut buf);
        }
        buf.extend_from_slice(&self.description_hash);
        self.channel.serialize_into(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8], network: Network) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        if reader.read_bytes(BET_MAGIC.len())? != BET_MAGIC {
            return Err(BetError::malformed("commitment has the wrong magic"));
        }
        let count = reader.read_length()?;
        let mut committee = Vec::with_capacity(count);
        for _ in 0..count {
            committee.push(Oracle::deserialize_from(&mut reader, network)?);
        }
        let description_hash = reader.read_array()?;
        let channel = ChannelDescriptor::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            committee,
            description_hash,
            channel,
        })
    }

    pub fn to_script(&self) -> Result<Script> {
        Script::null_data_commitment(&self.encode())
    }

    pub fn from_script(script: &Script, network: Network) -> Result<Self> {
        let payload = script
            .null_data()
            .ok_or_else(|| BetError::malformed("not an OP_RETURN commitment"))?;
        Self::decode(&payload, network)
    }

    /// Whether this commitment describes `bet`
    pub fn matches(&self, bet: &Bet) -> bool {
        self.description_hash == bet.description_hash() && self.channel == bet.channel
    }
}
