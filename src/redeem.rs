//! Redeem scripts of the bet
//!
//! Preimage counting: player A wins on outcome 0 and player B on outcome 1.
//! Selector pushes are `OP_1` for B and `OP_0` for A.

use crate::bet::{Bet, Player};
use crate::constants::MAX_SCRIPT_ELEMENT_SIZE;
use crate::error::{BetError, Result};
use crate::keys::PublicKey;
use crate::opcodes::*;
use crate::oracle::OracleCommitment;
use crate::script::{Script, ScriptBuilder};
use crate::timelock::encode_relative_seconds;
use crate::types::Hash160;

/// Everything the bet's scripts are parameterized by
#[derive(Debug, Clone, Copy)]
pub struct RedeemContext<'a> {
    pub players: &'a [PublicKey; 2],
    pub committee: &'a [OracleCommitment],
    pub required: usize,
}

impl<'a> RedeemContext<'a> {
    pub fn new(bet: &'a Bet, committee: &'a [OracleCommitment]) -> Self {
        Self {
            players: &bet.players,
            committee,
            required: bet.required_hashes,
        }
    }

    fn commitment(&self, position: usize) -> Result<&'a OracleCommitment> {
        self.committee.get(position).ok_or_else(|| {
            BetError::malformed(format!(
                "committee position {} out of range for {} oracles",
                position,
                self.committee.len()
            ))
        })
    }

    /// Committee hashes announcing `winner`, in committee order
    fn outcome_hashes(&self, winner: Player, exclude: Option<usize>) -> Vec<Hash160> {
        self.committee
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(_, c)| *c.hash_for(winner))
            .collect()
    }

    /// 2-of-2 multisig of the players; locks each oracle's promise output
    pub fn oracle_payment(&self) -> Result<Script> {
        Script::multisig(2, &self.players[..])
    }

    /// Prize of `owner`: taken by the other player once `required` oracles
    /// announce them, or by the owner after the resolution timeout.
    ///
    /// `OP_IF count(other) <pk_other> OP_CHECKSIG OP_ELSE <seq> OP_CSV OP_DROP
    /// <pk_owner> OP_CHECKSIG OP_ENDIF`
    pub fn prize(&self, owner: Player, resolution_seconds: u32) -> Result<Script> {
        let rival = owner.other();
        ScriptBuilder::new()
            .op(OP_IF)
            .push_preimage_threshold(&self.outcome_hashes(rival, None), self.required)
            .push_key(&self.players[rival.index()])
            .op(OP_CHECKSIG)
            .op(OP_ELSE)
            .push_relative_timelock(encode_relative_seconds(resolution_seconds)?)
            .push_key(&self.players[owner.index()])
            .op(OP_CHECKSIG)
            .op(OP_ENDIF)
            .into_script()
    }

    /// Oracle `position`'s payment. Branches, by selector pair:
    /// - `1 1`: the oracle answers with either preimage after resolution
    /// - `0 1`: the players take it back after the reply deadline
    /// - `W 0`: player W proves the oracle announced the other outcome while
    ///   `required` of the remaining oracles announced W
    pub fn answer(&self, position: usize, resolution_seconds: u32, reply_seconds: u32) -> Result<Script> {
        let commitment = self.commitment(position)?;
        let [h0, h1] = &commitment.hashes;
        ScriptBuilder::new()
            .op(OP_IF)
            .op(OP_IF)
            .push_relative_timelock(encode_relative_seconds(resolution_seconds)?)
            .op(OP_HASH160)
            .op(OP_DUP)
            .push_slice(h0)
            .op(OP_EQUAL)
            .op(OP_SWAP)
            .push_slice(h1)
            .op(OP_EQUAL)
            .op(OP_BOOLOR)
            .op(OP_VERIFY)
            .push_key(commitment.oracle.key())
            .op(OP_CHECKSIG)
            .op(OP_ELSE)
            .push_relative_timelock(encode_relative_seconds(reply_seconds)?)
            .append(&self.oracle_payment()?)
            .op(OP_ENDIF)
            .op(OP_ELSE)
            .op(OP_IF)
            .op(OP_HASH160)
            .push_slice(commitment.hash_for(Player::A))
            .op(OP_EQUALVERIFY)
            .push_preimage_threshold(&self.outcome_hashes(Player::B, Some(position)), self.required)
            .push_key(&self.players[Player::B.index()])
            .op(OP_ELSE)
            .op(OP_HASH160)
            .push_slice(commitment.hash_for(Player::B))
            .op(OP_EQUALVERIFY)
            .push_preimage_threshold(&self.outcome_hashes(Player::A, Some(position)), self.required)
            .push_key(&self.players[Player::A.index()])
            .op(OP_ENDIF)
            .op(OP_CHECKSIG)
            .op(OP_ENDIF)
            .into_script()
    }

    /// Oracle `position`'s deposit: either player takes it with both
    /// preimages, otherwise the oracle recovers it after the reply deadline.
    pub fn insurance(&self, position: usize, reply_seconds: u32) -> Result<Script> {
        let commitment = self.commitment(position)?;
        ScriptBuilder::new()
            .op(OP_IF)
            .op(OP_HASH160)
            .push_slice(commitment.hash_for(Player::A))
            .op(OP_EQUALVERIFY)
            .op(OP_HASH160)
            .push_slice(commitment.hash_for(Player::B))
            .op(OP_EQUALVERIFY)
            .op(OP_IF)
            .push_key(&self.players[Player::B.index()])
            .op(OP_ELSE)
            .push_key(&self.players[Player::A.index()])
            .op(OP_ENDIF)
            .op(OP_CHECKSIG)
            .op(OP_ELSE)
            .push_relative_timelock(encode_relative_seconds(reply_seconds)?)
            .push_key(commitment.oracle.key())
            .op(OP_CHECKSIG)
            .op(OP_ENDIF)
            .into_script()
    }

    /// Fail unless every redeem script of the committee fits the single push
    /// a pay-to-script-hash spend presents it in. Sequence pushes are always
    /// three bytes, so the lengths do not depend on the timeouts.
    pub fn check_spendable(&self, resolution_seconds: u32, reply_seconds: u32) -> Result<()> {
        let mut scripts = Vec::with_capacity(2 + 2 * self.committee.len());
        for owner in Player::ALL {
            scripts.push((format!("prize of player {owner}"), self.prize(owner, resolution_seconds)?));
        }
        for position in 0..self.committee.len() {
            scripts.push((
                format!("answer of oracle {position}"),
                self.answer(position, resolution_seconds, reply_seconds)?,
            ));
            scripts.push((
                format!("insurance of oracle {position}"),
                self.insurance(position, reply_seconds)?,
            ));
        }
        match scripts.iter().find(|(_, script)| script.len() > MAX_SCRIPT_ELEMENT_SIZE) {
            Some((label, script)) => Err(BetError::inconsistent(format!(
                "{label} redeem script is {} bytes, above the {MAX_SCRIPT_ELEMENT_SIZE} byte push limit; \
                 a committee of {} cannot be spent",
                script.len(),
                self.committee.len()
            ))),
            None => Ok(()),
        }
    }
}
