//! Redemption paths of a bet
//!
//! Each path recovers the committed redeem script by quantized-timeout
//! search, spends the matching output and signs twice so the fee reflects
//! the final size. Nothing is returned unless the whole transaction is
//! signed.

use crate::bet::{Bet, Player};
use crate::config::ProtocolConfig;
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::keys::Address;
use crate::opcodes::OP_0;
use crate::oracle::{OracleCommitment, ParticipatingOracle, RevealedPreimages};
use crate::promise::prize_index;
use crate::redeem::RedeemContext;
use crate::script::{Script, ScriptItem};
use crate::signing::{self, InputUnlock, Signer};
use crate::timelock::{encode_relative_seconds, search_pair, search_single};
use crate::transaction::{AbsoluteOutput, Output, Transaction, UnsignedTransaction};
use tracing::info;

/// Timeout(s) the reconstruction search recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveredTimeout {
    Single(u32),
    Pair { resolution: u32, reply: u32 },
}

/// A signed redemption and the scripts it reconstructed, in input order
#[derive(Debug, Clone)]
pub struct Redemption {
    pub redeem_scripts: Vec<Script>,
    pub transaction: Transaction,
    pub recovered: RecoveredTimeout,
    pub fee: u64,
}

/// A P2SH output being spent
struct Claim<'s> {
    output: AbsoluteOutput,
    sequence: u32,
    unlock: InputUnlock<'s>,
}

/// Resolution state of one bet: its terms, committee and configuration
pub struct Resolver<'a> {
    bet: &'a Bet,
    committee: &'a [OracleCommitment],
    config: &'a ProtocolConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(bet: &'a Bet, committee: &'a [OracleCommitment], config: &'a ProtocolConfig) -> Result<Self> {
        config.validate()?;
        bet.validate_commitments(committee)?;
        Ok(Self {
            bet,
            committee,
            config,
        })
    }

    fn scripts(&self) -> RedeemContext<'a> {
        RedeemContext::new(self.bet, self.committee)
    }

    fn commitment(&self, position: usize) -> Result<&'a OracleCommitment> {
        self.committee.get(position).ok_or_else(|| {
            BetError::malformed(format!("committee position {position} out of range"))
        })
    }

    /// The inscription must commit to the hashes the committee agreed on
    fn check_inscription(&self, inscription: &Transaction, position: usize) -> Result<()> {
        let commitment = self.commitment(position)?;
        let inscribed = OracleCommitment::from_inscription(commitment.oracle, inscription)?;
        if inscribed != *commitment {
            return Err(BetError::inconsistent(format!(
                "inscription of oracle {position} commits to different hashes"
            )));
        }
        Ok(())
    }

    /// Rebuild the prize script of `owner` committed in `promise`
    pub fn recover_prize(&self, promise: &Transaction, owner: Player) -> Result<(Script, u32)> {
        let expected = promise.output(prize_index(owner))?.script_pubkey.p2sh_hash()?;
        let (nominal, _) = self.config.nominal_timeouts(self.bet)?;
        let scripts = self.scripts();
        search_single("prize", nominal, self.config.search.single, &expected, |resolution| {
            scripts.prize(owner, resolution)
        })
    }

    /// Rebuild oracle `position`'s answer script; returns (script, resolution, reply)
    pub fn recover_answer(&self, inscription: &Transaction, position: usize) -> Result<(Script, u32, u32)> {
        let expected = inscription
            .output(INSCRIPTION_ANSWER_INDEX)?
            .script_pubkey
            .p2sh_hash()?;
        let nominal = self.config.nominal_timeouts(self.bet)?;
        let scripts = self.scripts();
        search_pair("answer", nominal, self.config.search.pair, &expected, |resolution, reply| {
            scripts.answer(position, resolution, reply)
        })
    }

    /// Rebuild oracle `position`'s insurance script; returns (script, reply)
    pub fn recover_insurance(&self, inscription: &Transaction, position: usize) -> Result<(Script, u32)> {
        let expected = inscription
            .output(INSCRIPTION_INSURANCE_INDEX)?
            .script_pubkey
            .p2sh_hash()?;
        let (_, nominal) = self.config.nominal_timeouts(self.bet)?;
        let scripts = self.scripts();
        search_single("insurance", nominal, self.config.search.single, &expected, |reply| {
            scripts.insurance(position, reply)
        })
    }

    fn player(&self, signer: &dyn Signer) -> Result<Player> {
        self.bet.player_of(&signer.public_key())
    }

    fn redeem(&self, label: &str, claims: Vec<Claim<'_>>, destinations: &[Address]) -> Result<(Transaction, u64)> {
        if destinations.is_empty() {
            return Err(BetError::malformed("no destination to pay"));
        }
        let input_total = claims
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(c.output.value()))
            .ok_or_else(|| BetError::malformed("claimed value overflows"))?;

        let mut tx = UnsignedTransaction::new(TRANSACTION_VERSION);
        let mut unlocks = Vec::with_capacity(claims.len());
        for claim in claims {
            tx.add_input(claim.output.outpoint, claim.sequence);
            unlocks.push(claim.unlock);
        }
        for (share, address) in signing::split_evenly(input_total, destinations.len())
            .into_iter()
            .zip(destinations)
        {
            tx.add_output(Output::new(share, Script::for_address(address)));
        }

        let (transaction, fee) = signing::sign_with_fee(
            tx,
            &unlocks,
            self.bet.amounts.fee_rate,
            input_total,
            signing::split_fee,
        )?;
        info!(path = label, txid = %transaction.txid(), fee, "built redemption");
        Ok((transaction, fee))
    }

    /// The oracle collects its payment by revealing the preimage for `winner`
    /// once the resolution timeout has passed.
    pub fn answer(
        &self,
        inscription: &Transaction,
        position: usize,
        oracle: &ParticipatingOracle,
        winner: Player,
        destination: &Address,
    ) -> Result<Redemption> {
        self.check_inscription(inscription, position)?;
        if *self.commitment(position)? != oracle.commitment() {
            return Err(BetError::inconsistent("oracle does not hold this committee seat"));
        }
        let (script, resolution, reply) = self.recover_answer(inscription, position)?;
        let claim = Claim {
            output: inscription.absolute_output(INSCRIPTION_ANSWER_INDEX)?,
            sequence: encode_relative_seconds(resolution)?,
            unlock: InputUnlock::redeem(
                oracle.key(),
                script.clone(),
                vec![
                    ScriptItem::Push(oracle.secret(winner).as_bytes().to_vec()),
                    ScriptItem::flag(true),
                    ScriptItem::flag(true),
                ],
            ),
        };
        let (transaction, fee) = self.redeem("answer", vec![claim], std::slice::from_ref(destination))?;
        Ok(Redemption {
            redeem_scripts: vec![script],
            transaction,
            recovered: RecoveredTimeout::Pair { resolution, reply },
            fee,
        })
    }

    /// The oracle stayed silent: after the reply deadline both players take
    /// its payment back, split among `destinations`.
    pub fn doesnt_answer(
        &self,
        inscription: &Transaction,
        position: usize,
        signers: [&dyn Signer; 2],
        destinations: &[Address],
    ) -> Result<Redemption> {
        self.check_inscription(inscription, position)?;
        for (player, signer) in Player::ALL.into_iter().zip(signers) {
            if self.player(signer)? != player {
                return Err(BetError::inconsistent("signers must be player A then player B"));
            }
        }
        let (script, resolution, reply) = self.recover_answer(inscription, position)?;
        let claim = Claim {
            output: inscription.absolute_output(INSCRIPTION_ANSWER_INDEX)?,
            sequence: encode_relative_seconds(reply)?,
            unlock: InputUnlock::multisig(
                signers.to_vec(),
                script.clone(),
                vec![ScriptItem::flag(false), ScriptItem::flag(true)],
            ),
        };
        let (transaction, fee) = self.redeem("doesnt-answer", vec![claim], destinations)?;
        Ok(Redemption {
            redeem_scripts: vec![script],
            transaction,
            recovered: RecoveredTimeout::Pair { resolution, reply },
            fee,
        })
    }

    /// Oracle `position` announced the loser while `required` other oracles
    /// announced the claimant: the claimant takes the oracle's payment.
    pub fn wrong_answer(
        &self,
        inscription: &Transaction,
        position: usize,
        claimant: &dyn Signer,
        revealed: &RevealedPreimages,
        destination: &Address,
    ) -> Result<Redemption> {
        self.check_inscription(inscription, position)?;
        let winner = self.player(claimant)?;
        let wrong = revealed.get(position).ok_or_else(|| {
            BetError::inconsistent(format!("oracle {position} has not answered"))
        })?;
        if self.commitment(position)?.outcome_of(wrong) != Some(winner.other()) {
            return Err(BetError::inconsistent(format!(
                "oracle {position} did not announce player {}",
                winner.other()
            )));
        }
        self.require_matches(revealed, winner, Some(position))?;

        let (script, resolution, reply) = self.recover_answer(inscription, position)?;
        let mut args = revealed.script_items(Some(position));
        args.push(ScriptItem::Push(wrong.to_vec()));
        args.push(ScriptItem::flag(winner.selector()));
        args.push(ScriptItem::flag(false));
        let claim = Claim {
            output: inscription.absolute_output(INSCRIPTION_ANSWER_INDEX)?,
            sequence: SEQUENCE_FINAL,
            unlock: InputUnlock::redeem(claimant, script.clone(), args),
        };
        let (transaction, fee) = self.redeem("wrong-answer", vec![claim], std::slice::from_ref(destination))?;
        Ok(Redemption {
            redeem_scripts: vec![script],
            transaction,
            recovered: RecoveredTimeout::Pair { resolution, reply },
            fee,
        })
    }

    /// Oracle `position` revealed both secrets: the claimant takes its deposit.
    pub fn two_answers(
        &self,
        inscription: &Transaction,
        position: usize,
        claimant: &dyn Signer,
        preimages: [&[u8]; 2],
        destination: &Address,
    ) -> Result<Redemption> {
        self.check_inscription(inscription, position)?;
        let player = self.player(claimant)?;
        let commitment = self.commitment(position)?;
        for outcome in Player::ALL {
            if commitment.outcome_of(preimages[outcome.index()]) != Some(outcome) {
                return Err(BetError::inconsistent(format!(
                    "preimage for player {outcome} does not open oracle {position}'s hash"
                )));
            }
        }
        let (script, reply) = self.recover_insurance(inscription, position)?;
        let claim = Claim {
            output: inscription.absolute_output(INSCRIPTION_INSURANCE_INDEX)?,
            sequence: SEQUENCE_FINAL,
            unlock: InputUnlock::redeem(
                claimant,
                script.clone(),
                vec![
                    ScriptItem::flag(player.selector()),
                    ScriptItem::Push(preimages[1].to_vec()),
                    ScriptItem::Push(preimages[0].to_vec()),
                    ScriptItem::flag(true),
                ],
            ),
        };
        let (transaction, fee) = self.redeem("two-answers", vec![claim], std::slice::from_ref(destination))?;
        Ok(Redemption {
            redeem_scripts: vec![script],
            transaction,
            recovered: RecoveredTimeout::Single(reply),
            fee,
        })
    }

    /// The winner takes both prizes: the loser's through the preimage
    /// threshold and their own once the resolution timeout has passed.
    pub fn winner_prize(
        &self,
        promise: &Transaction,
        winner: &dyn Signer,
        revealed: &RevealedPreimages,
        destination: &Address,
    ) -> Result<Redemption> {
        let player = self.player(winner)?;
        self.require_matches(revealed, player, None)?;
        let loser = player.other();
        let (loser_script, _) = self.recover_prize(promise, loser)?;
        let (own_script, resolution) = self.recover_prize(promise, player)?;

        let mut args = revealed.script_items(None);
        args.push(ScriptItem::flag(true));
        let claims = vec![
            Claim {
                output: promise.absolute_output(prize_index(loser))?,
                sequence: SEQUENCE_FINAL,
                unlock: InputUnlock::redeem(winner, loser_script.clone(), args),
            },
            Claim {
                output: promise.absolute_output(prize_index(player))?,
                sequence: encode_relative_seconds(resolution)?,
                unlock: InputUnlock::redeem(winner, own_script.clone(), vec![ScriptItem::Op(OP_0)]),
            },
        ];
        let (transaction, fee) = self.redeem("winner-prize", claims, std::slice::from_ref(destination))?;
        Ok(Redemption {
            redeem_scripts: vec![loser_script, own_script],
            transaction,
            recovered: RecoveredTimeout::Single(resolution),
            fee,
        })
    }

    /// A player takes back their own prize after the resolution timeout
    pub fn prize_refund(&self, promise: &Transaction, owner: &dyn Signer, destination: &Address) -> Result<Redemption> {
        let player = self.player(owner)?;
        let (script, resolution) = self.recover_prize(promise, player)?;
        let claim = Claim {
            output: promise.absolute_output(prize_index(player))?,
            sequence: encode_relative_seconds(resolution)?,
            unlock: InputUnlock::redeem(owner, script.clone(), vec![ScriptItem::Op(OP_0)]),
        };
        let (transaction, fee) = self.redeem("prize-refund", vec![claim], std::slice::from_ref(destination))?;
        Ok(Redemption {
            redeem_scripts: vec![script],
            transaction,
            recovered: RecoveredTimeout::Single(resolution),
            fee,
        })
    }

    /// The oracle recovers its deposit after the reply deadline
    pub fn deposit_refund(
        &self,
        inscription: &Transaction,
        position: usize,
        oracle: &ParticipatingOracle,
        destination: &Address,
    ) -> Result<Redemption> {
        self.check_inscription(inscription, position)?;
        if *self.commitment(position)? != oracle.commitment() {
            return Err(BetError::inconsistent("oracle does not hold this committee seat"));
        }
        let (script, reply) = self.recover_insurance(inscription, position)?;
        let claim = Claim {
            output: inscription.absolute_output(INSCRIPTION_INSURANCE_INDEX)?,
            sequence: encode_relative_seconds(reply)?,
            unlock: InputUnlock::redeem(oracle.key(), script.clone(), vec![ScriptItem::Op(OP_0)]),
        };
        let (transaction, fee) = self.redeem("deposit-refund", vec![claim], std::slice::from_ref(destination))?;
        Ok(Redemption {
            redeem_scripts: vec![script],
            transaction,
            recovered: RecoveredTimeout::Single(reply),
            fee,
        })
    }

    fn require_matches(&self, revealed: &RevealedPreimages, winner: Player, exclude: Option<usize>) -> Result<()> {
        if revealed.len() != self.committee.len() {
            return Err(BetError::inconsistent(format!(
                "{} preimage slots for a committee of {}",
                revealed.len(),
                self.committee.len()
            )));
        }
        let matches = revealed.matches(self.committee, winner, exclude);
        if matches < self.bet.required_hashes {
            return Err(BetError::inconsistent(format!(
                "{} preimages announce player {winner}, {} required",
                matches, self.bet.required_hashes
            )));
        }
        Ok(())
    }
}
