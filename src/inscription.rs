//! Oracle inscription: an oracle accepts its seat on the committee
//!
//! The oracle spends its promise payment, commits its two hash images and
//! locks its answer payment and equivocation deposit under its own timeouts.
//! Outputs: OP_RETURN("OBI" ‖ h0 ‖ h1), answer, insurance, first payment,
//! change when non-zero. The fee is exactly the agreed inscription fee.

use crate::bet::Bet;
use crate::config::ProtocolConfig;
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::keys::Address;
use crate::oracle::{OracleCommitment, ParticipatingOracle};
use crate::redeem::RedeemContext;
use crate::script::Script;
use crate::signing::{self, InputUnlock, Signer};
use crate::transaction::{AbsoluteOutput, Output, Transaction, UnsignedTransaction};
use tracing::info;

pub struct InscriptionRequest<'a> {
    pub bet: &'a Bet,
    pub committee: &'a [OracleCommitment],
    pub promise: &'a Transaction,
    /// The oracle's committee position
    pub position: usize,
    pub oracle: &'a ParticipatingOracle,
    /// Timeouts the oracle locks with; at least the nominal ones
    pub resolution_seconds: u32,
    pub reply_seconds: u32,
    /// Pay-to-pubkey-hash outputs of the oracle's key covering the deposit
    pub funding: Vec<AbsoluteOutput>,
    pub change: Address,
    /// Player A and player B, co-signing the promise payment
    pub player_signers: [&'a dyn Signer; 2],
}

#[derive(Debug, Clone)]
pub struct Inscription {
    pub transaction: Transaction,
    pub answer_script: Script,
    pub insurance_script: Script,
    pub resolution_seconds: u32,
    pub reply_seconds: u32,
}

impl Inscription {
    pub fn answer_output(&self) -> Result<AbsoluteOutput> {
        self.transaction.absolute_output(INSCRIPTION_ANSWER_INDEX)
    }

    pub fn insurance_output(&self) -> Result<AbsoluteOutput> {
        self.transaction.absolute_output(INSCRIPTION_INSURANCE_INDEX)
    }
}

pub fn build_inscription(config: &ProtocolConfig, request: InscriptionRequest<'_>) -> Result<Inscription> {
    let InscriptionRequest {
        bet,
        committee,
        promise,
        position,
        oracle,
        resolution_seconds,
        reply_seconds,
        funding,
        change,
        player_signers,
    } = request;

    let commitment = committee.get(position).ok_or_else(|| {
        BetError::malformed(format!("committee position {position} out of range"))
    })?;
    if *commitment != oracle.commitment() {
        return Err(BetError::inconsistent(format!(
            "oracle {} does not hold committee seat {position}",
            oracle.oracle()
        )));
    }
    let (nominal_resolution, nominal_reply) = config.nominal_timeouts(bet)?;
    if resolution_seconds < nominal_resolution || reply_seconds < nominal_reply {
        return Err(BetError::inconsistent(format!(
            "timeouts ({resolution_seconds}s, {reply_seconds}s) are below the nominal \
             ({nominal_resolution}s, {nominal_reply}s)"
        )));
    }
    if reply_seconds <= resolution_seconds {
        return Err(BetError::inconsistent("reply deadline must follow resolution"));
    }
    for (signer, key) in player_signers.iter().zip(&bet.players) {
        if signer.public_key() != *key {
            return Err(BetError::inconsistent("player signers do not match the bet"));
        }
    }

    let ctx = RedeemContext::new(bet, committee);
    let payment_script = ctx.oracle_payment()?;
    let payment = promise.absolute_output(PROMISE_FIRST_ORACLE_INDEX + position)?;
    if *payment.script_pubkey() != payment_script.to_p2sh()
        || payment.value() != bet.amounts.oracle_output_value()?
    {
        return Err(BetError::inconsistent(format!(
            "promise output for oracle {position} does not match the bet"
        )));
    }

    let oracle_key = oracle.key();
    let own_script = Script::pay_to_pubkey_hash(&oracle_key.public_key().pubkey_hash());
    if funding.iter().any(|o| *o.script_pubkey() != own_script) {
        return Err(BetError::inconsistent("funding is not payable by the oracle key"));
    }
    let available = funding
        .iter()
        .try_fold(0u64, |acc, o| acc.checked_add(o.value()))
        .ok_or_else(|| BetError::malformed("funding total overflows"))?;
    let change_value = available
        .checked_sub(bet.amounts.penalty)
        .ok_or(BetError::InsufficientFunds {
            required: bet.amounts.penalty,
            available,
        })?;

    ctx.check_spendable(resolution_seconds, reply_seconds)?;
    let answer_script = ctx.answer(position, resolution_seconds, reply_seconds)?;
    let insurance_script = ctx.insurance(position, reply_seconds)?;

    let mut tx = UnsignedTransaction::new(TRANSACTION_VERSION);
    tx.add_output(Output::new(
        0,
        Script::null_data_commitment(&commitment.inscription_payload())?,
    ));
    tx.add_output(Output::new(bet.amounts.oracle_payment, answer_script.to_p2sh()));
    tx.add_output(Output::new(bet.amounts.penalty, insurance_script.to_p2sh()));
    tx.add_output(Output::new(bet.amounts.first_payment, own_script));
    if change_value > 0 {
        tx.add_output(Output::new(change_value, Script::for_address(&change)));
    }

    tx.add_input(payment.outpoint, SEQUENCE_FINAL);
    let mut unlocks = vec![InputUnlock::multisig(
        player_signers.to_vec(),
        payment_script,
        Vec::new(),
    )];
    for output in &funding {
        tx.add_input(output.outpoint, SEQUENCE_FINAL);
        unlocks.push(InputUnlock::pay_to_pubkey_hash(oracle_key));
    }
    signing::sign_all(&mut tx, &unlocks)?;
    let transaction = tx.finalize()?;

    let spent = payment
        .value()
        .checked_add(available)
        .ok_or_else(|| BetError::malformed("inscription inputs overflow"))?;
    if transaction.total_output_value()?.checked_add(bet.amounts.inscription_fee) != Some(spent) {
        return Err(BetError::inconsistent("inscription does not pay exactly its fee"));
    }

    info!(txid = %transaction.txid(), position, resolution_seconds, reply_seconds, "built oracle inscription");
    Ok(Inscription {
        transaction,
        answer_script,
        insurance_script,
        resolution_seconds,
        reply_seconds,
    })
}
