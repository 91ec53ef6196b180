//! BetPromise: the transaction both players fund
//!
//! Outputs, in order: OP_RETURN commitment, prize A, prize B, one 2-of-2
//! payment per committee oracle, then each player's change when non-zero.
//! Oracle costs and the fee are split with player A taking the odd satoshi.

use crate::bet::{Bet, BetCommitment, Player};
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::keys::Address;
use crate::oracle::{Oracle, OracleCommitment};
use crate::redeem::RedeemContext;
use crate::script::Script;
use crate::signing::{self, InputUnlock, Signer};
use crate::transaction::{AbsoluteOutput, Output, Transaction, UnsignedTransaction};
use tracing::{debug, info};

/// One player's contribution to the promise
pub struct PlayerFunding<'a> {
    /// Pay-to-pubkey-hash outputs of the player's key
    pub outputs: Vec<AbsoluteOutput>,
    pub change: Address,
    pub signer: &'a dyn Signer,
}

impl PlayerFunding<'_> {
    fn total(&self) -> Result<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value()))
            .ok_or_else(|| BetError::malformed("funding total overflows"))
    }
}

/// A signed promise and the scripts its outputs commit to
#[derive(Debug, Clone)]
pub struct BetPromise {
    pub transaction: Transaction,
    /// Prize scripts of player A and player B
    pub prize_scripts: [Script; 2],
    pub oracle_payment_script: Script,
    pub fee: u64,
}

impl BetPromise {
    pub fn prize_output(&self, owner: Player) -> Result<AbsoluteOutput> {
        self.transaction.absolute_output(prize_index(owner))
    }

    pub fn oracle_output(&self, position: usize) -> Result<AbsoluteOutput> {
        self.transaction
            .absolute_output(PROMISE_FIRST_ORACLE_INDEX + position)
    }
}

pub fn prize_index(owner: Player) -> usize {
    match owner {
        Player::A => PROMISE_PRIZE_A_INDEX,
        Player::B => PROMISE_PRIZE_B_INDEX,
    }
}

/// Build and sign the promise for `committee`
pub fn build_promise(
    bet: &Bet,
    committee: &[OracleCommitment],
    funding: [PlayerFunding<'_>; 2],
) -> Result<BetPromise> {
    bet.validate()?;
    bet.validate_commitments(committee)?;
    for player in Player::ALL {
        check_funding(bet, player, &funding[player.index()])?;
    }

    let ctx = RedeemContext::new(bet, committee);
    let resolution = bet.timeout.seconds()?;
    ctx.check_spendable(resolution, resolution)?;
    let prize_scripts = [ctx.prize(Player::A, resolution)?, ctx.prize(Player::B, resolution)?];
    let oracle_payment_script = ctx.oracle_payment()?;

    let per_oracle = bet.amounts.oracle_output_value()?;
    let oracle_total = per_oracle
        .checked_mul(committee.len() as u64)
        .ok_or_else(|| BetError::malformed("oracle payments overflow"))?;
    let oracle_shares = signing::split_evenly(oracle_total, 2);

    let mut changes = [0u64; 2];
    for player in Player::ALL {
        let required = bet
            .amounts
            .pot_amount
            .checked_add(oracle_shares[player.index()])
            .ok_or_else(|| BetError::malformed("stake overflows"))?;
        let available = funding[player.index()].total()?;
        changes[player.index()] = available
            .checked_sub(required)
            .ok_or(BetError::InsufficientFunds { required, available })?;
    }

    let committee_oracles: Vec<Oracle> = committee.iter().map(|c| c.oracle).collect();
    let commitment = BetCommitment::new(bet, &committee_oracles).to_script()?;

    let mut tx = UnsignedTransaction::new(TRANSACTION_VERSION);
    tx.add_output(Output::new(0, commitment));
    for script in &prize_scripts {
        tx.add_output(Output::new(bet.amounts.pot_amount, script.to_p2sh()));
    }
    for _ in committee {
        tx.add_output(Output::new(per_oracle, oracle_payment_script.to_p2sh()));
    }
    let mut change_index = [None; 2];
    for player in Player::ALL {
        let change = changes[player.index()];
        if change > 0 {
            let script = Script::for_address(&funding[player.index()].change);
            change_index[player.index()] = Some(tx.add_output(Output::new(change, script)));
        }
    }

    let mut unlocks = Vec::new();
    let mut input_total = 0u64;
    for player in Player::ALL {
        let contribution = &funding[player.index()];
        for output in &contribution.outputs {
            tx.add_input(output.outpoint, SEQUENCE_FINAL);
            unlocks.push(InputUnlock::pay_to_pubkey_hash(contribution.signer));
        }
        input_total = input_total
            .checked_add(contribution.total()?)
            .ok_or_else(|| BetError::malformed("funding total overflows"))?;
    }

    let (transaction, fee) = signing::sign_with_fee(tx, &unlocks, bet.amounts.fee_rate, input_total, |outputs, fee| {
        let shares = signing::split_evenly(fee, 2);
        for player in Player::ALL {
            let share = shares[player.index()];
            match change_index[player.index()] {
                Some(index) => signing::subtract_fee(&mut outputs[index], share)?,
                None if share > 0 => {
                    return Err(BetError::InsufficientFunds {
                        required: share,
                        available: 0,
                    })
                }
                None => {}
            }
        }
        Ok(())
    })?;

    debug!(oracles = committee.len(), ?changes, "promise outputs assigned");
    info!(txid = %transaction.txid(), fee, "built bet promise");
    Ok(BetPromise {
        transaction,
        prize_scripts,
        oracle_payment_script,
        fee,
    })
}

fn check_funding(bet: &Bet, player: Player, funding: &PlayerFunding<'_>) -> Result<()> {
    let key = funding.signer.public_key();
    if key != *bet.player_key(player) {
        return Err(BetError::inconsistent(format!(
            "signer for player {player} does not hold the declared key"
        )));
    }
    if funding.outputs.is_empty() {
        return Err(BetError::InsufficientFunds {
            required: bet.amounts.pot_amount,
            available: 0,
        });
    }
    let expected = Script::pay_to_pubkey_hash(&key.pubkey_hash());
    if let Some(bad) = funding.outputs.iter().find(|o| *o.script_pubkey() != expected) {
        return Err(BetError::inconsistent(format!(
            "funding {} of player {player} is not payable by its key",
            bad.outpoint
        )));
    }
    Ok(())
}

/// Check that a promise built by the peer commits to `bet` and `committee`
pub fn verify_promise(bet: &Bet, committee: &[OracleCommitment], promise: &Transaction) -> Result<()> {
    let commitment = BetCommitment::from_script(
        &promise.output(PROMISE_COMMITMENT_INDEX)?.script_pubkey,
        bet.network,
    )?;
    let committee_oracles: Vec<Oracle> = committee.iter().map(|c| c.oracle).collect();
    if !commitment.matches(bet) || commitment.committee != committee_oracles {
        return Err(BetError::inconsistent("promise commits to different terms"));
    }

    let ctx = RedeemContext::new(bet, committee);
    let resolution = bet.timeout.seconds()?;
    ctx.check_spendable(resolution, resolution)?;
    for player in Player::ALL {
        let output = promise.output(prize_index(player))?;
        if output.value != bet.amounts.pot_amount
            || output.script_pubkey != ctx.prize(player, resolution)?.to_p2sh()
        {
            return Err(BetError::inconsistent(format!("prize of player {player} does not match")));
        }
    }
    let payment = ctx.oracle_payment()?.to_p2sh();
    let per_oracle = bet.amounts.oracle_output_value()?;
    for position in 0..committee.len() {
        let output = promise.output(PROMISE_FIRST_ORACLE_INDEX + position)?;
        if output.value != per_oracle || output.script_pubkey != payment {
            return Err(BetError::inconsistent(format!(
                "payment of oracle {position} does not match"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::tests::{key, sample_bet};
    use crate::keys::PrivateKey;
    use crate::oracle::{ParticipatingOracle, Secret};
    use crate::types::{OutPoint, Txid};

    fn committee_for(bet: &Bet) -> Vec<OracleCommitment> {
        (0..3u8)
            .map(|i| {
                ParticipatingOracle::with_secrets(
                    key(10 + i),
                    [
                        Secret::from_bytes(&[50 + i; 32]).unwrap(),
                        Secret::from_bytes(&[80 + i; 32]).unwrap(),
                    ],
                )
                .commitment()
            })
            .inspect(|c| assert!(bet.oracles.contains(&c.oracle)))
            .collect()
    }

    fn utxo(owner: &PrivateKey, tag: u8, value: u64) -> AbsoluteOutput {
        AbsoluteOutput::new(
            OutPoint::new(Txid([tag; 32]), 0),
            Output::new(value, Script::pay_to_pubkey_hash(&owner.public_key().pubkey_hash())),
        )
    }

    #[test]
    fn test_promise_output_order() {
        let bet = sample_bet();
        let committee = committee_for(&bet);
        let (a, b) = (key(1), key(2));
        let promise = build_promise(
            &bet,
            &committee,
            [
                PlayerFunding {
                    outputs: vec![utxo(&a, 1, 200_000)],
                    change: a.public_key().address(),
                    signer: &a,
                },
                PlayerFunding {
                    outputs: vec![utxo(&b, 2, 150_000)],
                    change: b.public_key().address(),
                    signer: &b,
                },
            ],
        )
        .unwrap();

        let outputs = promise.transaction.outputs();
        assert_eq!(outputs.len(), 3 + committee.len() + 2);
        assert!(outputs[0].script_pubkey.null_data().is_some());
        assert_eq!(outputs[1].value, 100_000);
        assert_eq!(outputs[1].script_pubkey, promise.prize_scripts[0].to_p2sh());
        assert_eq!(outputs[2].script_pubkey, promise.prize_scripts[1].to_p2sh());
        for output in &outputs[3..6] {
            assert_eq!(output.value, 8_000);
            assert_eq!(output.script_pubkey, promise.oracle_payment_script.to_p2sh());
        }
        // 24_000 of oracle costs split evenly; A pays the odd fee satoshi
        let fee_a = (promise.fee + 1) / 2;
        assert_eq!(outputs[6].value, 200_000 - 100_000 - 12_000 - fee_a);
        assert_eq!(outputs[7].value, 150_000 - 100_000 - 12_000 - promise.fee / 2);
        assert_eq!(promise.transaction.total_output_value().unwrap() + promise.fee, 350_000);

        verify_promise(&bet, &committee, &promise.transaction).unwrap();
    }

    #[test]
    fn test_promise_rejects_committee_beyond_push_limit() {
        let mut bet = sample_bet();
        bet.max_oracles = 7;
        bet.oracles = (10..17).map(|b| Oracle::new(*key(b).public_key())).collect();
        let committee: Vec<OracleCommitment> = (0..7u8)
            .map(|i| ParticipatingOracle::new(key(10 + i)).commitment())
            .collect();
        let (a, b) = (key(1), key(2));
        let result = build_promise(
            &bet,
            &committee,
            [
                PlayerFunding {
                    outputs: vec![utxo(&a, 1, 500_000)],
                    change: a.public_key().address(),
                    signer: &a,
                },
                PlayerFunding {
                    outputs: vec![utxo(&b, 2, 500_000)],
                    change: b.public_key().address(),
                    signer: &b,
                },
            ],
        );
        assert!(matches!(result, Err(BetError::ProtocolInconsistency(_))));
    }

    #[test]
    fn test_promise_requires_change_for_fee() {
        let bet = sample_bet();
        let committee = committee_for(&bet);
        let (a, b) = (key(1), key(2));
        let result = build_promise(
            &bet,
            &committee,
            [
                PlayerFunding {
                    outputs: vec![utxo(&a, 1, 112_000)],
                    change: a.public_key().address(),
                    signer: &a,
                },
                PlayerFunding {
                    outputs: vec![utxo(&b, 2, 150_000)],
                    change: b.public_key().address(),
                    signer: &b,
                },
            ],
        );
        assert!(matches!(result, Err(BetError::InsufficientFunds { .. })));
    }

    #[test]
    fn test_promise_rejects_short_stake() {
        let bet = sample_bet();
        let committee = committee_for(&bet);
        let (a, b) = (key(1), key(2));
        let result = build_promise(
            &bet,
            &committee,
            [
                PlayerFunding {
                    outputs: vec![utxo(&a, 1, 50_000)],
                    change: a.public_key().address(),
                    signer: &a,
                },
                PlayerFunding {
                    outputs: vec![utxo(&b, 2, 150_000)],
                    change: b.public_key().address(),
                    signer: &b,
                },
            ],
        );
        assert_eq!(
            result.err(),
            Some(BetError::InsufficientFunds {
                required: 112_000,
                available: 50_000
            })
        );
    }

    #[test]
    fn test_promise_rejects_swapped_signers() {
        let bet = sample_bet();
        let committee = committee_for(&bet);
        let (a, b) = (key(1), key(2));
        let result = build_promise(
            &bet,
            &committee,
            [
                PlayerFunding {
                    outputs: vec![utxo(&b, 1, 200_000)],
                    change: b.public_key().address(),
                    signer: &b,
                },
                PlayerFunding {
                    outputs: vec![utxo(&a, 2, 200_000)],
                    change: a.public_key().address(),
                    signer: &a,
                },
            ],
        );
        assert!(matches!(result, Err(BetError::ProtocolInconsistency(_))));
    }
}
