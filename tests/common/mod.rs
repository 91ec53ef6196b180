//! Shared fixtures for integration tests

#![allow(dead_code)]

use oracle_bet::channel::ChannelDescriptor;
use oracle_bet::inscription::{Inscription, InscriptionRequest};
use oracle_bet::oracle::Secret;
use oracle_bet::promise::{BetPromise, PlayerFunding};
use oracle_bet::script::Script;
use oracle_bet::timelock::SearchBounds;
use oracle_bet::*;

pub const RESOLUTION: u32 = 7 * 86_400;
pub const REPLY: u32 = 2 * RESOLUTION;

pub fn key(byte: u8) -> PrivateKey {
    PrivateKey::from_bytes(&[byte; 32], true, Network::Testnet).unwrap()
}

pub fn utxo(owner: &PrivateKey, tag: u8, value: u64) -> AbsoluteOutput {
    AbsoluteOutput::new(
        OutPoint::new(Txid([tag; 32]), 0),
        Output::new(value, Script::pay_to_pubkey_hash(&owner.public_key().pubkey_hash())),
    )
}

pub struct Fixture {
    pub engine: BetEngine,
    pub bet: Bet,
    /// Player A then player B
    pub players: [PrivateKey; 2],
    pub oracles: Vec<ParticipatingOracle>,
    pub committee: Vec<OracleCommitment>,
}

impl Fixture {
    pub fn new() -> Self {
        let players = [key(1), key(2)];
        let oracles: Vec<ParticipatingOracle> = (0..3u8)
            .map(|i| {
                ParticipatingOracle::with_secrets(
                    key(10 + i),
                    [
                        Secret::from_bytes(&[0x50 + i; 32]).unwrap(),
                        Secret::from_bytes(&[0x80 + i; 32]).unwrap(),
                    ],
                )
            })
            .collect();
        let committee: Vec<OracleCommitment> = oracles.iter().map(|o| o.commitment()).collect();
        let bet = Bet {
            network: Network::Testnet,
            description: "Rain in Lisbon on 2026-11-01".to_string(),
            min_oracles: 3,
            max_oracles: 3,
            required_hashes: 2,
            oracles: committee.iter().map(|c| c.oracle).collect(),
            backup_oracles: Vec::new(),
            players: [*players[0].public_key(), *players[1].public_key()],
            amounts: Amounts {
                first_payment: 1_000,
                oracle_payment: 5_000,
                pot_amount: 100_000,
                inscription_fee: 2_000,
                penalty: 20_000,
                fee_rate: 2,
            },
            timeout: BetTimeout::new(TimeUnit::Days, 7),
            channel: ChannelDescriptor::secure(["tor://alice.onion", "tor://bob.onion"]).unwrap(),
        };
        let engine = BetEngine::new(ProtocolConfig {
            network: Network::Testnet,
            search: SearchBounds { single: 8, pair: 8 },
            reply_timeout_factor: 2,
        })
        .unwrap();
        Self {
            engine,
            bet,
            players,
            oracles,
            committee,
        }
    }

    pub fn player(&self, player: Player) -> &PrivateKey {
        &self.players[player.index()]
    }

    pub fn funding(&self, player: Player, value: u64) -> PlayerFunding<'_> {
        let key = self.player(player);
        PlayerFunding {
            outputs: vec![utxo(key, 1 + player.index() as u8, value)],
            change: key.public_key().address(),
            signer: key,
        }
    }

    pub fn promise(&self) -> BetPromise {
        self.engine
            .build_promise(
                &self.bet,
                &self.committee,
                [self.funding(Player::A, 200_000), self.funding(Player::B, 200_000)],
            )
            .unwrap()
    }

    /// Inscribe oracle `position` with timeouts `offsets` steps of 512s past nominal
    pub fn inscribe(&self, promise: &Transaction, position: usize, offsets: (u32, u32)) -> Inscription {
        let oracle = &self.oracles[position];
        self.engine
            .build_inscription(InscriptionRequest {
                bet: &self.bet,
                committee: &self.committee,
                promise,
                position,
                oracle,
                resolution_seconds: RESOLUTION + offsets.0 * 512,
                reply_seconds: REPLY + offsets.1 * 512,
                funding: vec![utxo(oracle.key(), 30 + position as u8, 25_000)],
                change: oracle.oracle().address(),
                player_signers: [self.player(Player::A), self.player(Player::B)],
            })
            .unwrap()
    }

    pub fn address(&self, byte: u8) -> Address {
        key(byte).public_key().address()
    }
}

/// Check that `input` of `tx` spends `spent` with `redeem_script` and that its
/// first signature was made by `signer` over that script
pub fn assert_spends(tx: &Transaction, input: usize, spent: &AbsoluteOutput, redeem_script: &Script, signer: &PublicKey) {
    let txin = &tx.inputs()[input];
    assert_eq!(txin.prevout, spent.outpoint);
    assert_eq!(spent.script_pubkey(), &redeem_script.to_p2sh());

    let tokens = txin.script_sig.tokens().unwrap();
    assert_eq!(tokens.last().unwrap().payload().unwrap(), redeem_script.as_bytes());

    let signature = tokens
        .iter()
        .filter_map(|t| t.payload())
        .find(|p| (60..=73).contains(&p.len()) && p[0] == 0x30)
        .unwrap();
    let unsigned = UnsignedTransaction::deserialize(&tx.serialize()).unwrap();
    assert!(oracle_bet::signing::verify_input_signature(signer, &unsigned, input, redeem_script, signature).unwrap());
}
