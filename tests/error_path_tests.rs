//! Tests for error paths and edge cases

mod common;

use common::*;
use oracle_bet::codec;
use oracle_bet::opcodes::encode_push;
use oracle_bet::script::Script;
use oracle_bet::timelock::{encode_relative_seconds, SearchBounds};
use oracle_bet::*;

#[test]
fn test_malformed_inputs() {
    assert!(matches!(codec::from_hex("abc"), Err(BetError::MalformedInput(_))));
    assert!(matches!(
        PrivateKey::from_bytes(&[1; 31], true, Network::Mainnet),
        Err(BetError::MalformedInput(_))
    ));
    assert!(matches!(
        PublicKey::from_bytes(&[2; 34], Network::Mainnet),
        Err(BetError::MalformedInput(_))
    ));
    assert!(matches!(
        Script::new(vec![0xba]).tokens(),
        Err(BetError::MalformedInput(_))
    ));
    assert!(matches!(
        PrivateKey::from_wif("5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTK"),
        Err(BetError::MalformedInput(_))
    ));
}

#[test]
fn test_push_limits() {
    assert_eq!(encode_push(&[0u8; 75]).unwrap()[0], 75);
    assert_eq!(encode_push(&[0u8; 76]).unwrap()[0], 0x4c);
    assert_eq!(encode_push(&[0u8; 256]).unwrap()[0], 0x4d);
    assert!(matches!(encode_push(&[0u8; 521]), Err(BetError::MalformedInput(_))));
}

#[test]
fn test_relative_timeout_limit() {
    assert!(encode_relative_seconds(0xffff * 512).is_ok());
    assert!(matches!(
        encode_relative_seconds(0x10000 * 512),
        Err(BetError::MalformedInput(_))
    ));
}

#[test]
fn test_search_exhaustion_is_fatal() {
    let fx = Fixture::new();
    let promise = fx.promise();
    // committed 9 steps past nominal; the fixture searches 8
    let inscription = fx.inscribe(&promise.transaction, 0, (9, 0));
    let resolver = fx.engine.resolver(&fx.bet, &fx.committee).unwrap();
    let result = resolver.answer(&inscription.transaction, 0, &fx.oracles[0], Player::A, &fx.address(50));
    assert!(matches!(result, Err(BetError::ReconstructionFailure(_))));

    let wider = BetEngine::new(ProtocolConfig {
        network: Network::Testnet,
        search: SearchBounds { single: 8, pair: 10 },
        reply_timeout_factor: 2,
    })
    .unwrap();
    let resolver = wider.resolver(&fx.bet, &fx.committee).unwrap();
    let redemption = resolver
        .answer(&inscription.transaction, 0, &fx.oracles[0], Player::A, &fx.address(50))
        .unwrap();
    assert_eq!(
        redemption.recovered,
        RecoveredTimeout::Pair {
            resolution: RESOLUTION + 9 * 512,
            reply: REPLY
        }
    );
}

#[test]
fn test_changed_factor_cannot_reconstruct() {
    let fx = Fixture::new();
    let promise = fx.promise();
    let inscription = fx.inscribe(&promise.transaction, 0, (0, 0));
    let engine = BetEngine::new(ProtocolConfig {
        network: Network::Testnet,
        search: SearchBounds { single: 8, pair: 8 },
        reply_timeout_factor: 3,
    })
    .unwrap();
    let resolver = engine.resolver(&fx.bet, &fx.committee).unwrap();
    let result = resolver.deposit_refund(&inscription.transaction, 0, &fx.oracles[0], &fx.address(51));
    assert!(matches!(result, Err(BetError::ReconstructionFailure(_))));
}

#[test]
fn test_inscription_below_nominal_timeout() {
    let fx = Fixture::new();
    let promise = fx.promise();
    let oracle = &fx.oracles[0];
    let result = fx.engine.build_inscription(oracle_bet::inscription::InscriptionRequest {
        bet: &fx.bet,
        committee: &fx.committee,
        promise: &promise.transaction,
        position: 0,
        oracle,
        resolution_seconds: RESOLUTION - 512,
        reply_seconds: REPLY,
        funding: vec![utxo(oracle.key(), 30, 25_000)],
        change: oracle.oracle().address(),
        player_signers: [fx.player(Player::A), fx.player(Player::B)],
    });
    assert!(matches!(result, Err(BetError::ProtocolInconsistency(_))));
}

#[test]
fn test_inscription_deposit_not_covered() {
    let fx = Fixture::new();
    let promise = fx.promise();
    let oracle = &fx.oracles[0];
    let result = fx.engine.build_inscription(oracle_bet::inscription::InscriptionRequest {
        bet: &fx.bet,
        committee: &fx.committee,
        promise: &promise.transaction,
        position: 0,
        oracle,
        resolution_seconds: RESOLUTION,
        reply_seconds: REPLY,
        funding: vec![utxo(oracle.key(), 30, 19_999)],
        change: oracle.oracle().address(),
        player_signers: [fx.player(Player::A), fx.player(Player::B)],
    });
    assert_eq!(
        result.err(),
        Some(BetError::InsufficientFunds {
            required: 20_000,
            available: 19_999
        })
    );
}

#[test]
fn test_inscription_wrong_seat() {
    let fx = Fixture::new();
    let promise = fx.promise();
    let oracle = &fx.oracles[1];
    let result = fx.engine.build_inscription(oracle_bet::inscription::InscriptionRequest {
        bet: &fx.bet,
        committee: &fx.committee,
        promise: &promise.transaction,
        position: 0,
        oracle,
        resolution_seconds: RESOLUTION,
        reply_seconds: REPLY,
        funding: vec![utxo(oracle.key(), 30, 25_000)],
        change: oracle.oracle().address(),
        player_signers: [fx.player(Player::A), fx.player(Player::B)],
    });
    assert!(matches!(result, Err(BetError::ProtocolInconsistency(_))));
}

#[test]
fn test_redemption_fee_exceeds_value() {
    let mut fx = Fixture::new();
    fx.bet.amounts.fee_rate = 50;
    let promise = fx.engine
        .build_promise(
            &fx.bet,
            &fx.committee,
            [fx.funding(Player::A, 400_000), fx.funding(Player::B, 400_000)],
        )
        .unwrap();
    let inscription = fx.inscribe(&promise.transaction, 0, (0, 0));
    let resolver = fx.engine.resolver(&fx.bet, &fx.committee).unwrap();
    let result = resolver.answer(&inscription.transaction, 0, &fx.oracles[0], Player::A, &fx.address(52));
    assert!(matches!(result, Err(BetError::InsufficientFunds { .. })));
}

#[test]
fn test_committee_outside_bounds() {
    let fx = Fixture::new();
    let result = fx.engine.resolver(&fx.bet, &fx.committee[..2]);
    assert!(matches!(result, Err(BetError::ProtocolInconsistency(_))));
}

#[test]
fn test_signer_outside_bet() {
    let fx = Fixture::new();
    let promise = fx.promise();
    let resolver = fx.engine.resolver(&fx.bet, &fx.committee).unwrap();
    let stranger = key(99);
    let result = resolver.prize_refund(&promise.transaction, &stranger, &fx.address(53));
    assert!(matches!(result, Err(BetError::ProtocolInconsistency(_))));
}
