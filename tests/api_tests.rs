//! Tests for the public API surface and published vectors

use oracle_bet::base58;
use oracle_bet::codec;
use oracle_bet::keys::{compress, decompress};
use oracle_bet::script::{Script, ScriptToken};
use oracle_bet::*;

#[test]
fn test_engine_default_config() {
    let engine = BetEngine::default();
    assert_eq!(engine.config().search.single, DEFAULT_SEARCH_BOUND);
    assert_eq!(engine.config().reply_timeout_factor, DEFAULT_REPLY_TIMEOUT_FACTOR);
}

#[test]
fn test_engine_rejects_invalid_config() {
    let mut config = ProtocolConfig::default();
    config.search.pair = 0;
    assert!(matches!(BetEngine::new(config), Err(BetError::Configuration(_))));
}

#[test]
fn test_output_vector() {
    let output = Output::new(
        91234,
        Script::from_hex("76a914c8e90996c7c6080ee06284600c684ed904d14c5c88ac").unwrap(),
    );
    assert_eq!(
        codec::to_hex(&output.serialize()),
        "62640100000000001976A914C8E90996C7C6080EE06284600C684ED904D14C5C88AC"
    );
    assert_eq!(Output::deserialize(&output.serialize()).unwrap(), output);
}

#[test]
fn test_wif_vector() {
    let key = PrivateKey::from_wif("5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ").unwrap();
    assert_eq!(
        codec::to_hex(key.secret_bytes()),
        "0C28FCA386C7A227600B2FE50B7CAE11EC86D3BF1FBE471BE89827E19D72AA1D"
    );
    assert!(!key.is_compressed());
    assert_eq!(key.network(), Network::Mainnet);
    assert_eq!(key.to_wif(), "5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ");
}

#[test]
fn test_address_stable_under_reserialization() {
    let key = PrivateKey::from_bytes(&[0x42; 32], false, Network::Testnet).unwrap();
    let public = *key.public_key();
    let reparsed = PublicKey::from_bytes(&public.to_bytes(), Network::Testnet).unwrap();
    assert_eq!(reparsed, public);
    assert_eq!(reparsed.address(), public.address());
    assert_ne!(public.compress().address(), public.address());
}

#[test]
fn test_compression_round_trip() {
    for byte in 1..=16u8 {
        let key = PrivateKey::from_bytes(&[byte; 32], false, Network::Mainnet).unwrap();
        let full = key.public_key().to_bytes();
        let short = compress(&full).unwrap();
        assert_eq!(decompress(&short).unwrap().to_vec(), full);
    }
}

#[test]
fn test_base58check_detects_any_single_byte_flip() {
    let encoded = base58::encode_check(&[0x00, 0x14, 0x55, 0xaa, 0xff, 0x01]);
    let mut raw = bs58::decode(&encoded).into_vec().unwrap();
    for i in 0..raw.len() {
        raw[i] ^= 0x01;
        let corrupted = bs58::encode(&raw).into_string();
        assert!(base58::decode_check(&corrupted).is_err(), "flip at {i} went undetected");
        raw[i] ^= 0x01;
    }
}

#[test]
fn test_parse_multisig_tokens() {
    let a = PrivateKey::from_bytes(&[1; 32], true, Network::Mainnet).unwrap();
    let b = PrivateKey::from_bytes(&[2; 32], true, Network::Mainnet).unwrap();
    let script = Script::multisig(2, &[*a.public_key(), *b.public_key()]).unwrap();
    let names: Vec<String> = script.tokens().unwrap().iter().map(ScriptToken::name).collect();
    assert_eq!(
        names,
        vec!["OP_2", "OP_PUSH_33_bytes", "OP_PUSH_33_bytes", "OP_2", "OP_CHECKMULTISIG"]
    );
}

#[test]
fn test_transaction_hex_round_trip() {
    let key = PrivateKey::from_bytes(&[3; 32], true, Network::Mainnet).unwrap();
    let mut unsigned = UnsignedTransaction::default();
    unsigned.add_input(OutPoint::new(Txid([8; 32]), 2), SEQUENCE_FINAL);
    unsigned.add_output(Output::new(
        10_000,
        Script::pay_to_pubkey_hash(&key.public_key().pubkey_hash()),
    ));
    oracle_bet::signing::sign_all(
        &mut unsigned,
        &[oracle_bet::signing::InputUnlock::pay_to_pubkey_hash(&key)],
    )
    .unwrap();
    let tx = unsigned.finalize().unwrap();
    let parsed = Transaction::from_hex(&tx.to_hex().to_lowercase()).unwrap();
    assert_eq!(parsed, tx);
    assert_eq!(parsed.txid(), tx.txid());
    assert_eq!(tx.txid().to_string().parse::<Txid>().unwrap(), tx.txid());
}
