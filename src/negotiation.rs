//! Off-chain exchanges between the players over a `SecureChannel`
//!
//! Topics:
//! - `bet`: canonical bet encoding
//! - `oracle-commitments`: the committee's hash images
//! - `transaction`: a serialized transaction for the peer to check
//! - `sign-request` / `signature`: remote signing of one input

use crate::bet::Bet;
use crate::channel::SecureChannel;
use crate::codec::{self, Reader};
use crate::error::{BetError, Result};
use crate::keys::{Network, PublicKey};
use crate::oracle::OracleCommitment;
use crate::script::Script;
use crate::signing::{verify_input_signature, Signer};
use crate::transaction::{Transaction, UnsignedTransaction};
use crate::types::ByteString;
use std::cell::RefCell;
use std::time::Duration;
use tracing::{debug, warn};

pub const TOPIC_BET: &str = "bet";
pub const TOPIC_COMMITMENTS: &str = "oracle-commitments";
pub const TOPIC_TRANSACTION: &str = "transaction";
pub const TOPIC_SIGN_REQUEST: &str = "sign-request";
pub const TOPIC_SIGNATURE: &str = "signature";

fn expect_message(channel: &mut dyn SecureChannel, topic: &str, timeout: Duration) -> Result<ByteString> {
    channel.receive(topic, timeout)?.ok_or_else(|| {
        warn!(topic, ?timeout, "peer did not answer");
        BetError::Collaborator(format!("timed out waiting for {topic}"))
    })
}

pub fn send_bet(channel: &mut dyn SecureChannel, bet: &Bet) -> Result<()> {
    bet.validate()?;
    channel.send(TOPIC_BET, &bet.serialize())
}

/// Receive and validate the peer's proposed bet
pub fn receive_bet(channel: &mut dyn SecureChannel, timeout: Duration) -> Result<Bet> {
    let payload = expect_message(channel, TOPIC_BET, timeout)?;
    let bet = Bet::deserialize(&payload)?;
    bet.validate()?;
    debug!(description = %bet.description, "received bet");
    Ok(bet)
}

pub fn send_commitments(channel: &mut dyn SecureChannel, commitments: &[OracleCommitment]) -> Result<()> {
    let mut payload = Vec::new();
    codec::write_varint(&mut payload, commitments.len() as u64);
    for commitment in commitments {
        commitment.serialize_into(&mut payload);
    }
    channel.send(TOPIC_COMMITMENTS, &payload)
}

/// Receive the committee's commitments and check them against `bet`
pub fn receive_commitments(
    channel: &mut dyn SecureChannel,
    bet: &Bet,
    timeout: Duration,
) -> Result<Vec<OracleCommitment>> {
    let payload = expect_message(channel, TOPIC_COMMITMENTS, timeout)?;
    let commitments = decode_commitments(&payload, bet.network)?;
    bet.validate_commitments(&commitments)?;
    Ok(commitments)
}

fn decode_commitments(payload: &[u8], network: Network) -> Result<Vec<OracleCommitment>> {
    let mut reader = Reader::new(payload);
    let count = reader.read_length()?;
    let mut commitments = Vec::with_capacity(count);
    for _ in 0..count {
        commitments.push(OracleCommitment::deserialize_from(&mut reader, network)?);
    }
    reader.finish()?;
    Ok(commitments)
}

pub fn send_transaction(channel: &mut dyn SecureChannel, transaction: &Transaction) -> Result<()> {
    channel.send(TOPIC_TRANSACTION, &transaction.serialize())
}

pub fn receive_transaction(channel: &mut dyn SecureChannel, timeout: Duration) -> Result<Transaction> {
    Transaction::deserialize(&expect_message(channel, TOPIC_TRANSACTION, timeout)?)
}

/// A request to sign input `index` of `transaction` against `script_code`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub transaction: UnsignedTransaction,
    pub index: usize,
    pub script_code: Script,
}

impl SignRequest {
    pub fn encode(&self) -> ByteString {
        let mut buf = Vec::new();
        codec::write_var_bytes(&mut buf, &self.transaction.serialize());
        codec::write_u32(&mut buf, self.index as u32);
        self.script_code.serialize_into(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let transaction = UnsignedTransaction::deserialize(reader.read_var_bytes()?)?;
        let index = reader.read_u32()? as usize;
        let script_code = Script::deserialize_from(&mut reader)?;
        reader.finish()?;
        if index >= transaction.inputs().len() {
            return Err(BetError::malformed(format!("sign request for missing input {index}")));
        }
        Ok(Self {
            transaction,
            index,
            script_code,
        })
    }
}

/// A `Signer` for the peer's key. Each signature is requested over the
/// channel and verified before use.
pub struct ChannelSigner<'c, C: SecureChannel> {
    channel: RefCell<&'c mut C>,
    peer: PublicKey,
    timeout: Duration,
}

impl<'c, C: SecureChannel> ChannelSigner<'c, C> {
    pub fn new(channel: &'c mut C, peer: PublicKey, timeout: Duration) -> Self {
        Self {
            channel: RefCell::new(channel),
            peer,
            timeout,
        }
    }
}

impl<C: SecureChannel> Signer for ChannelSigner<'_, C> {
    fn public_key(&self) -> PublicKey {
        self.peer
    }

    fn sign_input(&self, tx: &UnsignedTransaction, index: usize, script_code: &Script) -> Result<ByteString> {
        let request = SignRequest {
            transaction: tx.clone(),
            index,
            script_code: script_code.clone(),
        };
        let mut channel = self
            .channel
            .try_borrow_mut()
            .map_err(|_| BetError::Collaborator("channel is already in use".to_string()))?;
        channel.send(TOPIC_SIGN_REQUEST, &request.encode())?;
        let signature = channel.receive(TOPIC_SIGNATURE, self.timeout)?.ok_or_else(|| {
            warn!(index, "peer did not return a signature");
            BetError::Collaborator("timed out waiting for signature".to_string())
        })?;
        if signature.is_empty() {
            return Err(BetError::Signing(format!("peer declined to sign input {index}")));
        }
        if !verify_input_signature(&self.peer, tx, index, script_code, &signature)? {
            warn!(index, "peer signature does not verify");
            return Err(BetError::Signing(format!("peer signature for input {index} is invalid")));
        }
        debug!(index, "received peer signature");
        Ok(signature)
    }
}

/// Serve one sign request. Requests `approve` rejects are answered with an
/// empty signature. Returns whether a signature was sent.
pub fn answer_sign_request<F>(
    channel: &mut dyn SecureChannel,
    signer: &dyn Signer,
    timeout: Duration,
    approve: F,
) -> Result<bool>
where
    F: FnOnce(&SignRequest) -> bool,
{
    let request = SignRequest::decode(&expect_message(channel, TOPIC_SIGN_REQUEST, timeout)?)?;
    if !approve(&request) {
        warn!(index = request.index, "declined sign request");
        channel.send(TOPIC_SIGNATURE, &[])?;
        return Ok(false);
    }
    let signature = signer.sign_input(&request.transaction, request.index, &request.script_code)?;
    channel.send(TOPIC_SIGNATURE, &signature)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SEQUENCE_FINAL;
    use crate::keys::PrivateKey;
    use crate::transaction::Output;
    use crate::types::{OutPoint, Txid};
    use std::collections::{HashMap, VecDeque};

    /// Channel whose peer signs every request with `key` on the spot
    struct LoopbackChannel {
        key: Option<PrivateKey>,
        inbox: HashMap<String, VecDeque<ByteString>>,
    }

    impl SecureChannel for LoopbackChannel {
        fn send(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
            if topic == TOPIC_SIGN_REQUEST {
                let request = SignRequest::decode(payload)?;
                let signature = match &self.key {
                    Some(key) => key.sign_input(&request.transaction, request.index, &request.script_code)?,
                    None => Vec::new(),
                };
                self.inbox
                    .entry(TOPIC_SIGNATURE.to_string())
                    .or_default()
                    .push_back(signature);
            } else {
                self.inbox
                    .entry(topic.to_string())
                    .or_default()
                    .push_back(payload.to_vec());
            }
            Ok(())
        }

        fn receive(&mut self, topic: &str, _timeout: Duration) -> Result<Option<ByteString>> {
            Ok(self.inbox.get_mut(topic).and_then(VecDeque::pop_front))
        }

        fn close(&mut self) -> Result<()> {
            self.inbox.clear();
            Ok(())
        }
    }

    fn loopback(key: Option<PrivateKey>) -> LoopbackChannel {
        LoopbackChannel {
            key,
            inbox: HashMap::new(),
        }
    }

    fn unsigned() -> UnsignedTransaction {
        let mut tx = UnsignedTransaction::default();
        tx.add_input(OutPoint::new(Txid([4; 32]), 1), SEQUENCE_FINAL);
        tx.add_output(Output::new(1_000, Script::new(vec![0x51])));
        tx
    }

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[byte; 32], true, Network::Testnet).unwrap()
    }

    #[test]
    fn test_sign_request_round_trip() {
        let request = SignRequest {
            transaction: unsigned(),
            index: 0,
            script_code: Script::new(vec![0x76, 0xa9]),
        };
        assert_eq!(SignRequest::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn test_channel_signer_verifies_peer() {
        let peer = key(7);
        let peer_key = *peer.public_key();
        let mut channel = loopback(Some(peer));
        let signer = ChannelSigner::new(&mut channel, peer_key, Duration::from_secs(1));
        let code = Script::new(vec![0x51]);
        let signature = signer.sign_input(&unsigned(), 0, &code).unwrap();
        assert!(verify_input_signature(&peer_key, &unsigned(), 0, &code, &signature).unwrap());
    }

    #[test]
    fn test_channel_signer_rejects_wrong_key() {
        let mut channel = loopback(Some(key(7)));
        let signer = ChannelSigner::new(&mut channel, *key(8).public_key(), Duration::from_secs(1));
        assert!(matches!(
            signer.sign_input(&unsigned(), 0, &Script::new(vec![0x51])),
            Err(BetError::Signing(_))
        ));
    }

    #[test]
    fn test_channel_signer_reports_refusal() {
        let mut channel = loopback(None);
        let signer = ChannelSigner::new(&mut channel, *key(8).public_key(), Duration::from_secs(1));
        assert!(matches!(
            signer.sign_input(&unsigned(), 0, &Script::new(vec![0x51])),
            Err(BetError::Signing(_))
        ));
    }

    #[test]
    fn test_answer_sign_request() {
        let signer = key(9);
        let mut channel = loopback(None);
        let request = SignRequest {
            transaction: unsigned(),
            index: 0,
            script_code: Script::new(vec![0x51]),
        };
        channel
            .inbox
            .entry(TOPIC_SIGN_REQUEST.to_string())
            .or_default()
            .push_back(request.encode());
        assert!(answer_sign_request(&mut channel, &signer, Duration::from_secs(1), |_| true).unwrap());
        let signature = channel.receive(TOPIC_SIGNATURE, Duration::ZERO).unwrap().unwrap();
        assert!(verify_input_signature(signer.public_key(), &request.transaction, 0, &request.script_code, &signature).unwrap());

        channel
            .inbox
            .entry(TOPIC_SIGN_REQUEST.to_string())
            .or_default()
            .push_back(request.encode());
        assert!(!answer_sign_request(&mut channel, &signer, Duration::from_secs(1), |_| false).unwrap());
        assert_eq!(channel.receive(TOPIC_SIGNATURE, Duration::ZERO).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_receive_bet_times_out() {
        let mut channel = loopback(None);
        assert!(matches!(
            receive_bet(&mut channel, Duration::from_millis(1)),
            Err(BetError::Collaborator(_))
        ));
    }
}
