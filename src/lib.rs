//! # Oracle-Bet
//!
//! Two-player bets settled on a UTXO ledger by a committee of hash-preimage
//! oracles, with no trusted third party.
//!
//! This crate builds every transaction of the protocol and reconstructs the
//! redeem scripts needed to spend them. It performs no network I/O: chain
//! state and peer messages arrive through the `Ledger` and `SecureChannel`
//! collaborator traits.
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//! - Codec (integers, varints, opcodes, hex)
//! - Key material (secp256k1 keys, WIF, Base58Check addresses)
//! - Scripts (templates, parser, quantized-timeout reconstruction)
//! - Transactions (serialization, signature hashing, two-pass fee signing)
//! - Bet protocol (promise, inscription, resolution paths)
//!
//! ## Usage
//!
//! ```rust
//! use oracle_bet::keys::PrivateKey;
//! use oracle_bet::script::Script;
//! use oracle_bet::transaction::Output;
//!
//! let key = PrivateKey::from_wif("5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ").unwrap();
//! let output = Output::new(
//!     91234,
//!     Script::pay_to_pubkey_hash(&key.public_key().pubkey_hash()),
//! );
//! assert_eq!(output.serialize().len(), 8 + 1 + 25);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod codec;
pub mod opcodes;
pub mod hashes;
pub mod base58;
pub mod keys;
pub mod script;
pub mod timelock;
pub mod transaction;
pub mod signing;
pub mod bet;
pub mod oracle;
pub mod channel;
pub mod redeem;
pub mod promise;
pub mod inscription;
pub mod resolution;
pub mod ledger;
pub mod negotiation;
pub mod config;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{BetError, Result};
pub use bet::{Amounts, Bet, BetTimeout, Player, TimeUnit};
pub use config::ProtocolConfig;
pub use keys::{Address, Network, PrivateKey, PublicKey};
pub use oracle::{Oracle, OracleCommitment, ParticipatingOracle, RevealedPreimages};
pub use resolution::{RecoveredTimeout, Redemption, Resolver};
pub use signing::Signer;
pub use transaction::{AbsoluteOutput, Output, Transaction, UnsignedTransaction};


/// Entry point binding the protocol configuration to every builder
///
/// # Examples
///
/// ```
/// use oracle_bet::{BetEngine, ProtocolConfig};
///
/// let engine = BetEngine::new(ProtocolConfig::default()).unwrap();
/// assert_eq!(engine.config().search.single, 2000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BetEngine {
    config: ProtocolConfig,
}

impl BetEngine {
    pub fn new(config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Build and sign the BetPromise funded by both players
    pub fn build_promise(
        &self,
        bet: &Bet,
        committee: &[OracleCommitment],
        funding: [promise::PlayerFunding<'_>; 2],
    ) -> Result<promise::BetPromise> {
        promise::build_promise(bet, committee, funding)
    }

    /// Check a promise received from the peer
    pub fn verify_promise(&self, bet: &Bet, committee: &[OracleCommitment], promise: &Transaction) -> Result<()> {
        promise::verify_promise(bet, committee, promise)
    }

    /// Build and sign an oracle's inscription
    pub fn build_inscription(&self, request: inscription::InscriptionRequest<'_>) -> Result<inscription::Inscription> {
        inscription::build_inscription(&self.config, request)
    }

    /// Redemption paths for `bet` and its committee
    pub fn resolver<'a>(&'a self, bet: &'a Bet, committee: &'a [OracleCommitment]) -> Result<Resolver<'a>> {
        Resolver::new(bet, committee, &self.config)
    }
}
