//! Error types for bet construction and redemption

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BetError {
    /// Wrong-length keys or hashes, bad hex, checksum mismatch, unknown opcode.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Protocol inconsistency: {0}")]
    ProtocolInconsistency(String),

    /// The quantized-timeout search exhausted its bound.
    #[error("Script reconstruction failed: {0}")]
    ReconstructionFailure(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BetError {
    pub fn malformed(message: impl Into<String>) -> Self {
        BetError::MalformedInput(message.into())
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        BetError::ProtocolInconsistency(message.into())
    }
}

impl From<secp256k1::Error> for BetError {
    fn from(err: secp256k1::Error) -> Self {
        BetError::Signing(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BetError>;
