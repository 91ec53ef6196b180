//! Protocol constants

/// Sequence number for final inputs (relative timelock disabled)
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// BIP68: set when the relative lock is expressed in 512-second units
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// BIP68: mask of the lock value inside the sequence number
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

/// BIP68: time-based locks are quantized to 2^9 seconds
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;

/// Seconds represented by one time-based sequence unit
pub const SEQUENCE_UNIT_SECONDS: u32 = 1 << SEQUENCE_LOCKTIME_GRANULARITY;

/// Transaction version; 2 is required for OP_CHECKSEQUENCEVERIFY
pub const TRANSACTION_VERSION: u32 = 2;

/// Signature hash type covering all inputs and outputs
pub const SIGHASH_ALL: u8 = 0x01;

/// Largest element a script may push
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Length of a private key scalar
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Serialized public key sizes
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;
pub const UNCOMPRESSED_PUBLIC_KEY_SIZE: usize = 65;

/// Length of a Base58Check checksum
pub const CHECKSUM_SIZE: usize = 4;

/// Oracle secret length
pub const SECRET_SIZE: usize = 32;

/// Magic prefix of the on-chain bet commitment and canonical bet encoding
pub const BET_MAGIC: &[u8] = b"OBET";

/// Magic prefix of an oracle inscription's OP_RETURN payload
pub const INSCRIPTION_MAGIC: &[u8] = b"OBI";

/// Default iteration bound of the quantized-timeout search
pub const DEFAULT_SEARCH_BOUND: u32 = 2000;

/// Default ratio between the oracle reply deadline and the bet resolution deadline
pub const DEFAULT_REPLY_TIMEOUT_FACTOR: u32 = 2;

/// Output positions inside a BetPromise transaction
pub const PROMISE_COMMITMENT_INDEX: usize = 0;
pub const PROMISE_PRIZE_A_INDEX: usize = 1;
pub const PROMISE_PRIZE_B_INDEX: usize = 2;
pub const PROMISE_FIRST_ORACLE_INDEX: usize = 3;

/// Output positions inside an oracle inscription transaction
pub const INSCRIPTION_COMMITMENT_INDEX: usize = 0;
pub const INSCRIPTION_ANSWER_INDEX: usize = 1;
pub const INSCRIPTION_INSURANCE_INDEX: usize = 2;
pub const INSCRIPTION_FIRST_PAYMENT_INDEX: usize = 3;
