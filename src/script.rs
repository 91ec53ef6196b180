//! Script construction, parsing and classification

use crate::codec::{self, Reader};
use crate::error::{BetError, Result};
use crate::hashes::hash160;
use crate::keys::{Address, AddressKind, PublicKey};
use crate::opcodes::*;
use crate::types::{ByteString, Hash160};
use std::fmt;

/// Standard pattern a script matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    PayToPubkeyHash(Hash160),
    /// OP_HASH160 <20> OP_EQUAL
    PayToScriptHash(Hash160),
    NonStandard,
}

impl ScriptKind {
    fn classify(bytes: &[u8]) -> Self {
        match bytes {
            [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
                let mut out = [0u8; 20];
                out.copy_from_slice(hash);
                ScriptKind::PayToPubkeyHash(out)
            }
            [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => {
                let mut out = [0u8; 20];
                out.copy_from_slice(hash);
                ScriptKind::PayToScriptHash(out)
            }
            _ => ScriptKind::NonStandard,
        }
    }
}

/// An immutable opcode sequence. Its classification is computed once, when
/// the script is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    bytes: ByteString,
    kind: ScriptKind,
}

impl Default for Script {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Script {
    pub fn new(bytes: ByteString) -> Self {
        let kind = ScriptKind::classify(&bytes);
        Self { bytes, kind }
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        Ok(Self::new(codec::from_hex(text)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(&self.bytes)
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn is_pay_to_pubkey_hash(&self) -> bool {
        matches!(self.kind, ScriptKind::PayToPubkeyHash(_))
    }

    pub fn is_pay_to_script_hash(&self) -> bool {
        matches!(self.kind, ScriptKind::PayToScriptHash(_))
    }

    /// HASH160 of the script bytes; the identity of a redeem script
    pub fn script_hash(&self) -> Hash160 {
        hash160(&self.bytes)
    }

    /// The committed redeem-script hash of a P2SH locking script
    pub fn p2sh_hash(&self) -> Result<Hash160> {
        match self.kind {
            ScriptKind::PayToScriptHash(hash) => Ok(hash),
            _ => Err(BetError::inconsistent(format!(
                "expected a pay-to-script-hash output, found {}",
                self.to_hex()
            ))),
        }
    }

    /// varint(len) ‖ bytes
    pub fn serialize_into(&self, buf: &mut ByteString) {
        codec::write_var_bytes(buf, &self.bytes);
    }

    pub fn deserialize_from(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self::new(reader.read_var_bytes()?.to_vec()))
    }

    pub fn serialize(&self) -> ByteString {
        let mut buf = Vec::with_capacity(self.bytes.len() + 3);
        self.serialize_into(&mut buf);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let script = Self::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(script)
    }

    /// Split the script into pushes and named opcodes.
    ///
    /// Any byte that is neither a push nor a known opcode is an error.
    pub fn tokens(&self) -> Result<Vec<ScriptToken>> {
        let mut reader = Reader::new(&self.bytes);
        let mut tokens = Vec::new();
        while !reader.is_empty() {
            let opcode = reader.read_u8()?;
            let token = match opcode {
                0x01..=OP_PUSHBYTES_75 => {
                    ScriptToken::Push(reader.read_bytes(opcode as usize)?.to_vec())
                }
                OP_PUSHDATA1 => {
                    let len = reader.read_u8()? as usize;
                    ScriptToken::Push(reader.read_bytes(len)?.to_vec())
                }
                OP_PUSHDATA2 => {
                    let len = reader.read_u16()? as usize;
                    ScriptToken::Push(reader.read_bytes(len)?.to_vec())
                }
                OP_PUSHDATA4 => {
                    let len = reader.read_u32()? as usize;
                    ScriptToken::Push(reader.read_bytes(len)?.to_vec())
                }
                other => match opcode_name(other) {
                    Some(_) => ScriptToken::Op(other),
                    None => {
                        return Err(BetError::malformed(format!(
                            "unknown opcode 0x{:02x} at offset {}",
                            other,
                            reader.position() - 1
                        )))
                    }
                },
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Space-separated token text, e.g. `OP_HASH160 OP_PUSH_20_bytes 89AB… OP_EQUAL`
    pub fn to_asm(&self) -> Result<String> {
        Ok(self
            .tokens()?
            .iter()
            .map(ScriptToken::to_string)
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Payload of an `OP_RETURN <data>` script
    pub fn null_data(&self) -> Option<ByteString> {
        match self.tokens().ok()?.as_slice() {
            [ScriptToken::Op(OP_RETURN), ScriptToken::Push(data)] => Some(data.clone()),
            _ => None,
        }
    }

    pub fn pay_to_pubkey_hash(hash: &Hash160) -> Self {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
        bytes.extend_from_slice(hash);
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Self::new(bytes)
    }

    pub fn pay_to_script_hash(hash: &Hash160) -> Self {
        let mut bytes = Vec::with_capacity(23);
        bytes.extend_from_slice(&[OP_HASH160, 0x14]);
        bytes.extend_from_slice(hash);
        bytes.push(OP_EQUAL);
        Self::new(bytes)
    }

    /// P2SH locking script committing to this redeem script
    pub fn to_p2sh(&self) -> Self {
        Self::pay_to_script_hash(&self.script_hash())
    }

    pub fn for_address(address: &Address) -> Self {
        match address.kind {
            AddressKind::PayToPubkeyHash => Self::pay_to_pubkey_hash(&address.hash),
            AddressKind::PayToScriptHash => Self::pay_to_script_hash(&address.hash),
        }
    }

    /// `OP_<m> <pubkeys...> OP_<n> OP_CHECKMULTISIG`
    pub fn multisig(required: usize, keys: &[PublicKey]) -> Result<Self> {
        if required == 0 || required > keys.len() {
            return Err(BetError::malformed(format!(
                "multisig requires 1..={} signatures, got {}",
                keys.len(),
                required
            )));
        }
        if keys.len() > 16 {
            return Err(BetError::malformed(format!(
                "bare multisig supports at most 16 keys, got {}",
                keys.len()
            )));
        }
        let mut builder = ScriptBuilder::new().push_int(required as i64);
        for key in keys {
            builder = builder.push_key(key);
        }
        builder
            .push_int(keys.len() as i64)
            .op(OP_CHECKMULTISIG)
            .into_script()
    }

    /// `OP_RETURN <data>`
    pub fn null_data_commitment(data: &[u8]) -> Result<Self> {
        ScriptBuilder::new().op(OP_RETURN).push_slice(data).into_script()
    }

    /// One mandatory signature plus either a second signature or an elapsed
    /// relative timelock:
    ///
    /// `OP_IF <second> OP_CHECKSIGVERIFY OP_ELSE <sequence> OP_CHECKSEQUENCEVERIFY
    /// OP_DROP OP_ENDIF <first> OP_CHECKSIG`
    pub fn signature_or_timelock(first: &PublicKey, second: &PublicKey, sequence: u32) -> Result<Self> {
        ScriptBuilder::new()
            .op(OP_IF)
            .push_key(second)
            .op(OP_CHECKSIGVERIFY)
            .op(OP_ELSE)
            .push_relative_timelock(sequence)
            .op(OP_ENDIF)
            .push_key(first)
            .op(OP_CHECKSIG)
            .into_script()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_asm() {
            Ok(asm) => f.write_str(&asm),
            Err(_) => f.write_str(&self.to_hex()),
        }
    }
}

/// One parsed element of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptToken {
    Push(ByteString),
    Op(u8),
}

impl ScriptToken {
    /// `OP_PUSH_<n>_bytes` for pushes, the opcode name otherwise
    pub fn name(&self) -> String {
        match self {
            ScriptToken::Push(data) => format!("OP_PUSH_{}_bytes", data.len()),
            ScriptToken::Op(byte) => opcode_name(*byte).unwrap_or("OP_UNKNOWN").to_string(),
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            ScriptToken::Push(data) => Some(data),
            ScriptToken::Op(_) => None,
        }
    }
}

impl fmt::Display for ScriptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptToken::Push(data) => write!(f, "{} {}", self.name(), codec::to_hex(data)),
            ScriptToken::Op(_) => f.write_str(&self.name()),
        }
    }
}

/// Item appended to an unlocking script after its signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptItem {
    Op(u8),
    Push(ByteString),
}

impl ScriptItem {
    /// Branch selector consumed by OP_IF
    pub fn flag(value: bool) -> Self {
        ScriptItem::Op(if value { OP_1 } else { OP_0 })
    }
}

/// Minimal CScriptNum encoding
pub fn script_num(value: i64) -> ByteString {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Chained script assembly. The first failing push is remembered and
/// reported by `into_script`.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    bytes: ByteString,
    error: Option<BetError>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    pub fn push_slice(mut self, data: &[u8]) -> Self {
        if self.error.is_none() {
            match encode_push(data) {
                Ok(encoded) => self.bytes.extend_from_slice(&encoded),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    /// Smallest push of a script number
    pub fn push_int(self, value: i64) -> Self {
        match value {
            0 => self.op(OP_0),
            -1 => self.op(OP_1NEGATE),
            1..=16 => self.op(OP_1 + (value as u8) - 1),
            _ => self.push_slice(&script_num(value)),
        }
    }

    pub fn push_key(self, key: &PublicKey) -> Self {
        self.push_slice(&key.to_bytes())
    }

    pub fn push_item(self, item: &ScriptItem) -> Self {
        match item {
            ScriptItem::Op(opcode) => self.op(*opcode),
            ScriptItem::Push(data) => self.push_slice(data),
        }
    }

    /// `<sequence> OP_CHECKSEQUENCEVERIFY OP_DROP`
    pub fn push_relative_timelock(self, sequence: u32) -> Self {
        self.push_int(sequence as i64)
            .op(OP_CHECKSEQUENCEVERIFY)
            .op(OP_DROP)
    }

    /// Count how many of the preimages on the stack match `hashes`, then
    /// require at least `required` matches.
    ///
    /// Expects one stack item per hash with the item for `hashes[0]` on top;
    /// an empty item marks a missing preimage and never matches.
    pub fn push_preimage_threshold(self, hashes: &[Hash160], required: usize) -> Self {
        let mut builder = self.op(OP_0);
        for hash in hashes {
            builder = builder
                .op(OP_SWAP)
                .op(OP_HASH160)
                .push_slice(hash)
                .op(OP_EQUAL)
                .op(OP_ADD);
        }
        builder
            .push_int(required as i64)
            .op(OP_GREATERTHANOREQUAL)
            .op(OP_VERIFY)
    }

    pub fn append(mut self, script: &Script) -> Self {
        self.bytes.extend_from_slice(script.as_bytes());
        self
    }

    pub fn into_script(self) -> Result<Script> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Script::new(self.bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Network, PrivateKey};

    const P2PKH_HEX: &str = "76A914C8E90996C7C6080EE06284600C684ED904D14C5C88AC";

    #[test]
    fn test_classify_p2pkh() {
        let script = Script::from_hex(P2PKH_HEX).unwrap();
        assert!(script.is_pay_to_pubkey_hash());
        assert!(!script.is_pay_to_script_hash());
    }

    #[test]
    fn test_classify_p2sh() {
        let redeem = Script::new(vec![OP_1]);
        let p2sh = redeem.to_p2sh();
        assert_eq!(p2sh.kind(), ScriptKind::PayToScriptHash(redeem.script_hash()));
        assert_eq!(p2sh.p2sh_hash().unwrap(), redeem.script_hash());
    }

    #[test]
    fn test_classify_nonstandard() {
        assert_eq!(Script::new(vec![OP_1, OP_DROP]).kind(), ScriptKind::NonStandard);
        assert!(Script::new(vec![OP_1]).p2sh_hash().is_err());
    }

    #[test]
    fn test_tokens_p2pkh() {
        let script = Script::from_hex(P2PKH_HEX).unwrap();
        assert_eq!(
            script.to_asm().unwrap(),
            "OP_DUP OP_HASH160 OP_PUSH_20_bytes C8E90996C7C6080EE06284600C684ED904D14C5C OP_EQUALVERIFY OP_CHECKSIG"
        );
    }

    #[test]
    fn test_tokens_pushdata_variants() {
        let mut bytes = vec![OP_PUSHDATA1, 2, 0xaa, 0xbb, OP_PUSHDATA2, 1, 0, 0xcc];
        bytes.extend_from_slice(&[OP_PUSHDATA4, 1, 0, 0, 0, 0xdd]);
        let tokens = Script::new(bytes).tokens().unwrap();
        assert_eq!(
            tokens,
            vec![
                ScriptToken::Push(vec![0xaa, 0xbb]),
                ScriptToken::Push(vec![0xcc]),
                ScriptToken::Push(vec![0xdd]),
            ]
        );
    }

    #[test]
    fn test_tokens_unknown_opcode() {
        let script = Script::new(vec![OP_1, 0xba]);
        assert!(matches!(script.tokens(), Err(BetError::MalformedInput(_))));
    }

    #[test]
    fn test_tokens_truncated_push() {
        let script = Script::new(vec![0x05, 0x01]);
        assert!(script.tokens().is_err());
    }

    #[test]
    fn test_script_num() {
        assert_eq!(script_num(0), Vec::<u8>::new());
        assert_eq!(script_num(127), vec![0x7f]);
        assert_eq!(script_num(128), vec![0x80, 0x00]);
        assert_eq!(script_num(-1), vec![0x81]);
        assert_eq!(script_num(-128), vec![0x80, 0x80]);
        assert_eq!(script_num(0x0040_0005), vec![0x05, 0x00, 0x40]);
    }

    #[test]
    fn test_push_int_small_values() {
        let script = ScriptBuilder::new()
            .push_int(0)
            .push_int(1)
            .push_int(16)
            .push_int(17)
            .push_int(-1)
            .into_script()
            .unwrap();
        assert_eq!(script.as_bytes(), &[OP_0, OP_1, OP_16, 0x01, 0x11, OP_1NEGATE]);
    }

    #[test]
    fn test_multisig_template() {
        let a = PrivateKey::generate(Network::Testnet);
        let b = PrivateKey::generate(Network::Testnet);
        let script = Script::multisig(2, &[*a.public_key(), *b.public_key()]).unwrap();
        let bytes = script.as_bytes();
        assert_eq!(bytes[0], OP_2);
        assert_eq!(bytes[bytes.len() - 2], OP_2);
        assert_eq!(bytes[bytes.len() - 1], OP_CHECKMULTISIG);
        assert_eq!(script.len(), 1 + 34 + 34 + 1 + 1);
        assert!(Script::multisig(3, &[*a.public_key(), *b.public_key()]).is_err());
    }

    #[test]
    fn test_null_data_round_trip() {
        let script = Script::null_data_commitment(b"commitment").unwrap();
        assert_eq!(script.null_data().unwrap(), b"commitment".to_vec());
        assert_eq!(Script::from_hex(P2PKH_HEX).unwrap().null_data(), None);
    }

    #[test]
    fn test_signature_or_timelock_shape() {
        let a = PrivateKey::generate(Network::Testnet);
        let b = PrivateKey::generate(Network::Testnet);
        let script = Script::signature_or_timelock(a.public_key(), b.public_key(), 0x0040_0010).unwrap();
        let names: Vec<String> = script.tokens().unwrap().iter().map(ScriptToken::name).collect();
        assert_eq!(
            names,
            vec![
                "OP_IF",
                "OP_PUSH_33_bytes",
                "OP_CHECKSIGVERIFY",
                "OP_ELSE",
                "OP_PUSH_3_bytes",
                "OP_CHECKSEQUENCEVERIFY",
                "OP_DROP",
                "OP_ENDIF",
                "OP_PUSH_33_bytes",
                "OP_CHECKSIG",
            ]
        );
    }

    #[test]
    fn test_preimage_threshold_shape() {
        let script = ScriptBuilder::new()
            .push_preimage_threshold(&[[1u8; 20], [2u8; 20]], 2)
            .into_script()
            .unwrap();
        assert_eq!(script.len(), 1 + 2 * 25 + 3);
        assert_eq!(script.as_bytes()[0], OP_0);
    }

    #[test]
    fn test_builder_reports_oversized_push() {
        let result = ScriptBuilder::new().push_slice(&[0u8; 600]).op(OP_DROP).into_script();
        assert!(result.is_err());
    }

    #[test]
    fn test_script_serialization_round_trip() {
        let script = Script::from_hex(P2PKH_HEX).unwrap();
        let bytes = script.serialize();
        assert_eq!(bytes[0], 0x19);
        assert_eq!(Script::deserialize(&bytes).unwrap(), script);
    }
}
