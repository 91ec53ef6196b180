//! Input signing and two-pass fee accounting
//!
//! A signature's length is only known once it exists, yet the fee has to be
//! taken out of the outputs before they are signed over. Transactions whose
//! fee depends on their size are therefore signed twice: once to measure,
//! and again after the fee has been applied.

use crate::constants::*;
use crate::error::{BetError, Result};
use crate::keys::PrivateKey;
use crate::keys::PublicKey;
use crate::opcodes::OP_0;
use crate::script::{Script, ScriptBuilder, ScriptItem};
use crate::transaction::{Output, Transaction, UnsignedTransaction};
use crate::types::ByteString;
use tracing::debug;

/// Anything able to produce a SIGHASH_ALL signature for one key.
///
/// Local keys sign directly; a remote party signs through
/// `negotiation::ChannelSigner`.
pub trait Signer {
    fn public_key(&self) -> PublicKey;

    /// DER signature followed by the hash-type byte
    fn sign_input(&self, tx: &UnsignedTransaction, index: usize, script_code: &Script) -> Result<ByteString>;
}

impl Signer for PrivateKey {
    fn public_key(&self) -> PublicKey {
        *PrivateKey::public_key(self)
    }

    fn sign_input(&self, tx: &UnsignedTransaction, index: usize, script_code: &Script) -> Result<ByteString> {
        let digest = tx.signature_hash(index, script_code, SIGHASH_ALL)?;
        let mut signature = self.sign_digest(&digest)?;
        signature.push(SIGHASH_ALL);
        Ok(signature)
    }
}

/// Verify a signature produced by `Signer::sign_input`
pub fn verify_input_signature(
    key: &PublicKey,
    tx: &UnsignedTransaction,
    index: usize,
    script_code: &Script,
    signature: &[u8],
) -> Result<bool> {
    let Some((&hash_type, der)) = signature.split_last() else {
        return Ok(false);
    };
    if hash_type != SIGHASH_ALL {
        return Ok(false);
    }
    let digest = tx.signature_hash(index, script_code, hash_type)?;
    Ok(key.verify(&digest, der))
}

/// Shape of an input's unlocking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockLayout {
    /// `<sig> <pubkey>`
    PayToPubkeyHash,
    /// `[OP_0] <sigs...> <args...> <redeem script>`; the leading `OP_0`
    /// feeds the extra item OP_CHECKMULTISIG pops
    PayToScriptHash {
        redeem_script: Script,
        multisig: bool,
        args: Vec<ScriptItem>,
    },
}

/// Signers and layout for one input, in input order
pub struct InputUnlock<'a> {
    pub signers: Vec<&'a dyn Signer>,
    pub layout: UnlockLayout,
}

impl<'a> InputUnlock<'a> {
    pub fn pay_to_pubkey_hash(signer: &'a dyn Signer) -> Self {
        Self {
            signers: vec![signer],
            layout: UnlockLayout::PayToPubkeyHash,
        }
    }

    pub fn redeem(signer: &'a dyn Signer, redeem_script: Script, args: Vec<ScriptItem>) -> Self {
        Self {
            signers: vec![signer],
            layout: UnlockLayout::PayToScriptHash {
                redeem_script,
                multisig: false,
                args,
            },
        }
    }

    pub fn multisig(signers: Vec<&'a dyn Signer>, redeem_script: Script, args: Vec<ScriptItem>) -> Self {
        Self {
            signers,
            layout: UnlockLayout::PayToScriptHash {
                redeem_script,
                multisig: true,
                args,
            },
        }
    }

    fn script_code(&self) -> Result<Script> {
        match &self.layout {
            UnlockLayout::PayToPubkeyHash => {
                let signer = self.single_signer()?;
                Ok(Script::pay_to_pubkey_hash(&signer.public_key().pubkey_hash()))
            }
            UnlockLayout::PayToScriptHash { redeem_script, .. } => Ok(redeem_script.clone()),
        }
    }

    fn single_signer(&self) -> Result<&'a dyn Signer> {
        match self.signers.as_slice() {
            [signer] => Ok(*signer),
            other => Err(BetError::inconsistent(format!(
                "pay-to-pubkey-hash input needs exactly one signer, got {}",
                other.len()
            ))),
        }
    }

    fn unlocking_script(&self, signatures: Vec<ByteString>) -> Result<Script> {
        match &self.layout {
            UnlockLayout::PayToPubkeyHash => {
                let signer = self.single_signer()?;
                let mut builder = ScriptBuilder::new();
                for signature in &signatures {
                    builder = builder.push_slice(signature);
                }
                builder.push_key(&signer.public_key()).into_script()
            }
            UnlockLayout::PayToScriptHash {
                redeem_script,
                multisig,
                args,
            } => {
                let mut builder = ScriptBuilder::new();
                if *multisig {
                    builder = builder.op(OP_0);
                }
                for signature in &signatures {
                    builder = builder.push_slice(signature);
                }
                for arg in args {
                    builder = builder.push_item(arg);
                }
                builder.push_slice(redeem_script.as_bytes()).into_script()
            }
        }
    }
}

/// Sign every input of `tx` with its matching unlock
pub fn sign_all(tx: &mut UnsignedTransaction, unlocks: &[InputUnlock<'_>]) -> Result<()> {
    if unlocks.len() != tx.inputs().len() {
        return Err(BetError::inconsistent(format!(
            "{} unlocks supplied for {} inputs",
            unlocks.len(),
            tx.inputs().len()
        )));
    }
    let mut scripts = Vec::with_capacity(unlocks.len());
    for (index, unlock) in unlocks.iter().enumerate() {
        let script_code = unlock.script_code()?;
        let signatures = unlock
            .signers
            .iter()
            .map(|signer| signer.sign_input(tx, index, &script_code))
            .collect::<Result<Vec<_>>>()?;
        scripts.push(unlock.unlocking_script(signatures)?);
    }
    for (index, script) in scripts.into_iter().enumerate() {
        tx.set_script_sig(index, script)?;
    }
    Ok(())
}

/// Two-pass signing. The outputs of `tx` must distribute exactly
/// `input_total`, the value of everything the inputs spend; `apply_fee` then
/// takes the size-derived fee out of them.
///
/// Returns the final transaction and the fee it pays.
pub fn sign_with_fee<F>(
    mut tx: UnsignedTransaction,
    unlocks: &[InputUnlock<'_>],
    fee_rate: u64,
    input_total: u64,
    apply_fee: F,
) -> Result<(Transaction, u64)>
where
    F: FnOnce(&mut [Output], u64) -> Result<()>,
{
    let pre_fee_total = tx.total_output_value()?;
    if pre_fee_total > input_total {
        return Err(BetError::InsufficientFunds {
            required: pre_fee_total,
            available: input_total,
        });
    }
    if pre_fee_total < input_total {
        return Err(BetError::inconsistent(format!(
            "outputs distribute {pre_fee_total} of {input_total} spent"
        )));
    }

    let mut measured = tx.clone();
    sign_all(&mut measured, unlocks)?;
    let size = measured.serialized_size() as u64;
    let fee = size.checked_mul(fee_rate).ok_or_else(|| {
        BetError::malformed(format!("fee rate {fee_rate} overflows for {size} bytes"))
    })?;
    debug!(size, fee_rate, fee, "measured transaction for fee");

    apply_fee(tx.outputs_mut(), fee)?;
    sign_all(&mut tx, unlocks)?;
    let tx = tx.finalize()?;

    let output_total = tx.total_output_value()?;
    if output_total.checked_add(fee) != Some(input_total) {
        return Err(BetError::inconsistent(format!(
            "outputs {output_total} plus fee {fee} do not account for inputs {input_total}"
        )));
    }
    Ok((tx, fee))
}

/// Take `fee` out of one output
pub fn subtract_fee(output: &mut Output, fee: u64) -> Result<()> {
    output.value = output
        .value
        .checked_sub(fee)
        .ok_or(BetError::InsufficientFunds {
            required: fee,
            available: output.value,
        })?;
    Ok(())
}

/// Split `total` into `parts` shares that differ by at most one; the larger
/// shares come first
pub fn split_evenly(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let parts_u64 = parts as u64;
    let base = total / parts_u64;
    let remainder = (total % parts_u64) as usize;
    (0..parts)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Spread `fee` across `outputs` with `split_evenly`
pub fn split_fee(outputs: &mut [Output], fee: u64) -> Result<()> {
    if outputs.is_empty() {
        return Err(BetError::inconsistent("no output left to pay the fee"));
    }
    let shares = split_evenly(fee, outputs.len());
    for (output, share) in outputs.iter_mut().zip(shares) {
        subtract_fee(output, share)?;
    }
    Ok(())
}
