//! Transaction model: serialization, ids and signature hashing
//!
//! Serialize(tx) = version(4) ‖ varint(|ins|) ‖ ins ‖ varint(|outs|) ‖ outs ‖ lock_time(4)
//!
//! A transaction is assembled as an `UnsignedTransaction` and only becomes a
//! `Transaction` once every input carries an unlocking script.

use crate::codec::{self, Reader};
use crate::constants::*;
use crate::error::{BetError, Result};
use crate::hashes::double_sha256;
use crate::script::Script;
use crate::types::*;

/// Input: prevout ‖ scriptSig ‖ sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

/// Output: value ‖ scriptPubKey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub value: u64,
    pub script_pubkey: Script,
}

impl Output {
    pub fn new(value: u64, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    pub fn serialize_into(&self, buf: &mut ByteString) {
        codec::write_u64(buf, self.value);
        self.script_pubkey.serialize_into(buf);
    }

    pub fn deserialize_from(reader: &mut Reader<'_>) -> Result<Self> {
        let value = reader.read_u64()?;
        let script_pubkey = Script::deserialize_from(reader)?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }

    pub fn serialize(&self) -> ByteString {
        let mut buf = Vec::with_capacity(9 + self.script_pubkey.len());
        self.serialize_into(&mut buf);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let output = Self::deserialize_from(&mut reader)?;
        reader.finish()?;
        Ok(output)
    }
}

/// An output bound to the transaction that created it: a spendable handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsoluteOutput {
    pub outpoint: OutPoint,
    pub output: Output,
}

impl AbsoluteOutput {
    pub fn new(outpoint: OutPoint, output: Output) -> Self {
        Self { outpoint, output }
    }

    pub fn value(&self) -> u64 {
        self.output.value
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.output.script_pubkey
    }
}

fn write_input(buf: &mut ByteString, prevout: &OutPoint, script: &[u8], sequence: u32) {
    buf.extend_from_slice(&prevout.txid.to_wire());
    codec::write_u32(buf, prevout.index);
    codec::write_var_bytes(buf, script);
    codec::write_u32(buf, sequence);
}

fn write_transaction<'a, I>(
    buf: &mut ByteString,
    version: u32,
    input_count: usize,
    inputs: I,
    outputs: &[Output],
    lock_time: u32,
) where
    I: Iterator<Item = (&'a OutPoint, &'a [u8], u32)>,
{
    codec::write_u32(buf, version);
    codec::write_varint(buf, input_count as u64);
    for (prevout, script, sequence) in inputs {
        write_input(buf, prevout, script, sequence);
    }
    codec::write_varint(buf, outputs.len() as u64);
    for output in outputs {
        output.serialize_into(buf);
    }
    codec::write_u32(buf, lock_time);
}

fn read_input(reader: &mut Reader<'_>) -> Result<Input> {
    let txid = Txid::from_wire(reader.read_array()?);
    let index = reader.read_u32()?;
    let script_sig = Script::deserialize_from(reader)?;
    let sequence = reader.read_u32()?;
    Ok(Input {
        prevout: OutPoint::new(txid, index),
        script_sig,
        sequence,
    })
}

/// A fully signed transaction. Its contents cannot change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    version: u32,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    lock_time: u32,
}

impl Transaction {
    pub fn new(version: u32, inputs: Vec<Input>, outputs: Vec<Output>, lock_time: u32) -> Self {
        Self {
            version,
            inputs,
            outputs,
            lock_time,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn serialize(&self) -> ByteString {
        let mut buf = Vec::with_capacity(self.size_hint());
        write_transaction(
            &mut buf,
            self.version,
            self.inputs.len(),
            self.inputs
                .iter()
                .map(|i| (&i.prevout, i.script_sig.as_bytes(), i.sequence)),
            &self.outputs,
            self.lock_time,
        );
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_u32()?;
        let input_count = reader.read_length()?;
        if input_count == 0 && reader.remaining() > 0 && bytes.get(reader.position()) == Some(&0x01) {
            return Err(BetError::malformed("witness serialization is not supported"));
        }
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(read_input(&mut reader)?);
        }
        let output_count = reader.read_length()?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(Output::deserialize_from(&mut reader)?);
        }
        let lock_time = reader.read_u32()?;
        reader.finish()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        Self::deserialize(&codec::from_hex(text)?)
    }

    pub fn to_hex(&self) -> String {
        codec::to_hex(&self.serialize())
    }

    /// Double SHA-256 of the serialization, in display order
    pub fn txid(&self) -> Txid {
        Txid::from_digest(double_sha256(&self.serialize()))
    }

    pub fn size(&self) -> usize {
        self.serialize().len()
    }

    pub fn total_output_value(&self) -> Result<u64> {
        sum_values(&self.outputs)
    }

    pub fn output(&self, index: usize) -> Result<&Output> {
        self.outputs.get(index).ok_or_else(|| {
            BetError::inconsistent(format!(
                "transaction {} has no output {}",
                self.txid(),
                index
            ))
        })
    }

    /// Bind output `index` to this transaction's id
    pub fn absolute_output(&self, index: usize) -> Result<AbsoluteOutput> {
        let output = self.output(index)?.clone();
        Ok(AbsoluteOutput::new(
            OutPoint::new(self.txid(), index as u32),
            output,
        ))
    }

    fn size_hint(&self) -> usize {
        10 + self.inputs.len() * 150 + self.outputs.len() * 40
    }
}

/// Sum of output values; overflow means the outputs cannot be real
fn sum_values(outputs: &[Output]) -> Result<u64> {
    outputs
        .iter()
        .try_fold(0u64, |acc, o| acc.checked_add(o.value))
        .ok_or_else(|| BetError::malformed("output values overflow"))
}

/// Input awaiting its unlocking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedInput {
    pub prevout: OutPoint,
    pub sequence: u32,
    script_sig: Option<Script>,
}

impl UnsignedInput {
    pub fn script_sig(&self) -> Option<&Script> {
        self.script_sig.as_ref()
    }
}

/// A transaction under construction. Output values may still be adjusted and
/// unlocking scripts assigned; `finalize` freezes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    version: u32,
    inputs: Vec<UnsignedInput>,
    outputs: Vec<Output>,
    lock_time: u32,
}

impl Default for UnsignedTransaction {
    fn default() -> Self {
        Self::new(TRANSACTION_VERSION)
    }
}

impl UnsignedTransaction {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn add_input(&mut self, prevout: OutPoint, sequence: u32) -> usize {
        self.inputs.push(UnsignedInput {
            prevout,
            sequence,
            script_sig: None,
        });
        self.inputs.len() - 1
    }

    pub fn add_output(&mut self, output: Output) -> usize {
        self.outputs.push(output);
        self.outputs.len() - 1
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[UnsignedInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn outputs_mut(&mut self) -> &mut [Output] {
        &mut self.outputs
    }

    pub fn total_output_value(&self) -> Result<u64> {
        sum_values(&self.outputs)
    }

    pub fn set_script_sig(&mut self, index: usize, script_sig: Script) -> Result<()> {
        let input = self.inputs.get_mut(index).ok_or_else(|| {
            BetError::malformed(format!("input index {index} out of range"))
        })?;
        input.script_sig = Some(script_sig);
        Ok(())
    }

    fn serialize_with<'s, F>(&'s self, script_for: F) -> ByteString
    where
        F: Fn(usize, &'s UnsignedInput) -> &'s [u8],
    {
        let mut buf = Vec::new();
        write_transaction(
            &mut buf,
            self.version,
            self.inputs.len(),
            self.inputs
                .iter()
                .enumerate()
                .map(|(i, input)| (&input.prevout, script_for(i, input), input.sequence)),
            &self.outputs,
            self.lock_time,
        );
        buf
    }

    /// Serialization with the unlocking scripts assigned so far; unassigned
    /// inputs are written with an empty script
    pub fn serialize(&self) -> ByteString {
        self.serialize_with(|_, input| {
            input.script_sig.as_ref().map(Script::as_bytes).unwrap_or(&[])
        })
    }

    pub fn serialized_size(&self) -> usize {
        self.serialize().len()
    }

    /// Parse a transaction whose empty unlocking scripts are still pending
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let tx = Transaction::deserialize(bytes)?;
        Ok(Self {
            version: tx.version,
            inputs: tx
                .inputs
                .into_iter()
                .map(|input| UnsignedInput {
                    prevout: input.prevout,
                    sequence: input.sequence,
                    script_sig: (!input.script_sig.is_empty()).then_some(input.script_sig),
                })
                .collect(),
            outputs: tx.outputs,
            lock_time: tx.lock_time,
        })
    }

    /// Legacy signature hash: every unlocking script is emptied except the
    /// one being signed, which is replaced by `script_code`; the hash type is
    /// appended as a little-endian u32 before double hashing.
    pub fn signature_hash(&self, index: usize, script_code: &Script, sighash_type: u8) -> Result<Hash> {
        if index >= self.inputs.len() {
            return Err(BetError::malformed(format!(
                "cannot sign input {} of a transaction with {} inputs",
                index,
                self.inputs.len()
            )));
        }
        let mut preimage =
            self.serialize_with(|i, _| if i == index { script_code.as_bytes() } else { &[] });
        codec::write_u32(&mut preimage, sighash_type as u32);
        Ok(double_sha256(&preimage))
    }

    /// Freeze into a `Transaction`; every input must be unlocked
    pub fn finalize(self) -> Result<Transaction> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.into_iter().enumerate() {
            let script_sig = input.script_sig.ok_or_else(|| {
                BetError::inconsistent(format!("input {index} has no unlocking script"))
            })?;
            inputs.push(Input {
                prevout: input.prevout,
                script_sig,
                sequence: input.sequence,
            });
        }
        Ok(Transaction {
            version: self.version,
            inputs,
            outputs: self.outputs,
            lock_time: self.lock_time,
        })
    }
}
