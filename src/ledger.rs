//! Ledger collaborator
//!
//! The protocol reads chain state through this trait and never polls,
//! retries or caches on its own.

use crate::error::{BetError, Result};
use crate::keys::{Address, PrivateKey};
use crate::transaction::{AbsoluteOutput, Transaction};
use crate::types::{Hash, Txid};
use tracing::{debug, warn};

pub trait Ledger {
    fn block_height(&self, block_hash: &Hash) -> Result<u64>;

    fn unspent_outputs(&self, address: &Address) -> Result<Vec<AbsoluteOutput>>;

    fn private_key(&self, address: &Address) -> Result<PrivateKey>;

    fn transaction(&self, txid: &Txid) -> Result<Option<Transaction>>;

    fn broadcast(&self, transaction: &Transaction) -> Result<Txid>;
}

/// Largest-first selection of outputs covering `amount`
pub fn select_outputs(mut candidates: Vec<AbsoluteOutput>, amount: u64) -> Result<Vec<AbsoluteOutput>> {
    candidates.sort_by(|a, b| b.value().cmp(&a.value()).then(a.outpoint.txid.cmp(&b.outpoint.txid)));
    let mut selected = Vec::new();
    let mut total = 0u64;
    for output in candidates {
        if total >= amount {
            break;
        }
        total = total.saturating_add(output.value());
        selected.push(output);
    }
    if total < amount {
        return Err(BetError::InsufficientFunds {
            required: amount,
            available: total,
        });
    }
    Ok(selected)
}

/// Pick unspent outputs of `address` worth at least `amount`
pub fn select_funding(ledger: &dyn Ledger, address: &Address, amount: u64) -> Result<Vec<AbsoluteOutput>> {
    let candidates = ledger.unspent_outputs(address)?;
    debug!(%address, candidates = candidates.len(), amount, "selecting funding");
    select_outputs(candidates, amount)
}

/// Fetch a transaction the protocol depends on; a missing one is an error
pub fn fetch_transaction(ledger: &dyn Ledger, txid: &Txid) -> Result<Transaction> {
    let transaction = ledger.transaction(txid)?.ok_or_else(|| {
        warn!(%txid, "ledger does not know transaction");
        BetError::Collaborator(format!("transaction {txid} not found"))
    })?;
    if transaction.txid() != *txid {
        warn!(%txid, "ledger returned a different transaction");
        return Err(BetError::Collaborator(format!(
            "ledger returned {} for {txid}",
            transaction.txid()
        )));
    }
    Ok(transaction)
}
