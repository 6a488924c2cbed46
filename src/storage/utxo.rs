// Unspent outputs, found by replaying the chain from tip to genesis

use crate::consensus::ValidationError;
use crate::core::{Hash256, PubKeyHash, Transaction, TxOutput};
use crate::storage::{Blockchain, ChainError};
use crate::wallet::Address;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Reference to one transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u32) -> Self {
        Self { txid, index }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl Blockchain {
    /// Every outpoint consumed by a non-coinbase input anywhere in the chain
    pub fn spent_outputs(&self) -> Result<HashSet<OutPoint>, ChainError> {
        let mut spent = HashSet::new();
        for block in self.iter() {
            for tx in block?.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                for input in &tx.inputs {
                    spent.insert(OutPoint::new(input.prev_tx_id, input.out_index));
                }
            }
        }
        Ok(spent)
    }

    /// Outputs locked to `pub_key_hash` that no input spends, ordered by outpoint
    ///
    /// Blocks are visited newest first and the transactions of each block in
    /// reverse, so every spend is recorded before the output it consumes.
    pub fn unspent_outputs(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<(OutPoint, TxOutput)>, ChainError> {
        let mut spent: HashSet<OutPoint> = HashSet::new();
        let mut unspent: BTreeMap<OutPoint, TxOutput> = BTreeMap::new();

        for block in self.iter() {
            let block = block?;
            for tx in block.transactions.iter().rev() {
                for (index, output) in tx.outputs.iter().enumerate() {
                    let outpoint = OutPoint::new(tx.id, index as u32);
                    if output.is_locked_with_key(pub_key_hash) && !spent.contains(&outpoint) {
                        unspent.insert(outpoint, output.clone());
                    }
                }

                if tx.is_coinbase() {
                    continue;
                }
                for input in tx.inputs.iter().filter(|input| input.uses_key(pub_key_hash)) {
                    spent.insert(OutPoint::new(input.prev_tx_id, input.out_index));
                }
            }
        }

        Ok(unspent.into_iter().collect())
    }

    /// Distinct transactions holding at least one unspent output for `pub_key_hash`
    pub fn find_unspent_transactions(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<Transaction>, ChainError> {
        let mut ids: Vec<Hash256> = self
            .unspent_outputs(pub_key_hash)?
            .into_iter()
            .map(|(outpoint, _)| outpoint.txid)
            .collect();
        ids.dedup();

        ids.iter().map(|id| self.find_transaction(id)).collect()
    }

    /// Unspent outputs locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &PubKeyHash) -> Result<Vec<TxOutput>, ChainError> {
        Ok(self
            .unspent_outputs(pub_key_hash)?
            .into_iter()
            .map(|(_, output)| output)
            .collect())
    }

    /// Pick unspent outputs in outpoint order until `amount` is covered
    ///
    /// Returns the accumulated value and the chosen outpoints. The value is
    /// below `amount` when the owner cannot cover it.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &PubKeyHash,
        amount: u64,
    ) -> Result<(u64, Vec<OutPoint>), ChainError> {
        let mut accumulated = 0u64;
        let mut chosen = Vec::new();

        for (outpoint, output) in self.unspent_outputs(pub_key_hash)? {
            if accumulated >= amount {
                break;
            }
            accumulated = accumulated.checked_add(output.value).ok_or(ValidationError::ValueOverflow)?;
            chosen.push(outpoint);
        }

        Ok((accumulated, chosen))
    }

    /// Sum of the unspent outputs owned by `address`
    pub fn balance(&self, address: &Address) -> Result<u64, ChainError> {
        let pub_key_hash = address.pub_key_hash()?;
        let total = self
            .find_utxo(&pub_key_hash)?
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.value))
            .ok_or(ValidationError::ValueOverflow)?;
        Ok(total)
    }
}
