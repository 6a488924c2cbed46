// Transactions: inputs, outputs, ids, signing and verification

use crate::core::serialize::{
    read_hash, read_length, read_u32, read_u64, read_var_bytes, write_var_bytes, write_varint,
};
use crate::core::{hash160, sha256, Hash256, PubKeyHash, Serializable, SerializeError};
use crate::wallet::{Address, WalletError};
use p256::ecdsa::signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Output index carried by the coinbase input (the "-1" sentinel)
pub const COINBASE_OUT_INDEX: u32 = u32::MAX;

/// Raw uncompressed public key: X (32 bytes) || Y (32 bytes)
pub const RAW_PUBLIC_KEY_LENGTH: usize = 64;

/// r (32 bytes) || s (32 bytes)
pub const SIGNATURE_LENGTH: usize = 64;

/// Failures while signing or verifying against referenced transactions
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Previous transaction {0} does not exist")]
    PreviousTransactionMissing(Hash256),

    #[error("Transaction {txid} has no output {index}")]
    OutputIndexOutOfRange { txid: Hash256, index: u32 },

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Id of the transaction holding the spent output (zero for coinbase)
    pub prev_tx_id: Hash256,
    /// Index of the spent output in that transaction
    pub out_index: u32,
    /// r || s, empty until signed
    pub signature: Vec<u8>,
    /// Raw public key of the spender; the memo for a coinbase input
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// Unsigned input spending `prev_tx_id:out_index`
    pub fn new(prev_tx_id: Hash256, out_index: u32, pub_key: Vec<u8>) -> Self {
        Self {
            prev_tx_id,
            out_index,
            signature: Vec::new(),
            pub_key,
        }
    }

    /// Sentinel input of a coinbase transaction
    pub fn coinbase(memo: Vec<u8>) -> Self {
        Self {
            prev_tx_id: Hash256::zero(),
            out_index: COINBASE_OUT_INDEX,
            signature: Vec::new(),
            pub_key: memo,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_id.is_zero() && self.out_index == COINBASE_OUT_INDEX
    }

    /// Whether this input was signed by the owner of `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &PubKeyHash) -> bool {
        hash160(&self.pub_key) == *pub_key_hash
    }
}

impl Serializable for TxInput {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.prev_tx_id.as_bytes())?;
        writer.write_all(&self.out_index.to_le_bytes())?;
        write_var_bytes(writer, &self.signature)?;
        write_var_bytes(writer, &self.pub_key)
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, SerializeError> {
        Ok(Self {
            prev_tx_id: read_hash(reader)?,
            out_index: read_u32(reader)?,
            signature: read_var_bytes(reader)?,
            pub_key: read_var_bytes(reader)?,
        })
    }
}

/// Transaction output - a value locked to one public-key hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: PubKeyHash,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: PubKeyHash) -> Self {
        Self { value, pub_key_hash }
    }

    /// Output of `value` spendable by the owner of `address`
    pub fn lock(value: u64, address: &Address) -> Result<Self, WalletError> {
        Ok(Self::new(value, address.pub_key_hash()?))
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &PubKeyHash) -> bool {
        self.pub_key_hash == *pub_key_hash
    }
}

impl Serializable for TxOutput {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.value.to_le_bytes())?;
        writer.write_all(&self.pub_key_hash)
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, SerializeError> {
        let value = read_u64(reader)?;
        let mut pub_key_hash = [0u8; 20];
        reader.read_exact(&mut pub_key_hash)?;
        Ok(Self { value, pub_key_hash })
    }
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// SHA-256 of the transaction serialized with this field zeroed
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a transaction and compute its id
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();
        tx
    }

    /// Mint `reward` to `to`
    ///
    /// Without a memo, 24 random bytes are used so that repeated rewards to
    /// the same address get distinct ids.
    pub fn coinbase(to: &Address, memo: Option<&str>, reward: u64) -> Result<Self, WalletError> {
        let memo = match memo {
            Some(text) => text.as_bytes().to_vec(),
            None => {
                let mut random = [0u8; 24];
                OsRng.fill_bytes(&mut random);
                hex::encode(random).into_bytes()
            }
        };

        let output = TxOutput::lock(reward, to)?;
        Ok(Self::new(vec![TxInput::coinbase(memo)], vec![output]))
    }

    /// Exactly one input, referencing nothing, with the -1 output index
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// SHA-256 of the serialized transaction with the id blanked
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode_with_id(&Hash256::zero(), &mut buf)
            .expect("writing to a Vec cannot fail");
        sha256(&buf)
    }

    /// Whether `id` matches the contents; signatures are added after the id
    /// is fixed and so are left out
    pub fn has_valid_id(&self) -> bool {
        let mut unsigned = self.clone();
        for input in &mut unsigned.inputs {
            input.signature.clear();
        }
        unsigned.hash() == self.id
    }

    /// Sum of the output values; `None` if it does not fit in a u64
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, out| total.checked_add(out.value))
    }

    /// Copy with every input's signature and public key cleared
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput::new(input.prev_tx_id, input.out_index, Vec::new()))
            .collect();

        Transaction {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Sign every input with `key`
    ///
    /// `prev_txs` must hold every transaction referenced by an input. Each
    /// input signs the id of the trimmed copy in which only that input's
    /// key field carries the referenced output's public-key hash.
    pub fn sign(
        &mut self,
        key: &SigningKey,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }

        let locks = self.referenced_locks(prev_txs)?;
        let mut trimmed = self.trimmed_copy();

        for (index, lock) in locks.iter().enumerate() {
            let digest = signing_digest(&mut trimmed, index, lock);

            let signature: Signature = key
                .sign_prehash_with_rng(&mut OsRng, digest.as_bytes())
                .map_err(|e| TransactionError::Signing(e.to_string()))?;

            self.inputs[index].signature = signature.to_bytes().to_vec();
        }

        Ok(())
    }

    /// Check every input's signature against the key it carries
    ///
    /// Returns `Ok(false)` on any bad signature or malformed key, and an
    /// error when a referenced transaction cannot be resolved.
    pub fn verify(&self, prev_txs: &HashMap<Hash256, Transaction>) -> Result<bool, TransactionError> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let locks = self.referenced_locks(prev_txs)?;
        let mut trimmed = self.trimmed_copy();

        for (index, lock) in locks.iter().enumerate() {
            let input = &self.inputs[index];
            let digest = signing_digest(&mut trimmed, index, lock);

            // the key must be the one the spent output is locked to
            if hash160(&input.pub_key) != *lock {
                return Ok(false);
            }

            let Some(verifying_key) = verifying_key_from_raw(&input.pub_key) else {
                return Ok(false);
            };
            if input.signature.len() != SIGNATURE_LENGTH {
                return Ok(false);
            }
            let Ok(signature) = Signature::from_slice(&input.signature) else {
                return Ok(false);
            };

            if verifying_key.verify_prehash(digest.as_bytes(), &signature).is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Public-key hash of the output each input spends, in input order
    fn referenced_locks(
        &self,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<Vec<PubKeyHash>, TransactionError> {
        self.inputs
            .iter()
            .map(|input| {
                let prev_tx = prev_txs
                    .get(&input.prev_tx_id)
                    .ok_or(TransactionError::PreviousTransactionMissing(input.prev_tx_id))?;

                prev_tx
                    .outputs
                    .get(input.out_index as usize)
                    .map(|output| output.pub_key_hash)
                    .ok_or(TransactionError::OutputIndexOutOfRange {
                        txid: input.prev_tx_id,
                        index: input.out_index,
                    })
            })
            .collect()
    }

    fn encode_with_id<W: Write>(&self, id: &Hash256, writer: &mut W) -> io::Result<()> {
        writer.write_all(id.as_bytes())?;

        write_varint(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode(writer)?;
        }

        write_varint(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(writer)?;
        }

        Ok(())
    }
}

/// Digest signed for input `index` of a trimmed copy
fn signing_digest(trimmed: &mut Transaction, index: usize, lock: &PubKeyHash) -> Hash256 {
    trimmed.inputs[index].signature.clear();
    trimmed.inputs[index].pub_key = lock.to_vec();
    let digest = trimmed.hash();
    trimmed.inputs[index].pub_key.clear();
    digest
}

/// Raw X || Y bytes of a P-256 public key
pub fn raw_public_key(key: &VerifyingKey) -> Vec<u8> {
    let point = key.to_encoded_point(false);
    // skip the 0x04 SEC1 tag
    point.as_bytes()[1..].to_vec()
}

/// Rebuild a P-256 key from raw X || Y bytes
pub fn verifying_key_from_raw(raw: &[u8]) -> Option<VerifyingKey> {
    if raw.len() != RAW_PUBLIC_KEY_LENGTH {
        return None;
    }
    let mut sec1 = Vec::with_capacity(RAW_PUBLIC_KEY_LENGTH + 1);
    sec1.push(0x04);
    sec1.extend_from_slice(raw);
    VerifyingKey::from_sec1_bytes(&sec1).ok()
}

impl Serializable for Transaction {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.encode_with_id(&self.id, writer)
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, SerializeError> {
        let id = read_hash(reader)?;

        let input_count = read_length(reader)?;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            inputs.push(TxInput::decode(reader)?);
        }

        let output_count = read_length(reader)?;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(TxOutput::decode(reader)?);
        }

        Ok(Self { id, inputs, outputs })
    }
}
