// Block data structure

use crate::consensus::{MiningError, ProofOfWork};
use crate::core::serialize::{read_hash, read_length, read_u64, read_var_bytes, write_var_bytes, write_varint};
use crate::core::{sha256, Hash256, MerkleTree, Serializable, SerializeError, Transaction};
use std::io::{self, Read, Write};

/// Block - an immutable batch of transactions linked to its predecessor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// SHA256(merkle root || prev hash || nonce), below the PoW target
    pub hash: Hash256,
    /// Hash of the previous block; zero ("empty") for genesis
    pub prev_hash: Hash256,
    pub transactions: Vec<Transaction>,
    /// Nonce found by proof-of-work
    pub nonce: u64,
}

impl Block {
    /// Mine a block on top of `prev_hash`
    pub fn new(
        transactions: Vec<Transaction>,
        prev_hash: Hash256,
        pow: &ProofOfWork,
    ) -> Result<Self, MiningError> {
        let merkle_root = MerkleTree::from_transactions(&transactions).root();
        let result = pow.run(&merkle_root, &prev_hash)?;

        Ok(Self {
            hash: result.hash,
            prev_hash,
            transactions,
            nonce: result.nonce,
        })
    }

    /// Mine the first block of a chain around its coinbase
    pub fn genesis(coinbase: Transaction, pow: &ProofOfWork) -> Result<Self, MiningError> {
        Self::new(vec![coinbase], Hash256::zero(), pow)
    }

    /// Header digest for a candidate nonce
    ///
    /// The nonce is appended as 8 big-endian bytes. An empty previous hash
    /// contributes no bytes.
    pub fn header_digest(merkle_root: &Hash256, prev_hash: &Hash256, nonce: u64) -> Hash256 {
        let mut preimage = Vec::with_capacity(72);
        preimage.extend_from_slice(merkle_root.as_bytes());
        if !prev_hash.is_zero() {
            preimage.extend_from_slice(prev_hash.as_bytes());
        }
        preimage.extend_from_slice(&nonce.to_be_bytes());
        sha256(&preimage)
    }

    /// Merkle root of the transaction ids
    pub fn hash_transactions(&self) -> Hash256 {
        MerkleTree::from_transactions(&self.transactions).root()
    }

    /// Digest recomputed from the block contents and recorded nonce
    pub fn compute_hash(&self) -> Hash256 {
        Self::header_digest(&self.hash_transactions(), &self.prev_hash, self.nonce)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }
}

impl Serializable for Block {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.hash.as_bytes())?;

        // genesis stores an empty previous hash
        if self.prev_hash.is_zero() {
            write_var_bytes(writer, &[])?;
        } else {
            write_var_bytes(writer, self.prev_hash.as_bytes())?;
        }

        writer.write_all(&self.nonce.to_le_bytes())?;

        write_varint(writer, self.transactions.len() as u64)?;
        for tx in &self.transactions {
            tx.encode(writer)?;
        }

        Ok(())
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, SerializeError> {
        let hash = read_hash(reader)?;

        let prev_bytes = read_var_bytes(reader)?;
        let prev_hash = if prev_bytes.is_empty() {
            Hash256::zero()
        } else {
            Hash256::from_slice(&prev_bytes)?
        };

        let nonce = read_u64(reader)?;

        let tx_count = read_length(reader)?;
        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            transactions.push(Transaction::decode(reader)?);
        }

        Ok(Self {
            hash,
            prev_hash,
            transactions,
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput};
    use crate::wallet::Address;

    fn coinbase(memo: &str) -> Transaction {
        let to = Address::from_pub_key_hash(&[1u8; 20]);
        Transaction::coinbase(&to, Some(memo), 100).unwrap()
    }

    #[test]
    fn test_genesis_block() {
        let pow = ProofOfWork::new(8);
        let genesis = Block::genesis(coinbase("genesis"), &pow).unwrap();

        assert!(genesis.is_genesis());
        assert_eq!(genesis.transactions.len(), 1);
        assert_eq!(genesis.hash, genesis.compute_hash());
        assert!(pow.validate(&genesis));
    }

    #[test]
    fn test_block_serialization() {
        let pow = ProofOfWork::new(8);
        let genesis = Block::genesis(coinbase("genesis"), &pow).unwrap();

        let spend = Transaction::new(
            vec![TxInput::new(genesis.transactions[0].id, 0, vec![4u8; 64])],
            vec![TxOutput::new(100, [2u8; 20])],
        );
        let block = Block::new(vec![coinbase("second"), spend], genesis.hash, &pow).unwrap();

        for original in [genesis, block] {
            let decoded = Block::deserialize(&original.serialize()).unwrap();
            assert_eq!(original, decoded);
        }
    }

    #[test]
    fn test_genesis_stores_empty_prev_hash() {
        let pow = ProofOfWork::new(4);
        let genesis = Block::genesis(coinbase("genesis"), &pow).unwrap();
        let bytes = genesis.serialize();
        // hash, then a zero-length previous hash
        assert_eq!(bytes[32], 0);
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        let pow = ProofOfWork::new(4);
        let genesis = Block::genesis(coinbase("genesis"), &pow).unwrap();
        let bytes = genesis.serialize();

        assert!(Block::deserialize(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(Block::deserialize(&trailing).is_err());
    }

    #[test]
    fn test_altered_nonce_fails_validation() {
        let pow = ProofOfWork::new(12);
        let mut block = (0..)
            .map(|i| Block::genesis(coinbase(&format!("nonce check {}", i)), &pow).unwrap())
            .find(|block| block.nonce > 0)
            .unwrap();
        assert!(pow.validate(&block));

        // every nonce below the one found was rejected by the search
        block.nonce -= 1;
        assert!(!pow.validate(&block));
    }

    #[test]
    fn test_header_digest_depends_on_every_field() {
        let merkle = Hash256::new([1u8; 32]);
        let prev = Hash256::new([2u8; 32]);
        let base = Block::header_digest(&merkle, &prev, 7);

        assert_ne!(base, Block::header_digest(&Hash256::new([9u8; 32]), &prev, 7));
        assert_ne!(base, Block::header_digest(&merkle, &Hash256::zero(), 7));
        assert_ne!(base, Block::header_digest(&merkle, &prev, 8));
    }
}
