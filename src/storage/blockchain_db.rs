// Blockchain database using sled

use crate::core::{Block, Hash256, Serializable};
use crate::storage::ChainError;
use sled::transaction::TransactionError;
use sled::Db;
use std::convert::Infallible;
use std::path::Path;

/// Key holding the hash of the newest block
const TIP_KEY: &[u8] = b"tip";

/// Block store: `tip -> hash`, `hash -> serialized block`
///
/// Clones share the same underlying database.
#[derive(Clone)]
pub struct BlockchainDB {
    db: Db,
}

impl std::fmt::Debug for BlockchainDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainDB").finish()
    }
}

impl BlockchainDB {
    /// Open (or create) the store at `path`
    ///
    /// sled holds an exclusive lock on the directory, so a second process
    /// opening the same path fails here.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing)
    pub fn memory() -> Result<Self, ChainError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// A chain exists once a tip has been written
    pub fn has_chain(&self) -> Result<bool, ChainError> {
        Ok(self.db.contains_key(TIP_KEY)?)
    }

    /// Get the chain tip (newest block hash)
    pub fn get_tip(&self) -> Result<Option<Hash256>, ChainError> {
        match self.db.get(TIP_KEY)? {
            Some(data) => Hash256::from_slice(&data)
                .map(Some)
                .map_err(|_| ChainError::CorruptTip),
            None => Ok(None),
        }
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        match self.db.get(hash.as_bytes())? {
            Some(data) => Ok(Some(Block::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.db.contains_key(hash.as_bytes())?)
    }

    /// Store `block` and point the tip at it, if the tip is still `expected_tip`
    ///
    /// `None` expects an empty store (genesis). Both writes happen in one
    /// sled transaction; returns `false` without writing when the tip moved.
    pub fn commit_block(&self, expected_tip: Option<&Hash256>, block: &Block) -> Result<bool, ChainError> {
        let serialized = block.serialize();
        let hash = block.hash;
        let expected: Option<&[u8]> = expected_tip.map(|tip| tip.as_bytes().as_slice());

        let outcome: Result<bool, TransactionError<Infallible>> = self.db.transaction(|tx| {
            let current = tx.get(TIP_KEY)?;
            if current.as_deref() != expected {
                return Ok(false);
            }

            tx.insert(hash.as_bytes().as_slice(), serialized.as_slice())?;
            tx.insert(TIP_KEY, hash.as_bytes().as_slice())?;
            Ok(true)
        });

        let committed = match outcome {
            Ok(committed) => committed,
            Err(TransactionError::Storage(e)) => return Err(ChainError::Store(e)),
            Err(TransactionError::Abort(never)) => match never {},
        };

        if committed {
            self.db.flush()?;
        }
        Ok(committed)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), ChainError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ProofOfWork;
    use crate::core::Transaction;
    use crate::wallet::Address;

    fn genesis() -> Block {
        let to = Address::from_pub_key_hash(&[1u8; 20]);
        let coinbase = Transaction::coinbase(&to, Some("genesis"), 100).unwrap();
        Block::genesis(coinbase, &ProofOfWork::new(4)).unwrap()
    }

    fn child_of(parent: &Block, memo: &str) -> Block {
        let to = Address::from_pub_key_hash(&[2u8; 20]);
        let coinbase = Transaction::coinbase(&to, Some(memo), 100).unwrap();
        Block::new(vec![coinbase], parent.hash, &ProofOfWork::new(4)).unwrap()
    }

    #[test]
    fn test_empty_store_has_no_chain() {
        let db = BlockchainDB::memory().unwrap();
        assert!(!db.has_chain().unwrap());
        assert_eq!(db.get_tip().unwrap(), None);
    }

    #[test]
    fn test_commit_and_get_block() {
        let db = BlockchainDB::memory().unwrap();
        let block = genesis();

        assert!(db.commit_block(None, &block).unwrap());
        assert!(db.has_chain().unwrap());
        assert_eq!(db.get_tip().unwrap(), Some(block.hash));
        assert!(db.has_block(&block.hash).unwrap());
        assert_eq!(db.get_block(&block.hash).unwrap(), Some(block));
    }

    #[test]
    fn test_commit_rejects_stale_tip() {
        let db = BlockchainDB::memory().unwrap();
        let first = genesis();
        db.commit_block(None, &first).unwrap();

        // a second genesis must not replace the tip
        assert!(!db.commit_block(None, &genesis()).unwrap());

        let second = child_of(&first, "second");
        assert!(db.commit_block(Some(&first.hash), &second).unwrap());

        // built on the old tip; nothing is written
        let stale = child_of(&first, "stale");
        assert!(!db.commit_block(Some(&first.hash), &stale).unwrap());
        assert_eq!(db.get_tip().unwrap(), Some(second.hash));
        assert!(!db.has_block(&stale.hash).unwrap());
    }

    #[test]
    fn test_missing_block() {
        let db = BlockchainDB::memory().unwrap();
        assert_eq!(db.get_block(&Hash256::new([5u8; 32])).unwrap(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let db = BlockchainDB::memory().unwrap();
        let other = db.clone();
        let block = genesis();

        db.commit_block(None, &block).unwrap();
        assert_eq!(other.get_tip().unwrap(), Some(block.hash));
    }
}
