// The ledger: genesis, block admission, iteration and transaction lookup

use crate::config::{ChainConfig, GENESIS_MEMO};
use crate::consensus::{BlockValidator, ValidationError};
use crate::core::{Block, Hash256, Transaction};
use crate::storage::{BlockchainDB, ChainError, OutPoint};
use crate::wallet::Address;
use log::{debug, info, warn};
use p256::ecdsa::SigningKey;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Append-only chain of blocks in a sled store
///
/// The cached tip is refreshed from the store on every append, so several
/// handles (clones) may extend the same chain.
#[derive(Debug, Clone)]
pub struct Blockchain {
    db: BlockchainDB,
    tip: Hash256,
    config: ChainConfig,
}

impl Blockchain {
    /// Create a new chain at `path`, paying the genesis reward to `address`
    pub fn create<P: AsRef<Path>>(path: P, address: &Address, config: ChainConfig) -> Result<Self, ChainError> {
        let db = BlockchainDB::new(path)?;
        Self::create_in(db, address, config)
    }

    /// Continue the chain stored at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: ChainConfig) -> Result<Self, ChainError> {
        let db = BlockchainDB::new(path)?;
        Self::open_in(db, config)
    }

    /// Continue the chain at `path`, creating it first when none exists
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        address: &Address,
        config: ChainConfig,
    ) -> Result<Self, ChainError> {
        let db = BlockchainDB::new(path)?;
        if db.has_chain()? {
            Self::open_in(db, config)
        } else {
            Self::create_in(db, address, config)
        }
    }

    /// New chain in a temporary store (for testing)
    pub fn create_in_memory(address: &Address, config: ChainConfig) -> Result<Self, ChainError> {
        Self::create_in(BlockchainDB::memory()?, address, config)
    }

    /// Write the genesis block into an empty store
    pub fn create_in(db: BlockchainDB, address: &Address, config: ChainConfig) -> Result<Self, ChainError> {
        if db.has_chain()? {
            return Err(ChainError::ChainExists);
        }

        let coinbase = Transaction::coinbase(address, Some(GENESIS_MEMO), config.block_reward)?;
        let genesis = Block::genesis(coinbase, &config.proof_of_work())?;

        if !db.commit_block(None, &genesis)? {
            return Err(ChainError::ChainExists);
        }

        info!("Created blockchain with genesis {} paying {}", genesis.hash, address);
        Ok(Self {
            db,
            tip: genesis.hash,
            config,
        })
    }

    /// Attach to the chain already in `db`
    pub fn open_in(db: BlockchainDB, config: ChainConfig) -> Result<Self, ChainError> {
        let tip = db.get_tip()?.ok_or(ChainError::NoChain)?;
        debug!("Opened blockchain at tip {}", tip);
        Ok(Self { db, tip, config })
    }

    /// Hash of the newest block seen by this handle
    pub fn tip(&self) -> Hash256 {
        self.tip
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn validator(&self) -> BlockValidator {
        self.config.validator()
    }

    /// Mine `transactions` into a new block on the current tip
    ///
    /// Every non-coinbase transaction must carry valid signatures and spend
    /// only unspent outputs. If another handle advances the tip while this
    /// one is mining, the block is rebuilt on the new tip.
    pub fn add_block(&mut self, transactions: Vec<Transaction>) -> Result<Block, ChainError> {
        let validator = self.validator();
        let pow = self.config.proof_of_work();
        validator.validate_transactions(&transactions)?;

        loop {
            let tip = self.db.get_tip()?.ok_or(ChainError::NoChain)?;
            self.tip = tip;

            self.check_transactions(&transactions)?;

            let block = Block::new(transactions.clone(), tip, &pow)?;
            validator.validate_block(&block)?;

            if self.db.commit_block(Some(&tip), &block)? {
                self.tip = block.hash;
                info!(
                    "Added block {} ({} transactions, nonce {})",
                    block.hash,
                    block.transactions.len(),
                    block.nonce
                );
                return Ok(block);
            }

            warn!("Tip moved while mining on {}, rebuilding block", tip);
        }
    }

    /// Append a block mined elsewhere
    ///
    /// The block must extend the current tip and pass the same checks as a
    /// locally mined one. Returns `false` when it does not extend the tip.
    pub fn import_block(&mut self, block: &Block) -> Result<bool, ChainError> {
        let tip = self.db.get_tip()?.ok_or(ChainError::NoChain)?;
        self.tip = tip;
        if block.prev_hash != tip {
            debug!("Ignoring block {} not built on tip {}", block.hash, tip);
            return Ok(false);
        }

        self.validator().validate_block(block)?;
        self.check_transactions(&block.transactions)?;

        if !self.db.commit_block(Some(&tip), block)? {
            warn!("Tip moved while importing {}", block.hash);
            return Ok(false);
        }

        self.tip = block.hash;
        info!("Imported block {}", block.hash);
        Ok(true)
    }

    /// Signature, double-spend and value checks against the current chain
    fn check_transactions(&self, transactions: &[Transaction]) -> Result<(), ChainError> {
        let spent = self.spent_outputs()?;
        let mut spent_in_block = HashSet::new();

        if let Some(tx) = transactions.iter().find(|tx| !tx.has_valid_id()) {
            return Err(ChainError::InvalidTransaction(tx.id));
        }

        for tx in transactions.iter().filter(|tx| !tx.is_coinbase()) {
            let prev_txs = self.referenced_transactions(tx)?;
            if !tx.verify(&prev_txs)? {
                return Err(ChainError::InvalidTransaction(tx.id));
            }

            let mut input_value = 0u64;
            for input in &tx.inputs {
                let outpoint = OutPoint::new(input.prev_tx_id, input.out_index);
                if spent.contains(&outpoint) || !spent_in_block.insert(outpoint) {
                    return Err(ChainError::DoubleSpend {
                        txid: input.prev_tx_id,
                        index: input.out_index,
                    });
                }
                // verify() already resolved every referenced output
                let value = prev_txs[&input.prev_tx_id].outputs[input.out_index as usize].value;
                input_value = input_value.checked_add(value).ok_or(ValidationError::ValueOverflow)?;
            }

            let output_value = tx.total_output_value().ok_or(ValidationError::ValueOverflow)?;
            if output_value > input_value {
                return Err(ChainError::ValueNotConserved {
                    txid: tx.id,
                    inputs: input_value,
                    outputs: output_value,
                });
            }
        }

        Ok(())
    }

    /// Walk from the tip back to genesis
    pub fn iter(&self) -> BlockchainIterator<'_> {
        BlockchainIterator {
            db: &self.db,
            current: Some(self.tip),
            visited: HashSet::new(),
        }
    }

    /// Number of blocks in the chain
    pub fn len(&self) -> Result<usize, ChainError> {
        let mut count = 0;
        for block in self.iter() {
            block?;
            count += 1;
        }
        Ok(count)
    }

    /// A chain always holds at least its genesis block
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Height of the tip; genesis is height 0
    pub fn best_height(&self) -> Result<u64, ChainError> {
        Ok(self.len()? as u64 - 1)
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        self.db.get_block(hash)
    }

    /// Linear search tip -> genesis for a transaction id
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction, ChainError> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == *id) {
                return Ok(tx);
            }
        }
        Err(ChainError::TransactionNotFound(*id))
    }

    /// Resolve every transaction referenced by the inputs of `tx`
    ///
    /// A missing reference means the ledger or the transaction is corrupt.
    fn referenced_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>, ChainError> {
        let mut prev_txs = HashMap::new();
        for input in &tx.inputs {
            if prev_txs.contains_key(&input.prev_tx_id) {
                continue;
            }
            let prev_tx = self.find_transaction(&input.prev_tx_id).map_err(|e| match e {
                ChainError::TransactionNotFound(id) => {
                    ChainError::Transaction(crate::core::TransactionError::PreviousTransactionMissing(id))
                }
                other => other,
            })?;
            prev_txs.insert(prev_tx.id, prev_tx);
        }
        Ok(prev_txs)
    }

    /// Sign `tx` with `key` after resolving its inputs on this chain
    pub fn sign_transaction(&self, tx: &mut Transaction, key: &SigningKey) -> Result<(), ChainError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.referenced_transactions(tx)?;
        tx.sign(key, &prev_txs)?;
        Ok(())
    }

    /// Check the signatures of `tx` against the outputs it spends
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool, ChainError> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.referenced_transactions(tx)?;
        Ok(tx.verify(&prev_txs)?)
    }

    /// Re-check every stored block: links, hash, proof-of-work and signatures
    pub fn verify_chain(&self) -> Result<(), ChainError> {
        let validator = self.validator();
        let mut expected = Some(self.tip);

        for block in self.iter() {
            let block = block?;
            if expected != Some(block.hash) {
                return Err(ChainError::BlockMissing(block.hash));
            }
            validator.validate_block(&block)?;

            for tx in &block.transactions {
                if !tx.has_valid_id() || !self.verify_transaction(tx)? {
                    return Err(ChainError::InvalidTransaction(tx.id));
                }
            }

            expected = (!block.is_genesis()).then_some(block.prev_hash);
        }

        debug!("Verified chain ending at {}", self.tip);
        Ok(())
    }
}

/// Cursor over the chain from the tip back to genesis
pub struct BlockchainIterator<'a> {
    db: &'a BlockchainDB,
    current: Option<Hash256>,
    visited: HashSet<Hash256>,
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;

        // a link back into the visited set means the store is corrupt
        if !self.visited.insert(hash) {
            return Some(Err(ChainError::BlockMissing(hash)));
        }

        match self.db.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.current = Some(block.prev_hash);
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::BlockMissing(hash))),
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput};
    use crate::wallet::Wallet;
    use tempdir::TempDir;

    fn test_config() -> ChainConfig {
        ChainConfig::default().with_difficulty(8)
    }

    fn new_chain() -> (Wallet, Blockchain) {
        let wallet = Wallet::generate();
        let chain = Blockchain::create_in_memory(&wallet.address(), test_config()).unwrap();
        (wallet, chain)
    }

    /// Unsigned transfer of the genesis reward
    fn spend_genesis(chain: &Blockchain, owner: &Wallet, outputs: Vec<TxOutput>) -> Transaction {
        let genesis = chain.iter().last().unwrap().unwrap();
        let input = TxInput::new(genesis.transactions[0].id, 0, owner.public_key().to_vec());
        Transaction::new(vec![input], outputs)
    }

    #[test]
    fn test_genesis_created() {
        let (wallet, chain) = new_chain();
        let blocks: Vec<Block> = chain.iter().collect::<Result<_, _>>().unwrap();

        assert_eq!(blocks.len(), 1);
        let genesis = &blocks[0];
        assert!(genesis.is_genesis());
        assert_eq!(genesis.hash, chain.tip());
        assert_eq!(genesis.transactions.len(), 1);
        assert!(genesis.transactions[0].is_coinbase());
        assert_eq!(
            genesis.transactions[0].outputs[0],
            TxOutput::new(100, wallet.pub_key_hash())
        );
    }

    #[test]
    fn test_add_block_links_to_tip() {
        let (_, mut chain) = new_chain();
        let genesis_hash = chain.tip();

        let miner = Wallet::generate();
        let coinbase = Transaction::coinbase(&miner.address(), None, 100).unwrap();
        let block = chain.add_block(vec![coinbase]).unwrap();

        assert_eq!(block.prev_hash, genesis_hash);
        assert_eq!(chain.tip(), block.hash);
        assert_eq!(chain.len().unwrap(), 2);
        assert_eq!(chain.best_height().unwrap(), 1);
        assert!(chain.config().proof_of_work().validate(&block));
    }

    #[test]
    fn test_iterator_terminates_without_revisiting() {
        let (_, mut chain) = new_chain();
        let miner = Wallet::generate();
        for _ in 0..4 {
            let coinbase = Transaction::coinbase(&miner.address(), None, 100).unwrap();
            chain.add_block(vec![coinbase]).unwrap();
        }

        let hashes: Vec<Hash256> = chain.iter().map(|block| block.unwrap().hash).collect();
        assert_eq!(hashes.len(), 5);

        let unique: HashSet<Hash256> = hashes.iter().copied().collect();
        assert_eq!(unique.len(), hashes.len());

        let last = chain.iter().last().unwrap().unwrap();
        assert!(last.is_genesis());
    }

    #[test]
    fn test_find_transaction() {
        let (_, chain) = new_chain();
        let genesis = chain.iter().next().unwrap().unwrap();
        let coinbase_id = genesis.transactions[0].id;

        assert_eq!(chain.find_transaction(&coinbase_id).unwrap().id, coinbase_id);
        assert!(matches!(
            chain.find_transaction(&Hash256::new([9u8; 32])),
            Err(ChainError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_sign_and_verify_through_chain() {
        let (owner, chain) = new_chain();
        let recipient = Wallet::generate();

        let mut tx = spend_genesis(&chain, &owner, vec![TxOutput::new(100, recipient.pub_key_hash())]);
        chain.sign_transaction(&mut tx, owner.signing_key()).unwrap();
        assert!(chain.verify_transaction(&tx).unwrap());

        // signed by someone else
        let mut forged = spend_genesis(&chain, &owner, vec![TxOutput::new(100, recipient.pub_key_hash())]);
        chain.sign_transaction(&mut forged, recipient.signing_key()).unwrap();
        assert!(!chain.verify_transaction(&forged).unwrap());
    }

    #[test]
    fn test_own_key_cannot_spend_foreign_output() {
        let (owner, mut chain) = new_chain();
        let thief = Wallet::generate();

        let mut stolen = spend_genesis(&chain, &thief, vec![TxOutput::new(100, thief.pub_key_hash())]);
        chain.sign_transaction(&mut stolen, thief.signing_key()).unwrap();

        assert!(!chain.verify_transaction(&stolen).unwrap());
        assert!(matches!(chain.add_block(vec![stolen]), Err(ChainError::InvalidTransaction(_))));
        assert_eq!(chain.balance(&owner.address()).unwrap(), 100);
        assert_eq!(chain.balance(&thief.address()).unwrap(), 0);
    }

    #[test]
    fn test_sign_with_unknown_input() {
        let (owner, chain) = new_chain();
        let input = TxInput::new(Hash256::new([3u8; 32]), 0, owner.public_key().to_vec());
        let mut tx = Transaction::new(vec![input], vec![TxOutput::new(1, [0u8; 20])]);

        assert!(matches!(
            chain.sign_transaction(&mut tx, owner.signing_key()),
            Err(ChainError::Transaction(crate::core::TransactionError::PreviousTransactionMissing(_)))
        ));
    }

    #[test]
    fn test_add_block_rejects_unsigned() {
        let (owner, mut chain) = new_chain();
        let tx = spend_genesis(&chain, &owner, vec![TxOutput::new(100, [5u8; 20])]);

        assert!(matches!(chain.add_block(vec![tx]), Err(ChainError::InvalidTransaction(_))));
        assert_eq!(chain.len().unwrap(), 1);
    }

    #[test]
    fn test_add_block_rejects_double_spend() {
        let (owner, mut chain) = new_chain();

        let mut first = spend_genesis(&chain, &owner, vec![TxOutput::new(100, [5u8; 20])]);
        chain.sign_transaction(&mut first, owner.signing_key()).unwrap();
        chain.add_block(vec![first]).unwrap();

        let mut second = spend_genesis(&chain, &owner, vec![TxOutput::new(100, [6u8; 20])]);
        chain.sign_transaction(&mut second, owner.signing_key()).unwrap();
        assert!(matches!(chain.add_block(vec![second]), Err(ChainError::DoubleSpend { .. })));
    }

    #[test]
    fn test_add_block_rejects_double_spend_within_block() {
        let (owner, mut chain) = new_chain();

        let mut first = spend_genesis(&chain, &owner, vec![TxOutput::new(100, [5u8; 20])]);
        chain.sign_transaction(&mut first, owner.signing_key()).unwrap();
        let mut second = spend_genesis(&chain, &owner, vec![TxOutput::new(100, [6u8; 20])]);
        chain.sign_transaction(&mut second, owner.signing_key()).unwrap();

        assert!(matches!(
            chain.add_block(vec![first, second]),
            Err(ChainError::DoubleSpend { .. })
        ));
    }

    #[test]
    fn test_add_block_rejects_minting() {
        let (owner, mut chain) = new_chain();
        let mut tx = spend_genesis(&chain, &owner, vec![TxOutput::new(150, owner.pub_key_hash())]);
        chain.sign_transaction(&mut tx, owner.signing_key()).unwrap();

        assert!(matches!(
            chain.add_block(vec![tx]),
            Err(ChainError::ValueNotConserved { inputs: 100, outputs: 150, .. })
        ));
    }

    #[test]
    fn test_add_block_rejects_second_coinbase() {
        let (owner, mut chain) = new_chain();
        let a = Transaction::coinbase(&owner.address(), None, 100).unwrap();
        let b = Transaction::coinbase(&owner.address(), None, 100).unwrap();

        assert!(matches!(chain.add_block(vec![a, b]), Err(ChainError::Validation(_))));
    }

    #[test]
    fn test_invalid_batch_rejected_before_mining() {
        let (owner, chain) = new_chain();
        // a search that can never succeed
        let hard = test_config().with_difficulty(256).with_max_nonce(0);
        let mut strict = Blockchain::open_in(chain.db.clone(), hard).unwrap();

        assert!(matches!(
            strict.add_block(vec![]),
            Err(ChainError::Validation(ValidationError::NoTransactions))
        ));

        let a = Transaction::coinbase(&owner.address(), None, 100).unwrap();
        let b = Transaction::coinbase(&owner.address(), None, 100).unwrap();
        assert!(matches!(
            strict.add_block(vec![a, b]),
            Err(ChainError::Validation(ValidationError::MultipleCoinbase))
        ));
    }

    #[test]
    fn test_mining_exhausted() {
        let owner = Wallet::generate();
        let config = ChainConfig::default().with_difficulty(256).with_max_nonce(10);
        assert!(matches!(
            Blockchain::create_in_memory(&owner.address(), config),
            Err(ChainError::Mining(_))
        ));
    }

    #[test]
    fn test_two_handles_extend_one_chain() {
        let (_, mut first) = new_chain();
        let mut second = first.clone();
        let miner = Wallet::generate();

        let a = first
            .add_block(vec![Transaction::coinbase(&miner.address(), None, 100).unwrap()])
            .unwrap();
        // second's cached tip is stale; the append reads the stored tip
        let b = second
            .add_block(vec![Transaction::coinbase(&miner.address(), None, 100).unwrap()])
            .unwrap();

        assert_eq!(b.prev_hash, a.hash);
        assert_eq!(second.len().unwrap(), 3);
        second.verify_chain().unwrap();
    }

    #[test]
    fn test_import_block() {
        let (owner, mut chain) = new_chain();
        let mut other = chain.clone();

        let coinbase = Transaction::coinbase(&owner.address(), None, 100).unwrap();
        let pow = chain.config().proof_of_work();
        let block = Block::new(vec![coinbase], chain.tip(), &pow).unwrap();

        assert!(chain.import_block(&block).unwrap());
        assert_eq!(chain.tip(), block.hash);

        // already applied; no longer extends the tip
        assert!(!other.import_block(&block).unwrap());
        assert_eq!(other.tip(), block.hash);
    }

    #[test]
    fn test_import_rejects_tampered_block() {
        let (owner, mut chain) = new_chain();
        let coinbase = Transaction::coinbase(&owner.address(), None, 100).unwrap();
        let pow = chain.config().proof_of_work();
        let mut block = Block::new(vec![coinbase], chain.tip(), &pow).unwrap();
        block.transactions[0].outputs[0].value = 1000;
        assert!(matches!(chain.import_block(&block), Err(ChainError::Validation(_))));

        // same value, different beneficiary: only the id gives it away
        block.transactions[0].outputs[0] = TxOutput::new(100, [8u8; 20]);
        assert!(matches!(chain.import_block(&block), Err(ChainError::InvalidTransaction(_))));
    }

    #[test]
    fn test_import_rejects_overflowing_coinbase() {
        let (owner, mut chain) = new_chain();
        let outputs = vec![TxOutput::new(u64::MAX, owner.pub_key_hash()), TxOutput::new(101, owner.pub_key_hash())];
        let coinbase = Transaction::new(vec![TxInput::coinbase(b"overflow".to_vec())], outputs);
        let block = Block::new(vec![coinbase], chain.tip(), &chain.config().proof_of_work()).unwrap();

        assert!(matches!(
            chain.import_block(&block),
            Err(ChainError::Validation(ValidationError::ValueOverflow))
        ));
        assert_eq!(chain.len().unwrap(), 1);
        assert_eq!(chain.balance(&owner.address()).unwrap(), 100);
    }

    #[test]
    fn test_verify_chain() {
        let (owner, mut chain) = new_chain();
        let mut tx = spend_genesis(&chain, &owner, vec![TxOutput::new(100, [5u8; 20])]);
        chain.sign_transaction(&mut tx, owner.signing_key()).unwrap();
        chain.add_block(vec![tx]).unwrap();

        chain.verify_chain().unwrap();
    }

    #[test]
    fn test_create_and_reopen_on_disk() {
        let dir = TempDir::new("blockchain_test").unwrap();
        let path = dir.path().join("blocks");
        let owner = Wallet::generate();

        let tip = {
            let chain = Blockchain::create(&path, &owner.address(), test_config()).unwrap();
            chain.tip()
        };

        let reopened = Blockchain::open(&path, test_config()).unwrap();
        assert_eq!(reopened.tip(), tip);
    }

    #[test]
    fn test_has_chain_on_disk() {
        let dir = TempDir::new("blockchain_has_chain").unwrap();
        let path = dir.path().join("blocks");
        let owner = Wallet::generate();

        assert!(matches!(Blockchain::open(&path, test_config()), Err(ChainError::NoChain)));

        let tip = {
            let chain = Blockchain::open_or_create(&path, &owner.address(), test_config()).unwrap();
            chain.tip()
        };

        assert!(matches!(
            Blockchain::create(&path, &owner.address(), test_config()),
            Err(ChainError::ChainExists)
        ));

        let again = Blockchain::open_or_create(&path, &owner.address(), test_config()).unwrap();
        assert_eq!(again.tip(), tip);
    }
}
