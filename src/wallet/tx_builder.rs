// Transaction builder

use crate::core::{Transaction, TxInput, TxOutput};
use crate::storage::{Blockchain, ChainError};
use crate::wallet::{Address, Wallets};
use log::{debug, warn};

/// Builds signed transfers from the wallets it holds
pub struct TransactionBuilder<'a> {
    wallets: &'a Wallets,
    chain: &'a Blockchain,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(wallets: &'a Wallets, chain: &'a Blockchain) -> Self {
        Self { wallets, chain }
    }

    /// Build and sign a transfer of `amount` from `from` to `to`
    ///
    /// Spendable outputs are taken in outpoint order until they cover the
    /// amount; any surplus comes back to `from` as a change output.
    pub fn build(&self, from: &Address, to: &Address, amount: u64) -> Result<Transaction, ChainError> {
        if amount == 0 {
            return Err(ChainError::InvalidAmount(amount));
        }

        let Some(wallet) = self.wallets.get_wallet(from) else {
            warn!("No wallet for sender {}", from);
            return Err(ChainError::InsufficientFunds {
                required: amount,
                available: 0,
            });
        };

        let recipient = TxOutput::lock(amount, to)?;

        let (accumulated, outpoints) = self.chain.find_spendable_outputs(&wallet.pub_key_hash(), amount)?;
        if accumulated < amount {
            return Err(ChainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let inputs = outpoints
            .iter()
            .map(|outpoint| TxInput::new(outpoint.txid, outpoint.index, wallet.public_key().to_vec()))
            .collect();

        let mut outputs = vec![recipient];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, wallet.pub_key_hash()));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.chain.sign_transaction(&mut tx, wallet.signing_key())?;

        debug!(
            "Built transaction {} ({} -> {}, {} of {} spent)",
            tx.id, from, to, amount, accumulated
        );
        Ok(tx)
    }

    /// Spendable balance of `address` on the chain
    pub fn balance(&self, address: &Address) -> Result<u64, ChainError> {
        self.chain.balance(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;

    fn setup() -> (Wallets, Address, Address, Blockchain) {
        let mut wallets = Wallets::new();
        let alice = wallets.add_wallet();
        let bob = wallets.add_wallet();
        let config = ChainConfig::default().with_difficulty(8);
        let chain = Blockchain::create_in_memory(&alice, config).unwrap();
        (wallets, alice, bob, chain)
    }

    #[test]
    fn test_build_with_change() {
        let (wallets, alice, bob, chain) = setup();
        let builder = TransactionBuilder::new(&wallets, &chain);

        let tx = builder.build(&alice, &bob, 30).unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 30);
        assert_eq!(tx.outputs[0].pub_key_hash, bob.pub_key_hash().unwrap());
        assert_eq!(tx.outputs[1].value, 70);
        assert_eq!(tx.outputs[1].pub_key_hash, alice.pub_key_hash().unwrap());
        assert_eq!(tx.id, tx.hash());
        assert!(chain.verify_transaction(&tx).unwrap());
    }

    #[test]
    fn test_build_exact_amount_has_no_change() {
        let (wallets, alice, bob, chain) = setup();
        let tx = TransactionBuilder::new(&wallets, &chain).build(&alice, &bob, 100).unwrap();
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let (wallets, alice, bob, mut chain) = setup();
        for _ in 0..3 {
            let coinbase = Transaction::coinbase(&alice, None, 100).unwrap();
            chain.add_block(vec![coinbase]).unwrap();
        }

        let builder = TransactionBuilder::new(&wallets, &chain);
        let first = builder.build(&alice, &bob, 250).unwrap();
        let second = builder.build(&alice, &bob, 250).unwrap();

        assert_eq!(first.inputs.len(), 3);
        assert_eq!(first.outputs[1].value, 50);
        // signatures use a fresh nonce, so compare the spent outpoints
        let spent = |tx: &Transaction| {
            tx.inputs
                .iter()
                .map(|input| (input.prev_tx_id, input.out_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(spent(&first), spent(&second));
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_insufficient_funds() {
        let (wallets, alice, bob, chain) = setup();
        let result = TransactionBuilder::new(&wallets, &chain).build(&alice, &bob, 101);

        assert!(matches!(
            result,
            Err(ChainError::InsufficientFunds { required: 101, available: 100 })
        ));
    }

    #[test]
    fn test_unknown_sender() {
        let (wallets, _, bob, chain) = setup();
        let stranger = Address::from_pub_key_hash(&[4u8; 20]);
        let result = TransactionBuilder::new(&wallets, &chain).build(&stranger, &bob, 10);

        assert!(matches!(
            result,
            Err(ChainError::InsufficientFunds { required: 10, available: 0 })
        ));
    }

    #[test]
    fn test_zero_amount() {
        let (wallets, alice, bob, chain) = setup();
        let result = TransactionBuilder::new(&wallets, &chain).build(&alice, &bob, 0);
        assert!(matches!(result, Err(ChainError::InvalidAmount(0))));
    }

    #[test]
    fn test_balance() {
        let (wallets, alice, bob, mut chain) = setup();
        let tx = TransactionBuilder::new(&wallets, &chain).build(&alice, &bob, 45).unwrap();
        chain.add_block(vec![tx]).unwrap();

        let builder = TransactionBuilder::new(&wallets, &chain);
        assert_eq!(builder.balance(&alice).unwrap(), 55);
        assert_eq!(builder.balance(&bob).unwrap(), 45);
    }
}
