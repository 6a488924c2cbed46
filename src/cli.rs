// CLI commands

use crate::config::ChainConfig;
use crate::consensus::ProofOfWork;
use crate::core::{Block, Transaction};
use crate::storage::{Blockchain, ChainError};
use crate::wallet::{Address, TransactionBuilder, Wallets};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "utxo-ledger")]
#[command(about = "Single-node proof-of-work ledger with UTXO accounting", long_about = None)]
pub struct Cli {
    /// Directory holding the block store and the wallet file
    #[arg(long, global = true, default_value = "./data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a blockchain and pay the genesis reward to ADDRESS
    CreateBlockchain {
        #[arg(long)]
        address: String,
    },

    /// Print every block from the tip back to genesis
    PrintChain,

    /// Get the balance of an address
    GetBalance {
        #[arg(long)]
        address: String,
    },

    /// Send coins and mine them into a block
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        /// Also mint the block reward to the sender
        #[arg(long)]
        mine_reward: bool,
    },

    /// Generate a new wallet
    CreateWallet,

    /// List the addresses in the wallet file
    ListAddresses,
}

/// CLI handler
pub struct CliHandler {
    data_dir: PathBuf,
    config: ChainConfig,
}

impl CliHandler {
    pub fn new(data_dir: PathBuf) -> Self {
        Self::with_config(data_dir, ChainConfig::default())
    }

    pub fn with_config(data_dir: PathBuf, config: ChainConfig) -> Self {
        Self { data_dir, config }
    }

    fn chain_path(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    fn wallets_path(&self) -> PathBuf {
        self.data_dir.join("wallets.json")
    }

    fn open_chain(&self) -> Result<Blockchain, ChainError> {
        Blockchain::open(self.chain_path(), self.config)
    }

    /// Handle CLI command
    pub fn handle(&self, command: Commands) -> Result<(), ChainError> {
        match command {
            Commands::CreateBlockchain { address } => self.create_blockchain(&address),
            Commands::PrintChain => self.print_chain(),
            Commands::GetBalance { address } => self.get_balance(&address),
            Commands::Send {
                from,
                to,
                amount,
                mine_reward,
            } => self.send(&from, &to, amount, mine_reward),
            Commands::CreateWallet => self.create_wallet(),
            Commands::ListAddresses => self.list_addresses(),
        }
    }

    fn create_blockchain(&self, address: &str) -> Result<(), ChainError> {
        let address = Address::parse(address)?;
        let chain = Blockchain::create(self.chain_path(), &address, self.config)?;

        println!("Created blockchain");
        println!("  Genesis: {}", chain.tip());
        Ok(())
    }

    fn print_chain(&self) -> Result<(), ChainError> {
        let chain = self.open_chain()?;
        let pow = self.config.proof_of_work();

        for block in chain.iter() {
            print_block(&block?, &pow);
        }
        Ok(())
    }

    fn get_balance(&self, address: &str) -> Result<(), ChainError> {
        let address = Address::parse(address)?;
        let chain = self.open_chain()?;

        println!("Balance of {}: {}", address, chain.balance(&address)?);
        Ok(())
    }

    fn send(&self, from: &str, to: &str, amount: u64, mine_reward: bool) -> Result<(), ChainError> {
        let from = Address::parse(from)?;
        let to = Address::parse(to)?;

        let wallets = Wallets::load_or_default(self.wallets_path())?;
        let mut chain = self.open_chain()?;

        let tx = TransactionBuilder::new(&wallets, &chain).build(&from, &to, amount)?;

        let mut transactions = Vec::with_capacity(2);
        if mine_reward {
            transactions.push(Transaction::coinbase(&from, None, self.config.block_reward)?);
        }
        transactions.push(tx);

        let block = chain.add_block(transactions)?;

        println!("Sent {} from {} to {}", amount, from, to);
        println!("  Block: {}", block.hash);
        Ok(())
    }

    fn create_wallet(&self) -> Result<(), ChainError> {
        let path = self.wallets_path();
        let mut wallets = Wallets::load_or_default(&path)?;
        let address = wallets.add_wallet();
        wallets.save(&path)?;

        println!("New address: {}", address);
        Ok(())
    }

    fn list_addresses(&self) -> Result<(), ChainError> {
        let wallets = Wallets::load_or_default(self.wallets_path())?;
        for address in wallets.addresses() {
            println!("{}", address);
        }
        Ok(())
    }
}

/// Print block information
fn print_block(block: &Block, pow: &ProofOfWork) {
    println!("Block {}", block.hash);
    if block.is_genesis() {
        println!("  Previous: (genesis)");
    } else {
        println!("  Previous: {}", block.prev_hash);
    }
    println!("  Nonce: {}", block.nonce);
    println!("  PoW: {}", pow.validate(block));

    for tx in &block.transactions {
        println!("  Transaction {}", tx.id);
        for input in &tx.inputs {
            if input.is_coinbase() {
                println!("    Input: coinbase ({})", String::from_utf8_lossy(&input.pub_key));
            } else {
                println!("    Input: {}:{}", input.prev_tx_id, input.out_index);
            }
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            println!(
                "    Output {}: {} to {}",
                index,
                output.value,
                Address::from_pub_key_hash(&output.pub_key_hash)
            );
        }
    }
    println!();
}
