// Keys, addresses and transaction building

mod address;
mod keystore;
mod tx_builder;

pub use address::{validate_address, Address, ADDRESS_VERSION};
pub use keystore::{Wallet, Wallets};
pub use tx_builder::TransactionBuilder;

use std::io;
use thiserror::Error;

/// Wallet and addressing errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Wallet file error: {0}")]
    Io(#[from] io::Error),

    #[error("Wallet file format error: {0}")]
    Format(#[from] serde_json::Error),
}
