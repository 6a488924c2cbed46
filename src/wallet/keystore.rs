// Key management

use crate::core::{hash160, raw_public_key, PubKeyHash};
use crate::wallet::{Address, WalletError};
use log::{debug, info};
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// P-256 key pair; the public key is kept as raw X || Y bytes
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

impl Wallet {
    /// Generate a new key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Restore a key pair from its 32-byte private scalar
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let signing_key = SigningKey::from_slice(bytes).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = raw_public_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Raw X || Y public key bytes
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        hash160(&self.public_key)
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    fn secret_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// On-disk form of one wallet
#[derive(Serialize, Deserialize)]
struct StoredWallet {
    private_key: String,
    public_key: String,
}

/// On-disk form of the wallet file
#[derive(Serialize, Deserialize, Default)]
struct WalletFile {
    wallets: BTreeMap<String, StoredWallet>,
}

/// Address -> wallet map, persisted as one JSON file
///
/// The whole file is read on load and rewritten on save.
#[derive(Debug, Default)]
pub struct Wallets {
    wallets: BTreeMap<Address, Wallet>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a wallet, store it and return its address
    pub fn add_wallet(&mut self) -> Address {
        let wallet = Wallet::generate();
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    /// Store an existing wallet under its address
    pub fn insert(&mut self, wallet: Wallet) -> Address {
        let address = wallet.address();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    pub fn get_wallet(&self, address: &Address) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    /// All known addresses, sorted
    pub fn addresses(&self) -> Vec<Address> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Write every wallet to `path`, replacing the file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let path = path.as_ref();
        let file = WalletFile {
            wallets: self
                .wallets
                .iter()
                .map(|(address, wallet)| {
                    let stored = StoredWallet {
                        private_key: hex::encode(wallet.secret_bytes()),
                        public_key: hex::encode(wallet.public_key()),
                    };
                    (address.to_string(), stored)
                })
                .collect(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&file)?;
        fs::write(path, json)?;

        info!("Saved {} wallets to {}", self.wallets.len(), path.display());
        Ok(())
    }

    /// Read the wallet file at `path`
    ///
    /// Each entry must re-derive to the public key and address it was stored under.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let file: WalletFile = serde_json::from_str(&json)?;

        let mut wallets = BTreeMap::new();
        for (text, stored) in file.wallets {
            let address = Address::parse(&text)?;
            let secret = hex::decode(&stored.private_key).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
            let wallet = Wallet::from_secret_bytes(&secret)?;

            if hex::encode(wallet.public_key()) != stored.public_key || wallet.address() != address {
                return Err(WalletError::InvalidKey(format!("key pair does not match {}", address)));
            }
            wallets.insert(address, wallet);
        }

        debug!("Loaded {} wallets from {}", wallets.len(), path.display());
        Ok(Self { wallets })
    }

    /// Like `load`, but an absent file yields an empty set
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}
