// Base58Check addresses

use crate::core::{checksum, hash160, PubKeyHash, CHECKSUM_LENGTH};
use crate::wallet::WalletError;
use std::fmt;
use std::str::FromStr;

/// Version byte prefixed to every address payload
pub const ADDRESS_VERSION: u8 = 0x00;

/// version(1) + pubKeyHash(20) + checksum(4)
const DECODED_LENGTH: usize = 1 + 20 + CHECKSUM_LENGTH;

/// Base58 text form of `version || pubKeyHash || checksum`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Derive the address of a raw (X || Y) public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self::from_pub_key_hash(&hash160(public_key))
    }

    pub fn from_pub_key_hash(pub_key_hash: &PubKeyHash) -> Self {
        let mut payload = Vec::with_capacity(DECODED_LENGTH);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(pub_key_hash);
        let check = checksum(&payload);
        payload.extend_from_slice(&check);

        Self(bs58::encode(payload).into_string())
    }

    /// Parse and validate address text
    pub fn parse(text: &str) -> Result<Self, WalletError> {
        if !validate_address(text) {
            return Err(WalletError::InvalidAddress(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The public-key hash this address locks outputs to
    pub fn pub_key_hash(&self) -> Result<PubKeyHash, WalletError> {
        let decoded = decode_checked(&self.0)
            .ok_or_else(|| WalletError::InvalidAddress(self.0.clone()))?;

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&decoded[1..21]);
        Ok(hash)
    }
}

/// Decode base58 and check length, version and checksum
fn decode_checked(text: &str) -> Option<Vec<u8>> {
    let decoded = bs58::decode(text).into_vec().ok()?;
    if decoded.len() != DECODED_LENGTH || decoded[0] != ADDRESS_VERSION {
        return None;
    }

    let (payload, actual) = decoded.split_at(DECODED_LENGTH - CHECKSUM_LENGTH);
    if checksum(payload).as_slice() != actual {
        return None;
    }
    Some(decoded)
}

/// True when `address` decodes and its checksum matches the payload
pub fn validate_address(address: &str) -> bool {
    decode_checked(address).is_some()
}

impl FromStr for Address {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
