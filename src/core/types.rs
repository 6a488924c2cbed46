// Basic types shared by blocks and transactions

use crate::core::SerializeError;
use std::fmt;

/// RIPEMD-160(SHA-256(public key)), the value an output is locked to
pub type PubKeyHash = [u8; 20];

/// 256-bit digest (32 bytes)
/// Used for block hashes, transaction ids and Merkle roots. The all-zero
/// value stands for "empty": the genesis block's previous hash and the
/// coinbase input's referenced transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a Hash256 from a slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, SerializeError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| {
            SerializeError::Invalid(format!("hash must be 32 bytes, got {}", slice.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The "empty" hash
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Hex in storage order (big-endian, no byte reversal)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, SerializeError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| SerializeError::Invalid(format!("invalid hex string: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
