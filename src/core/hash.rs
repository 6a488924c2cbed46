// Hashing utilities

use crate::core::{Hash256, PubKeyHash};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of an address checksum
pub const CHECKSUM_LENGTH: usize = 4;

/// Single SHA-256
pub fn sha256(data: &[u8]) -> Hash256 {
    let digest = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Hash256::new(bytes)
}

/// RIPEMD160(SHA256(data)) - the public-key hash outputs are locked to
pub fn hash160(data: &[u8]) -> PubKeyHash {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

/// First 4 bytes of SHA256(SHA256(payload))
pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut result = [0u8; CHECKSUM_LENGTH];
    result.copy_from_slice(&second[..CHECKSUM_LENGTH]);
    result
}
