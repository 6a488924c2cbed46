// Consensus rules: proof-of-work and block validation

pub mod pow;
pub mod validation;

pub use pow::{MiningError, MiningResult, ProofOfWork, Target};
pub use validation::{BlockValidator, ValidationError};
