// Core blockchain data structures

mod types;
mod transaction;
mod block;
mod merkle;
mod hash;
pub mod serialize;

pub use types::*;
pub use transaction::*;
pub use block::*;
pub use merkle::MerkleTree;
pub use serialize::{Serializable, SerializeError};
pub use hash::*;
