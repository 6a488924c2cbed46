// Merkle tree over transaction ids

use crate::core::{sha256, Hash256, Transaction};

/// Binary hash tree committing to an ordered list of items
///
/// Leaves are `SHA256(item)`, parents are `SHA256(left || right)`. A level
/// with an odd number of nodes is padded by repeating its last node before
/// pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// levels[0] holds the leaves, the last level holds the root
    levels: Vec<Vec<Hash256>>,
    leaf_count: usize,
}

impl MerkleTree {
    pub fn new(items: &[Hash256]) -> Self {
        if items.is_empty() {
            return Self { levels: vec![vec![Hash256::zero()]], leaf_count: 0 };
        }

        let leaves: Vec<Hash256> = items.iter().map(|item| sha256(item.as_bytes())).collect();
        let mut levels = vec![leaves];

        while levels.last().map_or(false, |level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let mut next_level = Vec::with_capacity(current.len().div_ceil(2));

            for pair in current.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };

                let mut combined = [0u8; 64];
                combined[..32].copy_from_slice(left.as_bytes());
                combined[32..].copy_from_slice(right.as_bytes());
                next_level.push(sha256(&combined));
            }

            levels.push(next_level);
        }

        Self { levels, leaf_count: items.len() }
    }

    /// Tree over the ids of `transactions`, in block order
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let ids: Vec<Hash256> = transactions.iter().map(|tx| tx.id).collect();
        Self::new(&ids)
    }

    /// Root digest; the zero hash for an empty tree
    pub fn root(&self) -> Hash256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }
}
