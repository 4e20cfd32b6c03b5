//! Account State Merkle Tree
//!
//! A dense binary Merkle tree of fixed depth over account leaves.
//!
//! ```text
//!                    Root (level 0)
//!                   /              \
//!              H(0,1)              H(2,3)       (level 1)
//!             /      \            /      \
//!          H(L0)    H(L1)      H(L2)    H(L3)   (level D = leaf hashes)
//!           |        |          |        |
//!        Leaf0    Leaf1      Leaf2    Leaf3
//! ```
//!
//! `rebuild` is the only mutation path: it right-pads the leaf slice with
//! zero accounts to exactly `2^D` before hashing, so callers never pad.
//! Cost is O(2^D) hashes; incremental updates happen at the subtree level
//! in the accumulator, not here.

use ark_bn254::Fr;

use crate::account::Account;
use crate::error::OperatorError;
use crate::hash;

/// Fixed-depth Merkle tree over account leaves.
///
/// Level 0 holds the root; level `depth` holds the `2^depth` leaf hashes.
#[derive(Debug, Clone)]
pub struct AccountTree {
    depth: usize,
    /// `levels[l]` has `2^l` nodes
    levels: Vec<Vec<Fr>>,
}

impl AccountTree {
    /// Build a full tree from at most `2^depth` accounts.
    ///
    /// Unfilled slots are implicitly the zero account; this is a total
    /// function over any leaf slice that fits the tree.
    pub fn rebuild(accounts: &[Account], depth: usize) -> Result<Self, OperatorError> {
        let capacity = 1usize << depth;
        if accounts.len() > capacity {
            return Err(OperatorError::CapacityExceeded {
                capacity: capacity as u64,
            });
        }

        let mut leaf_hashes = Vec::with_capacity(capacity);
        for account in accounts {
            leaf_hashes.push(account.hash()?);
        }
        let zero_hash = Account::zero().hash()?;
        leaf_hashes.resize(capacity, zero_hash);

        let levels = build_levels(leaf_hashes)?;
        Ok(Self { depth, levels })
    }

    /// Root of a standalone subtree over exactly `size` leaves.
    ///
    /// `size` must be a power of two; accounts beyond `size` are rejected,
    /// missing ones pad with the zero account.
    pub fn subtree_root(accounts: &[Account], size: usize) -> Result<Fr, OperatorError> {
        if !size.is_power_of_two() {
            return Err(OperatorError::Geometry(format!(
                "subtree size {} is not a power of two",
                size
            )));
        }
        let depth = size.trailing_zeros() as usize;
        let tree = Self::rebuild(accounts, depth)?;
        Ok(tree.root())
    }

    /// Current root
    pub fn root(&self) -> Fr {
        self.levels[0][0]
    }

    /// Tree depth D
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Node hash at `level` (0 = root, depth = leaves), if in range
    pub fn node(&self, level: usize, index: usize) -> Option<Fr> {
        self.levels.get(level)?.get(index).copied()
    }

    /// Leaf hashes, padded to `2^depth`
    pub fn leaf_hashes(&self) -> &[Fr] {
        &self.levels[self.depth]
    }
}

/// Fold leaf hashes up to the root; returns levels ordered root-first.
fn build_levels(leaves: Vec<Fr>) -> Result<Vec<Vec<Fr>>, OperatorError> {
    let mut levels = vec![leaves];
    while levels[levels.len() - 1].len() > 1 {
        let child = &levels[levels.len() - 1];
        let mut parent = Vec::with_capacity(child.len() / 2);
        for pair in child.chunks(2) {
            parent.push(hash::combine(&pair[0], &pair[1])?);
        }
        levels.push(parent);
    }
    levels.reverse();
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;

    fn test_account(seed: u64) -> Account {
        Account {
            index: Some(seed as u32),
            pubkey_x: Fr::from(seed),
            pubkey_y: Fr::from(seed + 1),
            balance: 100 * seed,
            nonce: 0,
            token_type: 0,
        }
    }

    #[test]
    fn test_empty_tree_consistent() {
        let t1 = AccountTree::rebuild(&[], 4).unwrap();
        let t2 = AccountTree::rebuild(&[], 4).unwrap();
        assert_eq!(t1.root(), t2.root());
    }

    #[test]
    fn test_rebuild_pads_internally() {
        let accounts = [test_account(1), test_account(2)];
        let padded = {
            let mut v = accounts.to_vec();
            v.resize(16, Account::zero());
            v
        };

        let short = AccountTree::rebuild(&accounts, 4).unwrap();
        let full = AccountTree::rebuild(&padded, 4).unwrap();
        assert_eq!(short.root(), full.root());
    }

    #[test]
    fn test_level_structure() {
        let tree = AccountTree::rebuild(&[test_account(1)], 3).unwrap();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaf_hashes().len(), 8);

        // Every inner node is the combine of its children
        for level in 0..3 {
            for index in 0..(1usize << level) {
                let parent = tree.node(level, index).unwrap();
                let left = tree.node(level + 1, 2 * index).unwrap();
                let right = tree.node(level + 1, 2 * index + 1).unwrap();
                assert_eq!(parent, hash::combine(&left, &right).unwrap());
            }
        }
    }

    #[test]
    fn test_root_changes_with_leaves() {
        let empty = AccountTree::rebuild(&[], 4).unwrap();
        let one = AccountTree::rebuild(&[test_account(1)], 4).unwrap();
        assert_ne!(empty.root(), one.root());
    }

    #[test]
    fn test_overflow_rejected() {
        let accounts: Vec<Account> = (0..5).map(test_account).collect();
        let result = AccountTree::rebuild(&accounts, 2);
        assert!(matches!(
            result,
            Err(OperatorError::CapacityExceeded { capacity: 4 })
        ));
    }

    #[test]
    fn test_subtree_root_matches_small_tree() {
        let accounts: Vec<Account> = (0..4).map(test_account).collect();
        let root = AccountTree::subtree_root(&accounts, 4).unwrap();
        let tree = AccountTree::rebuild(&accounts, 2).unwrap();
        assert_eq!(root, tree.root());
    }

    #[test]
    fn test_subtree_size_must_be_power_of_two() {
        let accounts: Vec<Account> = (0..3).map(test_account).collect();
        assert!(matches!(
            AccountTree::subtree_root(&accounts, 3),
            Err(OperatorError::Geometry(_))
        ));
    }
}
