//! Zero-subtree cache
//!
//! Precomputed node hashes of a tree whose every leaf is the zero
//! account, one per level. `level(D)` is the zero-account leaf hash,
//! `level(0)` the root of the all-empty tree. Built once at startup;
//! depth and the zero account are immutable configuration, so there is
//! no invalidation path.

use ark_bn254::Fr;

use crate::error::OperatorError;
use crate::tree::AccountTree;

/// Per-level hashes of the all-empty tree
#[derive(Debug, Clone)]
pub struct ZeroCache {
    /// `nodes[l]` is the level-`l` node hash; length `depth + 1`
    nodes: Vec<Fr>,
}

impl ZeroCache {
    /// Build from a throwaway all-zero tree of the given depth.
    ///
    /// Deterministic: depends only on `depth` and the hash primitive.
    pub fn build(depth: usize) -> Result<Self, OperatorError> {
        // rebuild pads every leaf slot with the zero account
        let tree = AccountTree::rebuild(&[], depth)?;
        let nodes = (0..=depth)
            .map(|level| tree.node(level, 0))
            .collect::<Option<Vec<Fr>>>()
            .ok_or_else(|| {
                OperatorError::ProofAssemblyInconsistency(
                    "zero tree is missing a level".to_string(),
                )
            })?;
        Ok(Self { nodes })
    }

    /// Node hash at `level`; panics if `level > depth`
    pub fn level(&self, level: usize) -> Fr {
        self.nodes[level]
    }

    /// All per-level hashes, root first
    pub fn nodes(&self) -> &[Fr] {
        &self.nodes
    }

    /// Depth of the cached tree
    pub fn depth(&self) -> usize {
        self.nodes.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::hash;

    #[test]
    fn test_level_combine_invariant() {
        // ZeroCache[l] = combine(ZeroCache[l+1], ZeroCache[l+1]) for every l < D
        for depth in 1..=6 {
            let cache = ZeroCache::build(depth).unwrap();
            assert_eq!(cache.depth(), depth);
            for level in 0..depth {
                let child = cache.level(level + 1);
                assert_eq!(cache.level(level), hash::combine(&child, &child).unwrap());
            }
        }
    }

    #[test]
    fn test_leaf_level_is_zero_account_hash() {
        let cache = ZeroCache::build(4).unwrap();
        assert_eq!(cache.level(4), Account::zero().hash().unwrap());
    }

    #[test]
    fn test_build_idempotent() {
        let a = ZeroCache::build(4).unwrap();
        let b = ZeroCache::build(4).unwrap();
        assert_eq!(a.nodes(), b.nodes());
    }

    #[test]
    fn test_root_matches_empty_tree() {
        let cache = ZeroCache::build(5).unwrap();
        let tree = AccountTree::rebuild(&[], 5).unwrap();
        assert_eq!(cache.level(0), tree.root());
    }
}
